pub mod cli;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod normalizer;
pub mod ocr;
pub mod reading;
pub mod scheduler;
pub mod scraper;
pub mod state;
pub mod timestamp;
pub mod units;
pub mod uploader;
