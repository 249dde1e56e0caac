#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use idokep_wunderground::config::{Config, Overrides};
use idokep_wunderground::error::{AppError, Result};
use idokep_wunderground::ocr::{RecognitionHint, Recognizer};
use image::{GrayImage, ImageFormat, Luma};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Mutex;

pub const UPLOAD_PATH: &str = "/weatherstation/updateweatherstation.php";

/// Small PNG with a dark glyph-like bar on a white background.
pub fn glyph_png() -> Vec<u8> {
    let image = GrayImage::from_fn(24, 12, |x, y| {
        if (4..20).contains(&x) && (3..9).contains(&y) {
            Luma([20])
        } else {
            Luma([250])
        }
    });
    encode(&image)
}

/// Uniform PNG with nothing on it.
pub fn blank_png() -> Vec<u8> {
    encode(&GrayImage::from_pixel(24, 12, Luma([255])))
}

fn encode(image: &GrayImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// Automata station page with one table row per `(label, img src)`.
pub fn automata_page(measurement_time: Option<&str>, rows: &[(&str, String)]) -> String {
    let time = measurement_time
        .map(|t| format!(r#"<time datetime="{}">{}</time>"#, t, t))
        .unwrap_or_default();
    let rows: String = rows
        .iter()
        .map(|(label, src)| format!(r#"<tr><th>{}</th><td><img src="{}"></td></tr>"#, label, src))
        .collect();
    format!(
        r#"<html><body><h1>Automata</h1>{}<table class="table">{}</table></body></html>"#,
        time, rows
    )
}

/// Recognizer returning canned text in order, one entry per call.
#[derive(Debug, Default)]
pub struct ScriptedRecognizer {
    responses: Mutex<VecDeque<String>>,
    hints: Mutex<Vec<RecognitionHint>>,
}

impl ScriptedRecognizer {
    pub fn new<'a>(responses: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            hints: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.hints.lock().unwrap().len()
    }

    pub fn hints(&self) -> Vec<RecognitionHint> {
        self.hints.lock().unwrap().clone()
    }
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn recognize(&self, image: &GrayImage, hint: &RecognitionHint) -> Result<String> {
        assert!(image.height() > 0);
        self.hints.lock().unwrap().push(hint.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AppError::Ocr {
                field: "engine".to_string(),
                raw: String::new(),
                reason: "no scripted response left".to_string(),
            })
    }
}

/// Automata configuration for station `fejnto` against a mock server.
pub fn automata_config(server_uri: &str) -> Config {
    let mut config = Config::default();
    config.apply(&Overrides {
        wunderground_id: Some("IVELEN12".to_string()),
        wunderground_key: Some("secret".to_string()),
        idokep_automata_id: Some("fejnto".to_string()),
        use_automata: Some(true),
        ..Default::default()
    });
    config.source.base_url = server_uri.to_string();
    config.wunderground.endpoint = format!("{}{}", server_uri, UPLOAD_PATH);
    config.wunderground.backoff_base_ms = 0;
    config.validate().unwrap();
    config
}
