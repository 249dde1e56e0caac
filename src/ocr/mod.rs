//! Recognition of field values rendered as images.
//!
//! The pipeline for one field is: decode the image, [`preprocess`] it into a
//! high-contrast upscaled grayscale bitmap, hand it to a [`Recognizer`], then
//! clean and parse the returned text according to the field's [`FieldKind`].

mod extractor;
mod preprocess;
mod recognizer;

pub use extractor::{clean_text, parse_numeric, parse_time, FieldExtractor, ImageRef};
pub use preprocess::preprocess;
pub use recognizer::{RecognitionHint, Recognizer, TesseractRecognizer};

/// The grammar a field's recognized text must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Numeric,
    Time,
}

impl FieldKind {
    /// Characters the engine may emit for this kind of field.
    pub fn whitelist(&self) -> &'static str {
        match self {
            FieldKind::Numeric => "0123456789,.-",
            FieldKind::Time => "0123456789:.- ",
        }
    }
}
