use crate::error::{AppError, Result};
use async_trait::async_trait;
use image::{GrayImage, ImageFormat};
use std::fmt::Debug;
use std::io::Cursor;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Language and character-set hint passed along with each image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionHint {
    pub language: String,
    pub whitelist: &'static str,
}

/// An OCR engine: preprocessed image in, recognized text out.
#[async_trait]
pub trait Recognizer: Send + Sync + Debug {
    async fn recognize(&self, image: &GrayImage, hint: &RecognitionHint) -> Result<String>;
}

/// Runs the `tesseract` executable in single-line mode, streaming the image
/// as PNG over stdin.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    command: String,
    timeout: Duration,
}

impl TesseractRecognizer {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    fn args(hint: &RecognitionHint) -> Vec<String> {
        vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            hint.language.clone(),
            "--psm".to_string(),
            "7".to_string(),
            "--oem".to_string(),
            "3".to_string(),
            "-c".to_string(),
            format!("tessedit_char_whitelist={}", hint.whitelist),
        ]
    }
}

#[async_trait]
impl Recognizer for TesseractRecognizer {
    async fn recognize(&self, image: &GrayImage, hint: &RecognitionHint) -> Result<String> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let mut child = Command::new(&self.command)
            .args(Self::args(hint))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child.stdin.take().ok_or_else(|| AppError::Ocr {
            field: "engine".to_string(),
            raw: String::new(),
            reason: "tesseract stdin unavailable".to_string(),
        })?;

        let run = async move {
            stdin.write_all(&png).await?;
            drop(stdin);
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| AppError::Ocr {
                field: "engine".to_string(),
                raw: String::new(),
                reason: format!("tesseract timed out after {:?}", self.timeout),
            })??;

        if !output.status.success() {
            return Err(AppError::Ocr {
                field: "engine".to_string(),
                raw: String::new(),
                reason: format!(
                    "tesseract exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("tesseract recognized {:?}", text);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_carry_hint() {
        let hint = RecognitionHint {
            language: "hun".to_string(),
            whitelist: "0123456789,.-",
        };
        let args = TesseractRecognizer::args(&hint);
        assert_eq!(&args[..4], ["stdin", "stdout", "-l", "hun"]);
        assert!(args.contains(&"tessedit_char_whitelist=0123456789,.-".to_string()));
        assert!(args.windows(2).any(|w| w == ["--psm", "7"]));
    }

    #[tokio::test]
    async fn test_missing_binary_is_error() {
        let recognizer = TesseractRecognizer::new(
            "/nonexistent/tesseract-binary",
            Duration::from_secs(1),
        );
        let hint = RecognitionHint {
            language: "eng".to_string(),
            whitelist: "0123456789",
        };
        let image = GrayImage::from_pixel(4, 4, image::Luma([255]));
        assert!(recognizer.recognize(&image, &hint).await.is_err());
    }
}
