use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch error for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("OCR error for field {field}: {reason} (raw text: {raw:?})")]
    Ocr {
        field: String,
        raw: String,
        reason: String,
    },

    #[error("Validation error for field {field}: {reason} (value: {value})")]
    Validation {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incomplete reading for station {station}: missing {missing}")]
    IncompleteReading { station: String, missing: String },

    #[error("Upload failed after {attempts} attempt(s): {reason}")]
    TransientFailure { attempts: u32, reason: String },

    #[error("Upload rejected: {0}")]
    RejectedFailure(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Process exit status for a failed single-run cycle.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) => 2,
            AppError::TransientFailure { .. } => 3,
            AppError::RejectedFailure(_) => 4,
            _ => 1,
        }
    }

    /// Only configuration faults stop the scheduling loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Config(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "configuration_fault",
            AppError::Fetch { .. } | AppError::Http(_) => "fetch_error",
            AppError::Parse(_) => "parse_error",
            AppError::Ocr { .. } | AppError::Image(_) => "ocr_error",
            AppError::Validation { .. } => "validation_error",
            AppError::IncompleteReading { .. } => "incomplete_reading",
            AppError::TransientFailure { .. } => "transient_failure",
            AppError::RejectedFailure(_) => "rejected_failure",
            AppError::Io(_) => "io_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_distinguish_failures() {
        assert_eq!(AppError::Config("missing key".into()).exit_code(), 2);
        assert_eq!(
            AppError::TransientFailure {
                attempts: 3,
                reason: "HTTP 503".into()
            }
            .exit_code(),
            3
        );
        assert_eq!(AppError::RejectedFailure("HTTP 401".into()).exit_code(), 4);
        assert_eq!(AppError::Parse("no anchors".into()).exit_code(), 1);
    }

    #[test]
    fn test_only_config_is_fatal() {
        assert!(AppError::Config("x".into()).is_fatal());
        assert!(!AppError::RejectedFailure("x".into()).is_fatal());
        assert!(!AppError::IncompleteReading {
            station: "fejnto".into(),
            missing: "humidity".into()
        }
        .is_fatal());
    }
}
