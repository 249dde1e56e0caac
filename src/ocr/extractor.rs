use super::{preprocess, FieldKind, RecognitionHint, Recognizer};
use crate::error::{AppError, Result};
use crate::fetcher::Fetcher;
use crate::reading::{Field, RawValue};
use crate::timestamp;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use regex_lite::Regex;
use std::sync::{Arc, OnceLock};
use tracing::debug;
use url::Url;

/// Engine misreads seen on digit-only images, mapped to the digit meant.
const CONFUSABLES: &[(char, char)] = &[
    ('O', '0'),
    ('o', '0'),
    ('D', '0'),
    ('Q', '0'),
    ('l', '1'),
    ('I', '1'),
    ('i', '1'),
    ('|', '1'),
    ('!', '1'),
    ('Z', '2'),
    ('z', '2'),
    ('S', '5'),
    ('s', '5'),
    ('G', '6'),
    ('b', '6'),
    ('T', '7'),
    ('B', '8'),
    ('g', '9'),
    ('q', '9'),
    ('−', '-'),
    ('–', '-'),
    ('—', '-'),
    (',', '.'),
];

const UNIT_SUFFIXES: &[&str] = &["mm/h", "km/h", "m/s", "hPa", "mm", "°C", "˚C", "°", "˚", "%"];

/// Minutes an HH:MM reading may lie ahead of the clock before it is taken
/// to belong to the previous day.
const CLOCK_SKEW_MINUTES: i64 = 10;

/// Where a field's image lives: inline in the page or behind a URL.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageRef {
    Inline(Vec<u8>),
    Remote(Url),
}

impl ImageRef {
    /// Interpret an `img` `src` attribute: `data:image/...;base64,` URIs are
    /// decoded, anything else is resolved against the fetcher's base URL.
    pub fn from_src(src: &str, fetcher: &Fetcher) -> Result<Self> {
        let src = src.trim();
        if let Some(rest) = src.strip_prefix("data:") {
            let (_, payload) = rest
                .split_once(";base64,")
                .ok_or_else(|| AppError::Parse(format!("Unsupported data URI: {:.40}", src)))?;
            let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = STANDARD
                .decode(payload.as_bytes())
                .map_err(|e| AppError::Parse(format!("Invalid base64 image data: {}", e)))?;
            return Ok(ImageRef::Inline(bytes));
        }
        Ok(ImageRef::Remote(fetcher.resolve(src)?))
    }
}

/// Turns one field image into a typed value.
///
/// Makes exactly one recognition attempt per call.
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    recognizer: Arc<dyn Recognizer>,
    fetcher: Fetcher,
    language: String,
    min_height: u32,
    timezone: Tz,
}

impl FieldExtractor {
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        fetcher: Fetcher,
        language: impl Into<String>,
        min_height: u32,
        timezone: Tz,
    ) -> Self {
        Self {
            recognizer,
            fetcher,
            language: language.into(),
            min_height,
            timezone,
        }
    }

    pub async fn extract(
        &self,
        field: Field,
        kind: FieldKind,
        image: &ImageRef,
        now: DateTime<Utc>,
    ) -> Result<RawValue> {
        let bytes = match image {
            ImageRef::Inline(bytes) => bytes.clone(),
            ImageRef::Remote(url) => self.fetcher.fetch_bytes(url).await?,
        };

        let prepared = preprocess(field, kind, &bytes, self.min_height)?;
        let hint = RecognitionHint {
            language: self.language.clone(),
            whitelist: kind.whitelist(),
        };

        let text = self
            .recognizer
            .recognize(&prepared, &hint)
            .await
            .map_err(|e| match e {
                AppError::Ocr { raw, reason, .. } => AppError::Ocr {
                    field: field.to_string(),
                    raw,
                    reason,
                },
                other => AppError::Ocr {
                    field: field.to_string(),
                    raw: String::new(),
                    reason: other.to_string(),
                },
            })?;

        debug!("Field {} recognized as {:?}", field, text);

        let parsed = match kind {
            FieldKind::Numeric => parse_numeric(&text).map(RawValue::Number),
            FieldKind::Time => parse_time(&text, self.timezone, now).map(RawValue::Time),
        };

        parsed.ok_or_else(|| AppError::Ocr {
            field: field.to_string(),
            raw: text.clone(),
            reason: match kind {
                FieldKind::Numeric => "not a number after cleanup".to_string(),
                FieldKind::Time => "not a time after cleanup".to_string(),
            },
        })
    }
}

/// Apply the confusable-character table and normalize the decimal comma.
pub fn clean_text(text: &str) -> String {
    text.trim()
        .chars()
        .map(|c| {
            CONFUSABLES
                .iter()
                .find(|(from, _)| *from == c)
                .map(|(_, to)| *to)
                .unwrap_or(c)
        })
        .collect()
}

/// Parse recognized text against the numeric grammar `-?digits(.digits)?`,
/// after stripping a trailing unit.
pub fn parse_numeric(text: &str) -> Option<f64> {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let number = NUMBER.get_or_init(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("valid regex"));

    let mut trimmed = text.trim();
    for suffix in UNIT_SUFFIXES {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            trimmed = stripped.trim_end();
            break;
        }
    }

    let cleaned: String = clean_text(trimmed)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let cleaned = cleaned.trim_end_matches('.');

    if !number.is_match(cleaned) {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Parse recognized text against the time grammar: either a full
/// `YYYY.MM.DD HH:MM` stamp or a bare `HH:MM` on the current local day.
pub fn parse_time(text: &str, tz: Tz, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    static FULL: OnceLock<Regex> = OnceLock::new();
    static CLOCK: OnceLock<Regex> = OnceLock::new();
    let full = FULL.get_or_init(|| {
        Regex::new(r"^(\d{4})[.\-](\d{1,2})[.\-](\d{1,2})\.?\s*(\d{1,2})[:.](\d{2})$")
            .expect("valid regex")
    });
    let clock = CLOCK.get_or_init(|| Regex::new(r"^(\d{1,2})[:.](\d{2})$").expect("valid regex"));

    let cleaned = clean_text(text);
    let cleaned = cleaned.trim();

    if let Some(caps) = full.captures(cleaned) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        )?;
        let time = NaiveTime::from_hms_opt(caps[4].parse().ok()?, caps[5].parse().ok()?, 0)?;
        return timestamp::localize(NaiveDateTime::new(date, time), tz);
    }

    let caps = clock.captures(cleaned)?;
    let time = NaiveTime::from_hms_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, 0)?;
    let today = now.with_timezone(&tz).date_naive();
    let candidate = timestamp::localize(NaiveDateTime::new(today, time), tz)?;

    if candidate > now + Duration::minutes(CLOCK_SKEW_MINUTES) {
        let yesterday = today.pred_opt()?;
        return timestamp::localize(NaiveDateTime::new(yesterday, time), tz);
    }
    Some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use chrono::TimeZone;

    #[test]
    fn test_clean_text_substitutions() {
        assert_eq!(clean_text(" 2l,3 "), "21.3");
        assert_eq!(clean_text("O.S"), "0.5");
        assert_eq!(clean_text("−4,O"), "-4.0");
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric("21,3"), Some(21.3));
        assert_eq!(parse_numeric("-3.5"), Some(-3.5));
        assert_eq!(parse_numeric("58 %"), Some(58.0));
        assert_eq!(parse_numeric("0,2 mm/h"), Some(0.2));
        assert_eq!(parse_numeric("1O13"), Some(1013.0));
        assert_eq!(parse_numeric("- 1,5"), Some(-1.5));
        assert_eq!(parse_numeric("21."), Some(21.0));
    }

    #[test]
    fn test_parse_numeric_rejects_garbage() {
        assert_eq!(parse_numeric(""), None);
        assert_eq!(parse_numeric("--"), None);
        assert_eq!(parse_numeric("21.3.4"), None);
        assert_eq!(parse_numeric("n/a"), None);
    }

    #[test]
    fn test_parse_time_full_stamp() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap();
        let parsed = parse_time("2024.05.01. 14:00", chrono_tz::Europe::Budapest, now).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_time_clock_today() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 5, 0).unwrap();
        let parsed = parse_time("14:00", chrono_tz::Europe::Budapest, now).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_time_clock_rolls_back_past_midnight() {
        // 00:10 local on May 2nd; a 23:50 reading belongs to May 1st.
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 22, 10, 0).unwrap();
        let parsed = parse_time("23:50", chrono_tz::Europe::Budapest, now).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 5, 1, 21, 50, 0).unwrap());
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_time("25:00", chrono_tz::UTC, now), None);
        assert_eq!(parse_time("12", chrono_tz::UTC, now), None);
        assert_eq!(parse_time("", chrono_tz::UTC, now), None);
    }

    #[test]
    fn test_image_ref_from_data_uri() {
        let fetcher =
            Fetcher::new("https://www.idokep.hu", std::time::Duration::from_secs(5)).unwrap();
        let src = format!("data:image/png;base64,{}", STANDARD.encode([1u8, 2, 3]));
        assert_eq!(
            ImageRef::from_src(&src, &fetcher).unwrap(),
            ImageRef::Inline(vec![1, 2, 3])
        );
    }

    #[test]
    fn test_image_ref_from_relative_url() {
        let fetcher =
            Fetcher::new("https://www.idokep.hu", std::time::Duration::from_secs(5)).unwrap();
        match ImageRef::from_src("/automata/img/t.png", &fetcher).unwrap() {
            ImageRef::Remote(url) => {
                assert_eq!(url.as_str(), "https://www.idokep.hu/automata/img/t.png")
            }
            other => panic!("Expected remote image, got {:?}", other),
        }
    }
}
