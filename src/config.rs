use crate::error::{AppError, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub wunderground: WundergroundConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WundergroundConfig {
    #[serde(default)]
    pub station_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_max_attempts", deserialize_with = "deserialize_flexible")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms", deserialize_with = "deserialize_flexible")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_timeout_seconds", deserialize_with = "deserialize_flexible")]
    pub timeout_seconds: u64,
}

impl Default for WundergroundConfig {
    fn default() -> Self {
        Self {
            station_id: String::new(),
            api_key: String::new(),
            endpoint: default_endpoint(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_endpoint() -> String {
    "https://weatherstation.wunderground.com/weatherstation/updateweatherstation.php".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_timeout_seconds() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub automata_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible")]
    pub use_automata: bool,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_timeout_seconds", deserialize_with = "deserialize_flexible")]
    pub request_timeout_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            location: None,
            automata_id: None,
            use_automata: false,
            timezone: default_timezone(),
            request_timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_base_url() -> String {
    "https://www.idokep.hu".to_string()
}

fn default_timezone() -> String {
    "Europe/Budapest".to_string()
}

/// Which scraper feeds the pipeline, with the identifier it scrapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Html(String),
    Automata(String),
}

impl SourceConfig {
    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| AppError::Config(format!("Unknown timezone '{}': {}", self.timezone, e)))
    }

    /// Resolve the strategy selector against the identifiers that are set.
    pub fn strategy(&self) -> Result<Strategy> {
        let location = non_empty(&self.location);
        let automata_id = non_empty(&self.automata_id);

        match (self.use_automata, automata_id, location) {
            (true, Some(id), _) => Ok(Strategy::Automata(id.to_string())),
            (true, None, _) => Err(AppError::Config(
                "use_automata is set but no automata id is configured (IDOKEP_AUTOMATA_ID)"
                    .to_string(),
            )),
            (false, _, Some(location)) => Ok(Strategy::Html(location.to_string())),
            (false, Some(_), None) => Err(AppError::Config(
                "An automata id is configured but use_automata is not set (USE_AUTOMATA=true)"
                    .to_string(),
            )),
            (false, None, None) => Err(AppError::Config(
                "Missing required configuration: idokep location (IDOKEP_LOCATION) \
                 or automata id with use_automata (IDOKEP_AUTOMATA_ID, USE_AUTOMATA=true)"
                    .to_string(),
            )),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_seconds", deserialize_with = "deserialize_flexible")]
    pub interval_seconds: u64,
    #[serde(default, deserialize_with = "deserialize_flexible")]
    pub run_once: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            run_once: false,
        }
    }
}

fn default_interval_seconds() -> u64 {
    900
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_tesseract_cmd")]
    pub tesseract_cmd: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_timeout_seconds", deserialize_with = "deserialize_flexible")]
    pub timeout_seconds: u64,
    #[serde(default = "default_min_height_px", deserialize_with = "deserialize_flexible")]
    pub min_height_px: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_cmd: default_tesseract_cmd(),
            language: default_language(),
            timeout_seconds: default_timeout_seconds(),
            min_height_px: default_min_height_px(),
        }
    }
}

fn default_tesseract_cmd() -> String {
    "tesseract".to_string()
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_min_height_px() -> u32 {
    48
}

/// Custom deserializer that accepts a value either natively or as a string
///
/// Accepts:
/// - `interval_seconds: 900` (number)
/// - `interval_seconds: "900"` (string that parses)
/// - `use_automata: ${USE_AUTOMATA}` (env var substituted to either)
fn deserialize_flexible<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flexible<T> {
        Native(T),
        String(String),
    }

    match Flexible::<T>::deserialize(deserializer)? {
        Flexible::Native(v) => Ok(v),
        Flexible::String(s) => s.trim().to_lowercase().parse::<T>().map_err(|e| {
            serde::de::Error::custom(format!("Invalid value '{}': {}", s, e))
        }),
    }
}

/// Values supplied from the environment or command line. `Some` wins over
/// whatever the config file says.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub wunderground_id: Option<String>,
    pub wunderground_key: Option<String>,
    pub idokep_location: Option<String>,
    pub idokep_automata_id: Option<String>,
    pub use_automata: Option<bool>,
    pub scan_interval: Option<u64>,
    pub run_once: Option<bool>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        // Substitute environment variables
        let expanded = expand_env_vars(&content)?;

        serde_yaml::from_str(&expanded)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Build the effective configuration: defaults, then the optional file,
    /// then `overrides`. The result is validated.
    pub fn resolve(file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(id) = &overrides.wunderground_id {
            self.wunderground.station_id = id.clone();
        }
        if let Some(key) = &overrides.wunderground_key {
            self.wunderground.api_key = key.clone();
        }
        if let Some(location) = &overrides.idokep_location {
            self.source.location = Some(location.clone());
        }
        if let Some(id) = &overrides.idokep_automata_id {
            self.source.automata_id = Some(id.clone());
        }
        if let Some(use_automata) = overrides.use_automata {
            self.source.use_automata = use_automata;
        }
        if let Some(interval) = overrides.scan_interval {
            self.scheduler.interval_seconds = interval;
        }
        if let Some(run_once) = overrides.run_once {
            self.scheduler.run_once = run_once;
        }
    }

    /// Validate configuration values
    ///
    /// Checks for:
    /// - Missing or unexpanded credentials
    /// - A consistent scraper strategy
    /// - Positive intervals, timeouts and attempt counts
    /// - Valid URL formats and a known timezone
    pub fn validate(&self) -> Result<()> {
        let credentials = [
            ("WUNDERGROUND_ID", &self.wunderground.station_id),
            ("WUNDERGROUND_KEY", &self.wunderground.api_key),
        ];

        let missing: Vec<&str> = credentials
            .iter()
            .filter(|(_, value)| value.trim().is_empty() || value.contains("${"))
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(AppError::Config(format!(
                "Missing required configuration: {}",
                missing.join(", ")
            )));
        }

        self.source.strategy()?;
        self.source.timezone()?;

        if self.scheduler.interval_seconds == 0 {
            return Err(AppError::Config(
                "Scan interval must be greater than 0 seconds".to_string(),
            ));
        }

        // Warn if interval is too short
        if self.scheduler.interval_seconds < 60 {
            tracing::warn!(
                "Scan interval of {} seconds is shorter than the upstream update rate",
                self.scheduler.interval_seconds
            );
        }

        if self.wunderground.max_attempts == 0 || self.wunderground.max_attempts > 10 {
            return Err(AppError::Config(format!(
                "Upload max_attempts must be between 1 and 10, got {}",
                self.wunderground.max_attempts
            )));
        }

        let timeouts = [
            ("wunderground.timeout_seconds", self.wunderground.timeout_seconds),
            ("source.request_timeout_seconds", self.source.request_timeout_seconds),
            ("ocr.timeout_seconds", self.ocr.timeout_seconds),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(AppError::Config(format!("{} must be greater than 0", name)));
            }
        }

        if self.ocr.min_height_px == 0 {
            return Err(AppError::Config(
                "ocr.min_height_px must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("source.base_url", &self.source.base_url),
            ("wunderground.endpoint", &self.wunderground.endpoint),
        ] {
            if let Err(e) = url::Url::parse(value) {
                return Err(AppError::Config(format!("Invalid {} '{}': {}", name, value, e)));
            }
        }

        Ok(())
    }
}

fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}").unwrap();

    let mut missing_vars = Vec::new();

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => {
                result = result.replace(&cap[0], &value);
            }
            Err(_) => {
                missing_vars.push(var_name.to_string());
            }
        }
    }

    if !missing_vars.is_empty() {
        return Err(AppError::Config(format!(
            "Missing required environment variable{}: {}\n\n\
             To fix this:\n\
             1. Create a .env file in the project root (copy .env.example)\n\
             2. Set the missing variable{}: export {}=<value>\n\
             3. Or pass the value on the command line",
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars.join(", "),
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars[0],
        )));
    }

    Ok(result)
}
