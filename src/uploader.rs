use crate::config::WundergroundConfig;
use crate::error::{AppError, Result};
use crate::reading::WeatherReading;
use crate::state::LastSentState;
use crate::units;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

const SUCCESS_MARKER: &str = "success";
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How a single upload attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Success,
    Transient(String),
    Rejected(String),
}

/// Query parameters of one Weather Underground update, in imperial units.
///
/// `weather` and `weatherAlert` are never set: WU takes METAR codes there,
/// not the Hungarian condition and alert text the source publishes.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    params: Vec<(&'static str, String)>,
}

impl UploadRequest {
    pub fn new(reading: &WeatherReading, station_id: &str, api_key: &str) -> Self {
        let mut params = vec![
            ("ID", station_id.to_string()),
            ("PASSWORD", api_key.to_string()),
            ("action", "updateraw".to_string()),
            (
                "dateutc",
                reading.measurement_time().format(DATE_FORMAT).to_string(),
            ),
            (
                "tempf",
                format_number(units::celsius_to_fahrenheit(reading.temperature_c())),
            ),
            ("humidity", reading.humidity_pct().to_string()),
        ];

        let optional = [
            (
                "dewptf",
                reading.dew_point_c().map(units::celsius_to_fahrenheit),
            ),
            (
                "rainin",
                reading
                    .precipitation_intensity_mm_per_h()
                    .map(units::mm_to_inches),
            ),
            (
                "dailyrainin",
                reading.precipitation_24h_mm().map(units::mm_to_inches),
            ),
            ("baromin", reading.pressure_hpa().map(units::hpa_to_inhg)),
            ("windspeedmph", reading.wind_speed_kmh().map(units::kmh_to_mph)),
        ];
        params.extend(
            optional
                .into_iter()
                .filter_map(|(name, value)| value.map(|v| (name, format_number(v)))),
        );

        if let Some(direction) = reading.wind_direction_deg() {
            params.push(("winddir", direction.to_string()));
        }

        Self { params }
    }

    pub fn params(&self) -> &[(&'static str, String)] {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Parameters as `key=value` pairs with the station key masked, for logs.
    pub fn redacted(&self) -> String {
        self.params
            .iter()
            .map(|(key, value)| match *key {
                "PASSWORD" => format!("{}=***", key),
                _ => format!("{}={}", key, value),
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

// Display of f64 is the shortest string that parses back to the same value.
fn format_number(value: f64) -> String {
    value.to_string()
}

/// Classify a completed HTTP exchange.
pub fn classify_response(status: StatusCode, body: &str) -> UploadOutcome {
    let summary = body.trim().chars().take(200).collect::<String>();

    if status.is_success() {
        if body.to_lowercase().contains(SUCCESS_MARKER) {
            UploadOutcome::Success
        } else {
            UploadOutcome::Rejected(format!("{} without success marker: {}", status, summary))
        }
    } else if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        UploadOutcome::Transient(format!("{}: {}", status, summary))
    } else {
        UploadOutcome::Rejected(format!("{}: {}", status, summary))
    }
}

/// Classify a response whose body could not be read. Client errors are
/// decided by the status alone.
pub fn classify_unreadable_body(status: StatusCode, reason: &str) -> UploadOutcome {
    if status.is_success() || status.is_server_error() {
        UploadOutcome::Transient(format!("{}: unreadable body: {}", status, reason))
    } else {
        classify_response(status, "")
    }
}

/// Classify a request that never produced a response.
pub fn classify_error(error: &reqwest::Error) -> UploadOutcome {
    if error.is_builder() {
        UploadOutcome::Rejected(format!("malformed request: {}", error))
    } else if error.is_timeout() {
        UploadOutcome::Transient(format!("timed out: {}", error))
    } else {
        UploadOutcome::Transient(error.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct Uploader {
    client: Client,
    endpoint: Url,
    station_id: String,
    api_key: String,
    max_attempts: u32,
    backoff_base: Duration,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Uploader {
    pub fn new(config: &WundergroundConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            AppError::Config(format!("Invalid upload endpoint '{}': {}", config.endpoint, e))
        })?;

        let client = Client::builder()
            .user_agent(concat!("idokep-wunderground/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            station_id: config.station_id.clone(),
            api_key: config.api_key.clone(),
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            shutdown: None,
        })
    }

    /// Abandon pending retries once `shutdown` turns true.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn request_for(&self, reading: &WeatherReading) -> UploadRequest {
        UploadRequest::new(reading, &self.station_id, &self.api_key)
    }

    /// Upload a reading, retrying transient failures. `state` is updated only
    /// once the remote side has confirmed the upload.
    pub async fn upload(&self, reading: &WeatherReading, state: &mut LastSentState) -> Result<()> {
        let request = self.request_for(reading);
        debug!("Upload parameters: {}", request.redacted());

        let attempts = retry_with_backoff(
            self.max_attempts,
            self.backoff_base,
            self.shutdown.clone(),
            || self.attempt(&request),
        )
        .await?;

        state.record(reading.station_id(), reading.measurement_time());
        info!(
            "Uploaded reading for {} measured at {} ({} attempt(s))",
            reading.station_id(),
            reading.measurement_time(),
            attempts
        );
        Ok(())
    }

    async fn attempt(&self, request: &UploadRequest) -> UploadOutcome {
        let response = match self
            .client
            .get(self.endpoint.clone())
            .query(request.params())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return classify_error(&e),
        };

        let status = response.status();
        match response.text().await {
            Ok(body) => classify_response(status, &body),
            Err(e) => classify_unreadable_body(status, &e.to_string()),
        }
    }
}

/// Run `f` until it succeeds, is rejected, or `max_attempts` transient
/// failures have been seen. A shutdown signal cuts the backoff short.
/// Returns the number of attempts made.
async fn retry_with_backoff<F, Fut>(
    max_attempts: u32,
    base: Duration,
    mut shutdown: Option<watch::Receiver<bool>>,
    mut f: F,
) -> Result<u32>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = UploadOutcome>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match f().await {
            UploadOutcome::Success => return Ok(attempts),
            UploadOutcome::Rejected(reason) => return Err(AppError::RejectedFailure(reason)),
            UploadOutcome::Transient(reason) => {
                if attempts >= max_attempts {
                    return Err(AppError::TransientFailure { attempts, reason });
                }

                let delay = base.saturating_mul(2u32.saturating_pow(attempts - 1));
                warn!(
                    "Upload failed (attempt {}/{}): {}. Retrying in {:?}...",
                    attempts, max_attempts, reason, delay
                );

                let Some(rx) = shutdown.as_mut() else {
                    tokio::time::sleep(delay).await;
                    continue;
                };
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {},
                    Ok(_) = rx.wait_for(|stop| *stop) => {
                        info!("Shutdown requested, abandoning upload retries");
                        return Err(AppError::TransientFailure {
                            attempts,
                            reason: format!("{} (retries cancelled by shutdown)", reason),
                        });
                    }
                }
            }
        }
    }
}
