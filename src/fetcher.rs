use crate::error::{AppError, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

const USER_AGENT: &str = concat!("idokep-wunderground/", env!("CARGO_PKG_VERSION"));

/// Single-attempt HTTP access to upstream pages and field images.
///
/// Every transport failure, timeout or non-success status becomes
/// [`AppError::Fetch`]; retrying is left to the scheduler's next cycle.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    base_url: Url,
}

impl Fetcher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        let base_url =
            Url::parse(&format!("{}/", base_url.trim_end_matches('/'))).map_err(|e| {
                AppError::Config(format!("Invalid source base_url '{}': {}", base_url, e))
            })?;

        Ok(Self { client, base_url })
    }

    /// Resolve `path` against the base URL. Absolute URLs pass through.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::Parse(format!("Cannot resolve URL '{}': {}", path, e)))
    }

    pub async fn fetch_text(&self, url: &Url) -> Result<String> {
        debug!("Fetching page {}", url);
        let response = self.get(url).await?;
        response.text().await.map_err(|e| fetch_error(url, e))
    }

    pub async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>> {
        debug!("Fetching image {}", url);
        let response = self.get(url).await?;
        let bytes = response.bytes().await.map_err(|e| fetch_error(url, e))?;
        Ok(bytes.to_vec())
    }

    async fn get(&self, url: &Url) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| fetch_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Fetch {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        Ok(response)
    }
}

fn fetch_error(url: &Url, e: reqwest::Error) -> AppError {
    let reason = if e.is_timeout() {
        format!("timed out: {}", e)
    } else {
        e.to_string()
    };
    AppError::Fetch {
        url: url.to_string(),
        reason,
    }
}
