//! Polymarket Data API client.
//!
//! Serves the redemption sweep: the `/positions` listing marks which
//! condition ids are redeemable and what they are currently worth. The
//! endpoint is advisory; callers skip their sweep on any failure instead of
//! treating it as a tick error.

use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request timeout for Data API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum DataApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Data API returned status {0}")]
    Status(u16),
}

/// One wallet position as reported by the Data API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPosition {
    #[serde(default)]
    pub condition_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub size: f64,
    #[serde(default)]
    pub cur_price: f64,
    #[serde(default)]
    pub current_value: f64,
    #[serde(default)]
    pub redeemable: bool,
}

impl UserPosition {
    /// Current USD value as a decimal (the API reports a float).
    pub fn current_value_decimal(&self) -> Decimal {
        Decimal::try_from(self.current_value).unwrap_or(Decimal::ZERO)
    }

    /// Human label: title, falling back to the slug.
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.slug
        } else {
            &self.title
        }
    }
}

/// Data API client.
pub struct DataApiClient {
    http: Client,
    base_url: String,
}

impl DataApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// All positions held by `wallet`.
    pub async fn positions(&self, wallet: &str) -> Result<Vec<UserPosition>, DataApiError> {
        let url = format!("{}/positions?user={}", self.base_url, wallet);
        let response = self.http.get(&url).header("Accept", "application/json").send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DataApiError::Status(status.as_u16()));
        }
        Ok(response.json().await?)
    }
}
