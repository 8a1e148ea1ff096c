//! Market discovery via the Polymarket Gamma API.
//!
//! The 15-minute BTC up/down family uses deterministic slugs of the form
//! `btc-updown-15m-{start_ts}`, one per quarter-hour boundary. Discovery
//! therefore enumerates the next 48 boundaries and asks Gamma for each slug
//! instead of crawling event listings.

use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use updown_common::{Market, Outcome};

use crate::types::{decode_string_array, GammaEvent, GammaMarket};

/// Slug prefix of the market family.
pub const SLUG_PREFIX: &str = "btc-updown-15m-";

/// Number of quarter-hour slots to enumerate per discovery pass.
const SLOT_COUNT: usize = 48;

/// Seconds in one market window.
pub const WINDOW_SECS: i64 = 15 * 60;

/// Request timeout for Gamma API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from a single Gamma lookup. Discovery as a whole never fails;
/// per-slug errors are skipped.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gamma API returned status {0}")]
    Status(u16),

    #[error("event not found")]
    NotFound,
}

/// Gamma discovery client.
pub struct Discovery {
    http: Client,
    base_url: String,
}

impl Discovery {
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

    /// Discover the upcoming BTC 15-minute markets, sorted by start time.
    ///
    /// Missing slugs and per-slug transport errors are skipped; the pass
    /// returns whatever it could parse.
    pub async fn discover(&self, now: DateTime<Utc>) -> Vec<Market> {
        let mut markets = Vec::new();
        for ts in quarter_hour_timestamps(now, SLOT_COUNT) {
            let slug = format!("{SLUG_PREFIX}{ts}");
            let event = match self.fetch_event_by_slug(&slug).await {
                Ok(ev) => ev,
                Err(e) => {
                    debug!(slug, error = %e, "Slug lookup skipped");
                    continue;
                }
            };
            if let Some(market) = parse_market(&event) {
                markets.push(market);
            }
        }
        markets.sort_by_key(|m| m.start_ts);
        markets
    }

    async fn fetch_event_by_slug(&self, slug: &str) -> Result<GammaEvent, DiscoveryError> {
        let url = format!("{}/events?slug={}", self.base_url, slug);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status(status.as_u16()));
        }
        let mut events: Vec<GammaEvent> = response.json().await?;
        if events.is_empty() {
            return Err(DiscoveryError::NotFound);
        }
        Ok(events.remove(0))
    }
}

/// The next `count` quarter-hour start timestamps strictly after `now`'s
/// boundary.
pub fn quarter_hour_timestamps(now: DateTime<Utc>, count: usize) -> Vec<i64> {
    let boundary = now.timestamp() - now.timestamp().rem_euclid(WINDOW_SECS);
    (1..=count as i64).map(|i| boundary + WINDOW_SECS * i).collect()
}

/// Extract the start timestamp encoded in a market slug, if present.
pub fn slug_start_ts(slug: &str) -> Option<i64> {
    let rest = slug.split(SLUG_PREFIX).last()?;
    if rest == slug {
        return None;
    }
    let digits = rest.split('-').next()?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Parse a Gamma event into a `Market`.
///
/// Returns `None` when any of condition id, slug, question or timestamps is
/// missing — such events are dropped rather than half-tracked.
pub fn parse_market(event: &GammaEvent) -> Option<Market> {
    let slug = event.slug.clone().unwrap_or_default();
    let inner = event.markets.as_ref().and_then(|ms| ms.first());

    let condition_id = inner
        .and_then(|m| m.condition_id.clone())
        .or_else(|| event.condition_id.clone())
        .unwrap_or_default();
    let question = inner
        .and_then(|m| m.question.clone())
        .or_else(|| event.question.clone())
        .or_else(|| event.title.clone())
        .unwrap_or_default();

    if condition_id.is_empty() || slug.is_empty() || question.is_empty() {
        return None;
    }

    let (start_ts, end_ts) = extract_start_end(&slug, inner, event)?;
    let outcomes = parse_outcomes(inner, event);

    Some(Market {
        condition_id,
        market_slug: slug,
        question,
        start_ts,
        end_ts,
        outcomes,
        is_active: event.active.unwrap_or(false),
        is_resolved: event.closed.unwrap_or(false) || event.resolved.unwrap_or(false),
    })
}

/// Start/end timestamps: the slug suffix is authoritative; the ISO date
/// fields are only a fallback for markets outside the deterministic family.
fn extract_start_end(
    slug: &str,
    inner: Option<&GammaMarket>,
    event: &GammaEvent,
) -> Option<(i64, i64)> {
    if let Some(ts) = slug_start_ts(slug) {
        return Some((ts, ts + WINDOW_SECS));
    }

    let start = inner
        .and_then(|m| m.start_date.as_deref())
        .or(event.start_date.as_deref())
        .and_then(parse_iso_ts);
    let end = inner
        .and_then(|m| m.end_date.as_deref())
        .or(event.end_date.as_deref())
        .and_then(parse_iso_ts);
    match (start, end) {
        (Some(s), Some(e)) if s != 0 && e != 0 => Some((s, e)),
        _ => None,
    }
}

fn parse_iso_ts(s: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.timestamp())
}

fn parse_outcomes(inner: Option<&GammaMarket>, event: &GammaEvent) -> Vec<Outcome> {
    // Preferred: clobTokenIds + outcomes on the nested market.
    if let Some(m) = inner {
        if let Some(raw_ids) = &m.clob_token_ids {
            let token_ids = decode_string_array(raw_ids);
            if !token_ids.is_empty() {
                let mut names = m
                    .outcomes
                    .as_ref()
                    .map(decode_string_array)
                    .unwrap_or_default();
                if names.is_empty() {
                    names = vec!["Up".to_string(), "Down".to_string()];
                }
                return token_ids
                    .into_iter()
                    .enumerate()
                    .map(|(i, token_id)| {
                        let name = names
                            .get(i)
                            .cloned()
                            .unwrap_or_else(|| format!("Outcome{i}"));
                        Outcome::new(token_id, name)
                    })
                    .collect();
            }
        }
    }

    // Fallback: legacy `tokens` arrays on the event or the nested market.
    let tokens = event
        .tokens
        .as_ref()
        .filter(|t| !t.is_empty())
        .or_else(|| inner.and_then(|m| m.tokens.as_ref()));
    tokens
        .map(|toks| {
            toks.iter()
                .map(|t| {
                    Outcome::new(
                        t.token_id.clone().unwrap_or_default(),
                        t.outcome.clone().unwrap_or_default(),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}
