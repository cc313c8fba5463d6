//! Gamma metadata client - market resolution over REST.
//!
//! Implements the `MarketMetadata` port against the Gamma API. Applies a
//! 100 ms minimum inter-request interval and retries HTTP 429 and 5xx
//! with exponential backoff, up to three attempts.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument, warn};

use crate::config::ApiConfig;
use crate::domain::Market;
use crate::ports::MarketMetadata;

/// Minimum spacing between Gamma requests.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);
/// Maximum attempts per request (initial try + retries).
const MAX_ATTEMPTS: u32 = 3;
/// Base delay for exponential backoff between retries.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Rate-limited Gamma REST client.
pub struct GammaClient {
    /// Underlying HTTP client.
    http: Client,
    /// Gamma API base URL.
    base_url: String,
    /// Time of the last issued request, for the inter-request interval.
    last_request: Mutex<Option<Instant>>,
}

impl GammaClient {
    /// Create a new Gamma client from API config.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            last_request: Mutex::new(None),
        })
    }

    /// Enforce the minimum interval between requests.
    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// GET a JSON document with rate limiting and retries.
    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis() as u64, path, "Retrying request");
                sleep(delay).await;
            }

            self.rate_limit().await;

            match self.http.get(&url).send().await {
                Ok(response) => match response.status() {
                    status if status.is_success() => {
                        return response
                            .json::<Value>()
                            .await
                            .context("Invalid JSON from Gamma API");
                    }
                    StatusCode::TOO_MANY_REQUESTS => {
                        warn!(path, "Rate limited by Gamma API, backing off");
                        last_error = Some(anyhow::anyhow!("HTTP 429 from {path}"));
                    }
                    status if status.is_server_error() => {
                        warn!(%status, path, "Gamma server error, retrying");
                        last_error = Some(anyhow::anyhow!("HTTP {status} from {path}"));
                    }
                    status => {
                        let body = response.text().await.unwrap_or_default();
                        anyhow::bail!("Gamma API error {status} from {path}: {body}");
                    }
                },
                Err(e) => {
                    warn!(error = %e, attempt, path, "Gamma request failed");
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Max retries exceeded for {path}")))
    }
}

#[async_trait]
impl MarketMetadata for GammaClient {
    #[instrument(skip(self))]
    async fn market_by_slug(&self, slug: &str) -> Result<Market> {
        let data = self.get_json(&format!("/markets/slug/{slug}")).await?;
        // Some deployments return a one-element array for slug lookups.
        let data = match data {
            Value::Array(items) => items
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("No market found for slug {slug}"))?,
            other => other,
        };
        parse_market(&data)
    }

    #[instrument(skip(self))]
    async fn market_by_id(&self, id: &str) -> Result<Market> {
        let data = self.get_json(&format!("/markets/{id}")).await?;
        parse_market(&data)
    }

    #[instrument(skip(self))]
    async fn event_by_slug(&self, slug: &str) -> Result<Vec<Market>> {
        let data = self.get_json(&format!("/events/slug/{slug}")).await?;
        let markets = data
            .get("markets")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow::anyhow!("Event {slug} has no markets array"))?;

        let mut out = Vec::with_capacity(markets.len());
        for item in markets {
            match parse_market(item) {
                Ok(market) => out.push(market),
                Err(e) => warn!(error = %e, slug, "Skipping unparsable market in event"),
            }
        }
        Ok(out)
    }
}

/// Parse a Gamma market object into the domain model.
///
/// `clobTokenIds` and `outcomePrices` arrive either as JSON arrays or as
/// JSON-encoded strings containing arrays; both are accepted.
pub fn parse_market(data: &Value) -> Result<Market> {
    let token_ids = parse_string_array(data.get("clobTokenIds"))
        .context("Market missing clobTokenIds")?;
    anyhow::ensure!(
        token_ids.len() >= 2,
        "Expected two outcome token ids, got {}",
        token_ids.len()
    );

    let prices = parse_string_array(data.get("outcomePrices")).unwrap_or_default();
    let price_yes = prices.first().and_then(|p| p.parse::<f64>().ok()).unwrap_or(0.0);
    let price_no = prices.get(1).and_then(|p| p.parse::<f64>().ok()).unwrap_or(0.0);

    Ok(Market {
        id: field_string(data, "id"),
        condition_id: field_string(data, "conditionId"),
        question: field_string(data, "question"),
        slug: field_string(data, "slug"),
        token_id_yes: token_ids[0].clone(),
        token_id_no: token_ids[1].clone(),
        price_yes,
        price_no,
        volume: field_f64(data, "volume"),
        liquidity: field_f64(data, "liquidity"),
        active: data.get("active").and_then(Value::as_bool).unwrap_or(true),
        closed: data.get("closed").and_then(Value::as_bool).unwrap_or(false),
        fetched_at: Utc::now(),
    })
}

/// Read an array of strings that may itself be JSON-encoded as a string.
fn parse_string_array(value: Option<&Value>) -> Result<Vec<String>> {
    let value = value.ok_or_else(|| anyhow::anyhow!("Field missing"))?;

    let items: Vec<Value> = match value {
        Value::Array(items) => items.clone(),
        Value::String(raw) => serde_json::from_str(raw).context("Invalid JSON-encoded array")?,
        other => anyhow::bail!("Expected array or string, got {other}"),
    };

    Ok(items
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}

fn field_string(data: &Value, key: &str) -> String {
    match data.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn field_f64(data: &Value, key: &str) -> f64 {
    match data.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}
