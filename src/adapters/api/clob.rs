//! CLOB execution adapter - live order gateway over REST.
//!
//! Implements the `VenueExecution` port against the Polymarket CLOB.
//! Every request is signed (HMAC-SHA256 over timestamp+method+path+body)
//! and carries the `POLY_*` auth headers.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::auth::ClobAuth;
use crate::config::ApiConfig;
use crate::domain::{OrderIntent, OrderSide, OrderType};
use crate::ports::{VenueExecution, VenuePlacement};

/// CLOB request body for placing an order.
#[derive(Debug, Serialize)]
struct PlaceOrderRequest<'a> {
    token_id: &'a str,
    price: f64,
    size: f64,
    side: &'static str,
    #[serde(rename = "type")]
    order_type: &'static str,
}

/// CLOB response from order placement.
#[derive(Debug, Deserialize)]
struct PlaceOrderResponse {
    #[serde(rename = "orderID", default)]
    order_id: String,
    #[serde(default)]
    success: bool,
    #[serde(rename = "errorMsg", default)]
    error_msg: Option<String>,
}

/// CLOB response from order cancellation.
#[derive(Debug, Deserialize)]
struct CancelOrderResponse {
    #[serde(default)]
    canceled: bool,
    #[serde(rename = "errorMsg", default)]
    error_msg: Option<String>,
}

/// Polymarket CLOB order execution adapter.
pub struct ClobExecution {
    /// HTTP client with rustls TLS backend.
    http: Client,
    /// CLOB base URL.
    base_url: String,
    /// Request signer.
    auth: ClobAuth,
}

impl ClobExecution {
    /// Create a new CLOB execution adapter from config.
    ///
    /// # Errors
    /// Fails when credentials are incomplete; the engine only constructs
    /// this adapter in live mode, where config validation has already
    /// required them.
    pub fn new(config: &ApiConfig, auth: ClobAuth) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.clob_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    /// Issue a signed request and parse the JSON response.
    async fn signed_request<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: String,
    ) -> Result<T> {
        let timestamp = ClobAuth::timestamp()?;
        let signature = self
            .auth
            .sign_request(&timestamp, method.as_str(), path, &body);
        let creds = self.auth.credentials();

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .request(method, &url)
            .header("Content-Type", "application/json")
            .header("POLY_API_KEY", &creds.api_key)
            .header("POLY_PASSPHRASE", &creds.api_passphrase)
            .header("POLY_TIMESTAMP", &timestamp)
            .header("POLY_SIGNATURE", signature)
            .body(body)
            .send()
            .await
            .with_context(|| format!("CLOB request to {path} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("CLOB API error {status} from {path}: {text}");
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Invalid JSON from CLOB {path}"))
    }
}

#[async_trait]
impl VenueExecution for ClobExecution {
    #[instrument(skip(self, intent), fields(token = %intent.token_id, price = intent.price, size = intent.size))]
    async fn place_order(&self, intent: &OrderIntent) -> Result<VenuePlacement> {
        let request = PlaceOrderRequest {
            token_id: &intent.token_id,
            price: intent.price,
            size: intent.size,
            side: match intent.side {
                OrderSide::Buy => "BUY",
                OrderSide::Sell => "SELL",
            },
            order_type: match intent.order_type {
                OrderType::Limit => "GTC",
                OrderType::Market => "FOK",
            },
        };

        let body = serde_json::to_string(&request).context("Failed to encode order")?;
        let response: PlaceOrderResponse = self
            .signed_request(reqwest::Method::POST, "/order", body)
            .await?;

        if response.success {
            info!(order_id = %response.order_id, "Live order placed");
        } else {
            warn!(reason = ?response.error_msg, "Live order rejected");
        }

        Ok(VenuePlacement {
            order_id: response.order_id,
            accepted: response.success,
            rejection_reason: response.error_msg,
        })
    }

    #[instrument(skip(self))]
    async fn cancel_order(&self, order_id: &str) -> Result<bool> {
        let body = serde_json::to_string(&serde_json::json!({ "orderID": order_id }))
            .context("Failed to encode cancel request")?;
        let response: CancelOrderResponse = self
            .signed_request(reqwest::Method::DELETE, "/order", body)
            .await?;

        if !response.canceled {
            warn!(order_id, reason = ?response.error_msg, "Cancel not acknowledged");
        }
        Ok(response.canceled)
    }
}
