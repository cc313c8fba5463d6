//! Configuration module - TOML-based runtime configuration.
//!
//! Loads and validates configuration from `config.toml` with `.env`
//! overrides via `dotenvy` and `${VAR}` / `${VAR:default}` substitution.
//! The loaded value is immutable: every component receives its section by
//! value at construction and nothing re-reads the file afterwards.

pub mod loader;

use serde::Deserialize;

use crate::domain::TradingMode;

/// Top-level runtime configuration.
///
/// Every section is optional in the file; missing fields take the
/// documented defaults. Validation runs once at startup and is fatal.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Paper or live execution.
    #[serde(default = "default_mode")]
    pub mode: TradingMode,
    /// Venue endpoints and credentials.
    #[serde(default)]
    pub api: ApiConfig,
    /// WebSocket liveness and reconnect policy.
    #[serde(default)]
    pub websocket: WebSocketConfig,
    /// Paper execution parameters.
    #[serde(default)]
    pub paper: PaperConfig,
    /// Strategy harness parameters.
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Persistence locations.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Whether user-channel WebSocket credentials are configured.
    pub fn has_ws_credentials(&self) -> bool {
        !self.api.api_key.is_empty()
            && !self.api.api_secret.is_empty()
            && !self.api.api_passphrase.is_empty()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            api: ApiConfig::default(),
            websocket: WebSocketConfig::default(),
            paper: PaperConfig::default(),
            strategy: StrategyConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Venue endpoint and credential configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Gamma metadata REST base URL.
    pub rest_url: String,
    /// CLOB REST base URL (live order placement).
    pub clob_url: String,
    /// Market-channel WebSocket URL.
    pub market_ws_url: String,
    /// User-channel WebSocket URL.
    pub user_ws_url: String,
    /// CLOB API key.
    pub api_key: String,
    /// CLOB API secret (HMAC signing key).
    pub api_secret: String,
    /// CLOB API passphrase.
    pub api_passphrase: String,
    /// Wallet private key (live signing identity).
    pub private_key: String,
    /// REST request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            rest_url: "https://gamma-api.polymarket.com".to_string(),
            clob_url: "https://clob.polymarket.com".to_string(),
            market_ws_url: "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string(),
            user_ws_url: "wss://ws-subscriptions-clob.polymarket.com/ws/user".to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            api_passphrase: String::new(),
            private_key: String::new(),
            timeout_secs: 30,
        }
    }
}

/// WebSocket liveness and reconnect configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Application-layer PING cadence. The venue closes sockets that go
    /// quiet, so this must stay at or below its 10 s cutoff.
    pub ping_interval_secs: u64,
    /// Delay before re-establishing a dropped connection.
    pub reconnect_delay_secs: u64,
    /// Whether to reconnect automatically on transport errors.
    pub auto_reconnect: bool,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 5,
            reconnect_delay_secs: 5,
            auto_reconnect: true,
        }
    }
}

/// Paper execution configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    /// Starting cash balance in USDC.
    pub starting_balance: f64,
    /// Market-order slippage fraction (buy pays up, sell sells down).
    pub slippage: f64,
    /// Simulated fill latency, logged for observability only.
    pub fill_delay_ms: u64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            starting_balance: 10_000.0,
            slippage: 0.001,
            fill_delay_ms: 500,
        }
    }
}

/// Strategy harness configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Market references to trade: Polymarket URLs, slugs, or ids.
    pub markets: Vec<String>,
    /// Default order size when the strategy does not specify one.
    pub default_size: f64,
    /// Heartbeat cadence for the status line / `on_heartbeat`.
    pub heartbeat_interval_secs: u64,
    /// Metadata refresh cadence; 0 disables periodic refresh.
    pub market_refresh_interval_secs: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            markets: Vec::new(),
            default_size: 100.0,
            heartbeat_interval_secs: 30,
            market_refresh_interval_secs: 0,
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for order/trade logs and the position snapshot.
    pub data_dir: String,
    /// Directory for CSV exports, relative to `data_dir` when relative.
    pub csv_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            csv_dir: "exports".to_string(),
        }
    }
}

fn default_mode() -> TradingMode {
    TradingMode::Paper
}
