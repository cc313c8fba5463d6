//! Configuration loader - file loading, env substitution, validation.
//!
//! Reads `config.toml`, substitutes `${VAR}` / `${VAR:default}`
//! placeholders from the environment, parses, and validates. A missing
//! file falls back to pure defaults (paper mode against the public
//! endpoints); a present-but-invalid file is a fatal startup error.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;
use crate::domain::TradingMode;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns a detailed error if the file exists but cannot be read, the
/// TOML does not parse, or any validation rule is violated.
pub fn load_config(path: &str) -> Result<AppConfig> {
    let path = Path::new(path);

    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let substituted = substitute_env_vars(&content);

        toml::from_str::<AppConfig>(&substituted)
            .with_context(|| format!("Failed to parse {}", path.display()))?
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        AppConfig::default()
    };

    validate_config(&config)?;

    info!(
        mode = %config.mode,
        markets = config.strategy.markets.len(),
        heartbeat_secs = config.strategy.heartbeat_interval_secs,
        "Configuration loaded successfully"
    );

    Ok(config)
}

/// Substitute `${VAR}` and `${VAR:default}` placeholders with environment
/// variables.
///
/// Substitution runs over the raw file text before TOML parsing, so a
/// placeholder can stand in for any value, not just strings. An unset
/// variable without a default substitutes to the empty string.
pub fn substitute_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        match after.find('}') {
            Some(end) => {
                let placeholder = &after[..end];
                let (name, default) = match placeholder.split_once(':') {
                    Some((n, d)) => (n, Some(d)),
                    None => (placeholder, None),
                };
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => out.push_str(default.unwrap_or("")),
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated placeholder; keep the text as-is.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<()> {
    anyhow::ensure!(
        !config.api.rest_url.is_empty(),
        "api.rest_url must not be empty"
    );
    anyhow::ensure!(
        !config.api.market_ws_url.is_empty(),
        "api.market_ws_url must not be empty"
    );
    anyhow::ensure!(
        !config.api.user_ws_url.is_empty(),
        "api.user_ws_url must not be empty"
    );

    anyhow::ensure!(
        config.websocket.ping_interval_secs > 0,
        "websocket.ping_interval_secs must be positive, got {}",
        config.websocket.ping_interval_secs
    );
    anyhow::ensure!(
        config.websocket.reconnect_delay_secs > 0,
        "websocket.reconnect_delay_secs must be positive, got {}",
        config.websocket.reconnect_delay_secs
    );

    anyhow::ensure!(
        config.paper.starting_balance > 0.0,
        "paper.starting_balance must be positive, got {}",
        config.paper.starting_balance
    );
    anyhow::ensure!(
        (0.0..1.0).contains(&config.paper.slippage),
        "paper.slippage must be in [0, 1), got {}",
        config.paper.slippage
    );

    anyhow::ensure!(
        config.strategy.default_size > 0.0,
        "strategy.default_size must be positive, got {}",
        config.strategy.default_size
    );
    anyhow::ensure!(
        config.strategy.heartbeat_interval_secs > 0,
        "strategy.heartbeat_interval_secs must be positive"
    );

    if config.mode == TradingMode::Live {
        anyhow::ensure!(
            config.has_ws_credentials(),
            "live mode requires api.api_key, api.api_secret and api.api_passphrase"
        );
        anyhow::ensure!(
            !config.api.clob_url.is_empty(),
            "live mode requires api.clob_url"
        );
    }

    Ok(())
}
