//! Market metadata port - REST market resolution interface.
//!
//! The harness resolves configured market references (URLs, slugs, ids)
//! through this trait at startup and on the optional refresh cadence.
//! Adapters own rate limiting and retry policy.

use async_trait::async_trait;

use crate::domain::Market;

/// Trait for market metadata providers.
#[async_trait]
pub trait MarketMetadata: Send + Sync + 'static {
    /// Fetch a single market by its URL slug.
    async fn market_by_slug(&self, slug: &str) -> anyhow::Result<Market>;

    /// Fetch a single market by its stable id.
    async fn market_by_id(&self, id: &str) -> anyhow::Result<Market>;

    /// Fetch every market grouped under an event slug.
    ///
    /// An event aggregates related markets; resolving an event URL loads
    /// all of them.
    async fn event_by_slug(&self, slug: &str) -> anyhow::Result<Vec<Market>>;
}
