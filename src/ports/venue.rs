//! Venue execution port - live order gateway interface.
//!
//! Only live mode touches this trait; paper mode synthesizes fills
//! locally and never constructs an adapter for it. The engine wraps
//! venue rejections into its own error taxonomy.

use async_trait::async_trait;

use crate::domain::OrderIntent;

/// Result of a venue order placement.
#[derive(Debug, Clone)]
pub struct VenuePlacement {
    /// Venue-assigned order id, adopted as the engine's order id.
    pub order_id: String,
    /// Whether the order is resting or matched immediately.
    pub accepted: bool,
    /// Venue rejection reason, when not accepted.
    pub rejection_reason: Option<String>,
}

/// Trait for live order execution gateways.
#[async_trait]
pub trait VenueExecution: Send + Sync + 'static {
    /// Submit an order to the venue.
    ///
    /// # Errors
    /// Returns an error on transport failure or outright rejection; the
    /// engine surfaces either as a venue rejection.
    async fn place_order(&self, intent: &OrderIntent) -> anyhow::Result<VenuePlacement>;

    /// Cancel an order by venue id. Returns whether the venue
    /// acknowledged the cancellation.
    async fn cancel_order(&self, order_id: &str) -> anyhow::Result<bool>;
}
