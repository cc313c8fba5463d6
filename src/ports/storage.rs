//! Storage port - durable state persistence interface.
//!
//! Sink-only from the runtime's point of view: the engine persists every
//! accepted order, trade and position delta, and operators list them back
//! out. Persistence is idempotent by primary key, so replaying a save is
//! harmless. In-memory engine state stays authoritative for the live
//! process; a persistence failure is logged, never propagated into the
//! trading path.

use async_trait::async_trait;

use crate::domain::{Order, OrderStatus, Position, Trade};

/// Filters for order listing.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    /// Restrict to one market.
    pub market_id: Option<String>,
    /// Restrict to one lifecycle status.
    pub status: Option<OrderStatus>,
}

/// Filters for trade listing.
#[derive(Debug, Clone, Default)]
pub struct TradeFilter {
    /// Restrict to one market.
    pub market_id: Option<String>,
    /// Restrict to one outcome token.
    pub token_id: Option<String>,
}

/// Trait for state persistence providers.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Persist an order (insert or replace by id).
    async fn save_order(&self, order: &Order) -> anyhow::Result<()>;

    /// Persist a trade (insert or replace by id).
    async fn save_trade(&self, trade: &Trade) -> anyhow::Result<()>;

    /// Persist a position keyed by token id.
    ///
    /// A flat position (size 0) deletes the stored row; flat positions
    /// are never persisted as zero rows.
    async fn save_position(&self, position: &Position) -> anyhow::Result<()>;

    /// List stored orders matching the filter.
    async fn list_orders(&self, filter: &OrderFilter) -> anyhow::Result<Vec<Order>>;

    /// List stored trades matching the filter.
    async fn list_trades(&self, filter: &TradeFilter) -> anyhow::Result<Vec<Trade>>;
}
