//! Normalized stream events.
//!
//! The decoder maps every accepted wire shape onto this tagged union; it
//! is the only place the venue's `event_type` strings exist. Everything
//! downstream (harness, strategy, engine) matches on variants.

use serde::{Deserialize, Serialize};

/// One price level of an order book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

/// User-channel order event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEventKind {
    /// Order accepted / placed (`order`).
    Placement,
    /// Order (partially) filled (`order_fill`).
    Fill,
    /// Order cancelled (`order_cancel`).
    Cancellation,
}

/// A normalized event from either stream channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MarketEvent {
    /// Last-trade/quote price change for one outcome token.
    PriceChange {
        market_id: String,
        token_id: String,
        price: f64,
        best_bid: Option<f64>,
        best_ask: Option<f64>,
        timestamp_ms: u64,
    },
    /// Order book snapshot for one outcome token.
    Book {
        market_id: String,
        token_id: String,
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
        timestamp_ms: u64,
    },
    /// Public trade print.
    Trade {
        market_id: String,
        token_id: String,
        price: f64,
        size: f64,
        timestamp_ms: u64,
    },
    /// Order lifecycle event from the authenticated user channel.
    OrderUpdate {
        order_id: String,
        kind: OrderEventKind,
        price: Option<f64>,
        size: Option<f64>,
        /// Venue fill identifier, used to deduplicate redelivered fills.
        trade_id: Option<String>,
        timestamp_ms: u64,
    },
}

impl MarketEvent {
    /// The outcome token this event concerns, when it has one.
    pub fn token_id(&self) -> Option<&str> {
        match self {
            Self::PriceChange { token_id, .. }
            | Self::Book { token_id, .. }
            | Self::Trade { token_id, .. } => Some(token_id),
            Self::OrderUpdate { .. } => None,
        }
    }

    /// Short name for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::PriceChange { .. } => "price_change",
            Self::Book { .. } => "book",
            Self::Trade { .. } => "trade",
            Self::OrderUpdate { .. } => "order_update",
        }
    }
}
