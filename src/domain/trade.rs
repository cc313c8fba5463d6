//! Core trading domain types.
//!
//! Orders, trades, positions and the intent record that flows from a
//! strategy into the execution engine. These types are the foundation of
//! the hexagonal architecture's inner ring: pure data, no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Rests at the limit price.
    Limit,
    /// Crosses the book; paper mode applies slippage.
    Market,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limit => write!(f, "LIMIT"),
            Self::Market => write!(f, "MARKET"),
        }
    }
}

/// Lifecycle status of an order.
///
/// Transitions are monotone: `Pending → Open → {PartiallyFilled, Filled,
/// Cancelled, Rejected}`. `Filled`, `Cancelled` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Created locally, not yet accepted.
    Pending,
    /// Resting on the book.
    Open,
    /// Partially filled, remainder still live.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Cancelled by the caller or the venue.
    Cancelled,
    /// Rejected by the venue.
    Rejected,
}

impl OrderStatus {
    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Open => "OPEN",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Cancelled => "CANCELLED",
            Self::Rejected => "REJECTED",
        };
        write!(f, "{s}")
    }
}

/// A strategy's request to trade, before the engine has accepted it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    /// Market the intent targets.
    pub market_id: String,
    /// Outcome token to trade.
    pub token_id: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Limit or market.
    pub order_type: OrderType,
    /// Price in (0, 1).
    pub price: f64,
    /// Size in contracts, > 0.
    pub size: f64,
}

/// An intent that has been accepted by the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Engine-assigned id (paper) or venue id (live).
    pub id: String,
    /// Market this order belongs to.
    pub market_id: String,
    /// Outcome token id.
    pub token_id: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Limit or market.
    pub order_type: OrderType,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Order price in (0, 1).
    pub price: f64,
    /// Requested size.
    pub size: f64,
    /// Cumulative filled size, in [0, size].
    pub filled_size: f64,
    /// Whether this order was simulated.
    pub is_paper: bool,
    /// When the order was accepted.
    pub created_at: DateTime<Utc>,
    /// When the order last changed.
    pub updated_at: DateTime<Utc>,
    /// When the order was completely filled.
    pub filled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Unfilled remainder.
    pub fn remaining_size(&self) -> f64 {
        self.size - self.filled_size
    }

    /// Whether the order can still fill or be cancelled.
    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Pending | OrderStatus::Open | OrderStatus::PartiallyFilled
        )
    }
}

impl std::fmt::Display for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Order(id={}, {} {}@{}, status={})",
            self.id, self.side, self.size, self.price, self.status
        )
    }
}

/// An immutable execution record referencing its parent order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Unique trade id.
    pub id: String,
    /// Parent order id.
    pub order_id: String,
    /// Market traded.
    pub market_id: String,
    /// Outcome token traded.
    pub token_id: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Execution price.
    pub price: f64,
    /// Executed size.
    pub size: f64,
    /// Fee paid. The venue does not currently populate this; kept at 0.
    pub fee: f64,
    /// Whether this trade was simulated.
    pub is_paper: bool,
    /// Execution timestamp.
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    /// Trade notional: price × size.
    pub fn value(&self) -> f64 {
        self.price * self.size
    }

    /// Signed cash flow: negative for buys, positive for sells.
    pub fn cash_flow(&self) -> f64 {
        match self.side {
            OrderSide::Buy => -self.value(),
            OrderSide::Sell => self.value(),
        }
    }
}

/// Per-token aggregate of unmatched buy fills.
///
/// Prediction-market outcomes are non-shortable at this level, so size is
/// never negative. A flat position is deleted, not kept as a zero row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Market this position is in.
    pub market_id: String,
    /// Outcome token held.
    pub token_id: String,
    /// Contracts held, >= 0.
    pub size: f64,
    /// Size-weighted mean entry price of unmatched buy fills.
    pub avg_entry_price: f64,
    /// Realized P&L from sells against this position.
    pub realized_pnl: f64,
    /// When the position was opened.
    pub opened_at: DateTime<Utc>,
    /// When the position last changed.
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Whether the position has returned to zero.
    pub fn is_flat(&self) -> bool {
        self.size.abs() < f64::EPSILON
    }

    /// Total cost basis: size × average entry.
    pub fn cost_basis(&self) -> f64 {
        self.size * self.avg_entry_price
    }

    /// Unrealized P&L at the given current price.
    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        (current_price - self.avg_entry_price) * self.size
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Position(token={}, size={}, avg={:.4})",
            self.token_id, self.size, self.avg_entry_price
        )
    }
}

/// Runtime execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    /// Fills synthesized locally; the venue is never touched.
    Paper,
    /// Orders forwarded to the venue.
    Live,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paper => write!(f, "paper"),
            Self::Live => write!(f, "live"),
        }
    }
}
