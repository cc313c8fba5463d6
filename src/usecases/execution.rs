//! Execution engine - unified paper/live order path.
//!
//! Accepts `OrderIntent`s, enforces pre-trade checks, simulates fills in
//! paper mode or forwards to the venue otherwise, and maintains the
//! balance/position/trade books. The engine is owned by the harness
//! dispatch task and is single-writer: no internal locking.
//!
//! Side effects on a fill happen in a fixed order: record trade, update
//! order, update balance, update position, queue the fill notification.
//! The harness drains the queue, invokes `on_fill`, then asks the engine
//! to persist - so the strategy always observes a fill before storage
//! does. Persistence failures are logged and swallowed; the in-memory
//! books are the source of truth for the live process.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::PaperConfig;
use crate::domain::{
    Order, OrderEventKind, OrderIntent, OrderSide, OrderStatus, OrderType, Position, Trade,
    TradingMode,
};
use crate::ports::{Storage, VenueExecution};

/// Position sizes below this are treated as flat.
const FLAT_EPSILON: f64 = 1e-9;

/// Pre-trade and venue errors returned synchronously from `submit`.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("order size must be positive, got {0}")]
    InvalidSize(f64),
    #[error("order price must be in (0, 1), got {0}")]
    InvalidPrice(f64),
    #[error("insufficient funds: need {needed:.2}, available {available:.2}")]
    InsufficientFunds { needed: f64, available: f64 },
    #[error("insufficient position: requested {requested}, held {held}")]
    InsufficientPosition { requested: f64, held: f64 },
    #[error("venue rejected order: {0}")]
    VenueRejected(anyhow::Error),
    #[error("live execution gateway not configured")]
    LiveUnavailable,
}

/// A fill waiting to be surfaced to the strategy and persisted.
#[derive(Debug, Clone)]
pub struct FillEvent {
    /// Order state immediately after the fill was applied.
    pub order: Order,
    /// The execution record.
    pub trade: Trade,
}

/// Unified paper/live execution engine.
pub struct ExecutionEngine {
    mode: TradingMode,
    paper: PaperConfig,
    /// Cash balance; starts at the configured paper balance and moves
    /// with every fill.
    balance: f64,
    starting_balance: f64,
    orders: HashMap<String, Order>,
    positions: HashMap<String, Position>,
    trades: Vec<Trade>,
    /// Realized P&L carried over from positions that went flat and were
    /// deleted from the map.
    closed_realized_pnl: f64,
    /// Monotone counter for paper order ids.
    next_paper_id: u64,
    /// Seen fill keys per order, for at-least-once redelivery dedup.
    seen_fill_keys: HashMap<String, HashSet<String>>,
    /// Fills not yet surfaced to the strategy.
    pending_fills: VecDeque<FillEvent>,
    storage: Arc<dyn Storage>,
    venue: Option<Arc<dyn VenueExecution>>,
}

impl ExecutionEngine {
    /// Create an engine.
    ///
    /// `venue` is required for live mode and ignored in paper mode.
    pub fn new(
        mode: TradingMode,
        paper: PaperConfig,
        storage: Arc<dyn Storage>,
        venue: Option<Arc<dyn VenueExecution>>,
    ) -> Self {
        let starting_balance = paper.starting_balance;
        Self {
            mode,
            paper,
            balance: starting_balance,
            starting_balance,
            orders: HashMap::new(),
            positions: HashMap::new(),
            trades: Vec::new(),
            closed_realized_pnl: 0.0,
            next_paper_id: 0,
            seen_fill_keys: HashMap::new(),
            pending_fills: VecDeque::new(),
            storage,
            venue,
        }
    }

    /// Submit an intent through the pre-trade checks and, on acceptance,
    /// into the paper simulator or the live venue.
    #[instrument(skip(self, intent), fields(token = %intent.token_id, side = %intent.side, price = intent.price, size = intent.size))]
    pub async fn submit(&mut self, intent: OrderIntent) -> Result<Order, ExecutionError> {
        if intent.size <= 0.0 {
            return Err(ExecutionError::InvalidSize(intent.size));
        }
        if intent.price <= 0.0 || intent.price >= 1.0 {
            return Err(ExecutionError::InvalidPrice(intent.price));
        }

        match intent.side {
            OrderSide::Buy => {
                let needed = intent.price * intent.size;
                if needed > self.balance {
                    return Err(ExecutionError::InsufficientFunds {
                        needed,
                        available: self.balance,
                    });
                }
            }
            OrderSide::Sell => {
                let held = self
                    .positions
                    .get(&intent.token_id)
                    .map_or(0.0, |p| p.size);
                if held < intent.size {
                    return Err(ExecutionError::InsufficientPosition {
                        requested: intent.size,
                        held,
                    });
                }
            }
        }

        match self.mode {
            TradingMode::Paper => Ok(self.execute_paper(intent)),
            TradingMode::Live => self.execute_live(intent).await,
        }
    }

    /// Accept and synchronously fill a paper order.
    fn execute_paper(&mut self, intent: OrderIntent) -> Order {
        self.next_paper_id += 1;
        let id = format!("paper-{:06}", self.next_paper_id);
        let now = Utc::now();

        let order = Order {
            id: id.clone(),
            market_id: intent.market_id.clone(),
            token_id: intent.token_id.clone(),
            side: intent.side,
            order_type: intent.order_type,
            status: OrderStatus::Open,
            price: intent.price,
            size: intent.size,
            filled_size: 0.0,
            is_paper: true,
            created_at: now,
            updated_at: now,
            filled_at: None,
        };
        self.orders.insert(id.clone(), order.clone());

        // LIMIT fills at the limit exactly; MARKET pays slippage in the
        // direction of the trade.
        let fill_price = match intent.order_type {
            OrderType::Limit => intent.price,
            OrderType::Market => match intent.side {
                OrderSide::Buy => intent.price * (1.0 + self.paper.slippage),
                OrderSide::Sell => intent.price * (1.0 - self.paper.slippage),
            },
        };

        // Fills are instantaneous; the configured delay is observability
        // only and is never awaited.
        debug!(
            fill_delay_ms = self.paper.fill_delay_ms,
            fill_price, "Simulating paper fill"
        );
        self.apply_fill(&id, fill_price, intent.size, None);

        let order = self.orders.get(&id).cloned().unwrap_or(order);
        info!(
            order_id = %order.id,
            side = %order.side,
            fill_price,
            balance = self.balance,
            "Paper order executed"
        );
        order
    }

    /// Forward an accepted intent to the live venue.
    async fn execute_live(&mut self, intent: OrderIntent) -> Result<Order, ExecutionError> {
        let venue = self
            .venue
            .as_ref()
            .ok_or(ExecutionError::LiveUnavailable)?
            .clone();

        let placement = venue
            .place_order(&intent)
            .await
            .map_err(ExecutionError::VenueRejected)?;

        if !placement.accepted {
            let reason = placement
                .rejection_reason
                .unwrap_or_else(|| "no reason given".to_string());
            return Err(ExecutionError::VenueRejected(anyhow::anyhow!(reason)));
        }

        let now = Utc::now();
        let order = Order {
            id: placement.order_id.clone(),
            market_id: intent.market_id,
            token_id: intent.token_id,
            side: intent.side,
            order_type: intent.order_type,
            status: OrderStatus::Open,
            price: intent.price,
            size: intent.size,
            filled_size: 0.0,
            is_paper: false,
            created_at: now,
            updated_at: now,
            filled_at: None,
        };
        self.orders.insert(order.id.clone(), order.clone());

        info!(order_id = %order.id, side = %order.side, "Live order placed");
        Ok(order)
    }

    /// Apply one fill against a known order. Fixed side-effect order:
    /// trade, order, balance, position, notification queue.
    fn apply_fill(&mut self, order_id: &str, price: f64, size: f64, trade_id: Option<String>) {
        let Some(order) = self.orders.get_mut(order_id) else {
            warn!(order_id, "Fill for unknown order dropped");
            return;
        };

        let fill_size = size.min(order.remaining_size());
        if fill_size <= 0.0 {
            warn!(order_id, size, "Fill beyond remaining size dropped");
            return;
        }

        let now = Utc::now();
        let trade = Trade {
            id: trade_id.unwrap_or_else(|| format!("trade-{}", Uuid::new_v4().simple())),
            order_id: order_id.to_string(),
            market_id: order.market_id.clone(),
            token_id: order.token_id.clone(),
            side: order.side,
            price,
            size: fill_size,
            fee: 0.0,
            is_paper: order.is_paper,
            executed_at: now,
        };
        self.trades.push(trade.clone());

        order.filled_size += fill_size;
        order.updated_at = now;
        if order.remaining_size() <= FLAT_EPSILON {
            order.filled_size = order.size;
            order.status = OrderStatus::Filled;
            order.filled_at = Some(now);
        } else {
            order.status = OrderStatus::PartiallyFilled;
        }
        let order_snapshot = order.clone();

        match order_snapshot.side {
            OrderSide::Buy => self.balance -= price * fill_size,
            OrderSide::Sell => self.balance += price * fill_size,
        }

        self.update_position(&order_snapshot, price, fill_size);

        self.pending_fills.push_back(FillEvent {
            order: order_snapshot,
            trade,
        });
    }

    /// Fold a fill into the per-token position.
    fn update_position(&mut self, order: &Order, price: f64, size: f64) {
        let now = Utc::now();
        match order.side {
            OrderSide::Buy => {
                let position = self
                    .positions
                    .entry(order.token_id.clone())
                    .or_insert_with(|| Position {
                        market_id: order.market_id.clone(),
                        token_id: order.token_id.clone(),
                        size: 0.0,
                        avg_entry_price: 0.0,
                        realized_pnl: 0.0,
                        opened_at: now,
                        updated_at: now,
                    });

                let total_cost = position.size * position.avg_entry_price + size * price;
                position.size += size;
                position.avg_entry_price = total_cost / position.size;
                position.updated_at = now;
            }
            OrderSide::Sell => {
                let Some(position) = self.positions.get_mut(&order.token_id) else {
                    warn!(token = %order.token_id, "Sell fill without position");
                    return;
                };

                position.realized_pnl += (price - position.avg_entry_price) * size;
                position.size -= size;
                position.updated_at = now;
                let flat = position.size <= FLAT_EPSILON;

                if flat {
                    // Flat rows are deleted; their realized P&L moves to
                    // the lifetime accumulator.
                    if let Some(removed) = self.positions.remove(&order.token_id) {
                        self.closed_realized_pnl += removed.realized_pnl;
                    }
                }
            }
        }
    }

    /// Reconcile a user-channel order event against the local books.
    ///
    /// Fills are deduplicated by `(order id, fill key)` because the venue
    /// redelivers user events at least once across reconnects. Updates
    /// for orders the engine does not know are logged and dropped.
    pub fn apply_order_update(
        &mut self,
        order_id: &str,
        kind: OrderEventKind,
        price: Option<f64>,
        size: Option<f64>,
        trade_id: Option<&str>,
        timestamp_ms: u64,
    ) {
        let Some(order_price) = self.orders.get(order_id).map(|o| o.price) else {
            debug!(order_id, ?kind, "Order update for unknown order dropped");
            return;
        };

        match kind {
            OrderEventKind::Fill => {
                let fill_size = size.unwrap_or(0.0);
                if fill_size <= 0.0 {
                    debug!(order_id, "Fill event without size dropped");
                    return;
                }

                let key = trade_id
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{timestamp_ms}:{fill_size}"));
                let seen = self.seen_fill_keys.entry(order_id.to_string()).or_default();
                if !seen.insert(key) {
                    debug!(order_id, "Duplicate fill redelivery dropped");
                    return;
                }

                let fill_price = price.unwrap_or(order_price);
                self.apply_fill(order_id, fill_price, fill_size, trade_id.map(str::to_string));
            }
            OrderEventKind::Cancellation => {
                if let Some(order) = self.orders.get_mut(order_id) {
                    if order.is_open() {
                        order.status = OrderStatus::Cancelled;
                        order.updated_at = Utc::now();
                        info!(order_id, "Order cancelled by venue");
                    }
                }
            }
            OrderEventKind::Placement => {
                if let Some(order) = self.orders.get_mut(order_id) {
                    if order.status == OrderStatus::Pending {
                        order.status = OrderStatus::Open;
                        order.updated_at = Utc::now();
                    }
                }
            }
        }
    }

    /// Cancel an order.
    ///
    /// Permitted only while `Pending` or `Open`. Paper transitions
    /// immediately; live marks cancelled only on venue acknowledgement.
    /// Cancelling a terminal or unknown order is a no-op returning false.
    #[instrument(skip(self))]
    pub async fn cancel(&mut self, order_id: &str) -> bool {
        let Some(order) = self.orders.get(order_id) else {
            return false;
        };
        if !matches!(order.status, OrderStatus::Pending | OrderStatus::Open) {
            debug!(order_id, status = %order.status, "Cancel on non-cancellable order");
            return false;
        }

        let acknowledged = match self.mode {
            TradingMode::Paper => true,
            TradingMode::Live => match &self.venue {
                Some(venue) => match venue.cancel_order(order_id).await {
                    Ok(ok) => ok,
                    Err(e) => {
                        warn!(order_id, error = %e, "Venue cancel failed");
                        false
                    }
                },
                None => false,
            },
        };

        if acknowledged {
            if let Some(order) = self.orders.get_mut(order_id) {
                order.status = OrderStatus::Cancelled;
                order.updated_at = Utc::now();
            }
            info!(order_id, "Order cancelled");
            self.persist_order(order_id).await;
        }
        acknowledged
    }

    /// Drain fills that have not yet been surfaced to the strategy.
    pub fn take_fills(&mut self) -> Vec<FillEvent> {
        self.pending_fills.drain(..).collect()
    }

    /// Persist the durable footprint of a fill: trade, parent order,
    /// and the (possibly now flat) position. Failures are non-fatal.
    pub async fn persist_fill(&self, event: &FillEvent) {
        if let Err(e) = self.storage.save_trade(&event.trade).await {
            warn!(trade_id = %event.trade.id, error = %e, "Trade persistence failed");
        }

        // Persist the current order state when it has advanced past the
        // snapshot; saves are idempotent by id either way.
        let order = self.orders.get(&event.order.id).unwrap_or(&event.order);
        if let Err(e) = self.storage.save_order(order).await {
            warn!(order_id = %order.id, error = %e, "Order persistence failed");
        }

        let position = self
            .positions
            .get(&event.order.token_id)
            .cloned()
            .unwrap_or_else(|| flat_position(&event.order));
        if let Err(e) = self.storage.save_position(&position).await {
            warn!(token = %position.token_id, error = %e, "Position persistence failed");
        }
    }

    /// Persist one order's current state. Failures are non-fatal.
    pub async fn persist_order(&self, order_id: &str) {
        if let Some(order) = self.orders.get(order_id) {
            if let Err(e) = self.storage.save_order(order).await {
                warn!(order_id, error = %e, "Order persistence failed");
            }
        }
    }

    /// Current cash balance.
    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Configured starting balance.
    pub fn starting_balance(&self) -> f64 {
        self.starting_balance
    }

    /// Balance plus open positions marked at the caller-provided price
    /// (falling back to entry price when no quote is known). Computed on
    /// demand from authoritative state, never cached.
    pub fn equity<F>(&self, price_of: F) -> f64
    where
        F: Fn(&str) -> Option<f64>,
    {
        let position_value: f64 = self
            .positions
            .values()
            .map(|p| p.size * price_of(&p.token_id).unwrap_or(p.avg_entry_price))
            .sum();
        self.balance + position_value
    }

    /// Lifetime realized P&L: closed positions plus open rows.
    pub fn realized_pnl(&self) -> f64 {
        self.closed_realized_pnl + self.positions.values().map(|p| p.realized_pnl).sum::<f64>()
    }

    pub fn mode(&self) -> TradingMode {
        self.mode
    }

    pub fn order(&self, order_id: &str) -> Option<&Order> {
        self.orders.get(order_id)
    }

    /// Orders that can still fill or be cancelled.
    pub fn open_orders(&self) -> Vec<&Order> {
        self.orders.values().filter(|o| o.is_open()).collect()
    }

    pub fn position(&self, token_id: &str) -> Option<&Position> {
        self.positions.get(token_id)
    }

    pub fn positions(&self) -> &HashMap<String, Position> {
        &self.positions
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }
}

fn flat_position(order: &Order) -> Position {
    let now = Utc::now();
    Position {
        market_id: order.market_id.clone(),
        token_id: order.token_id.clone(),
        size: 0.0,
        avg_entry_price: 0.0,
        realized_pnl: 0.0,
        opened_at: now,
        updated_at: now,
    }
}
