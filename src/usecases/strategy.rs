//! Strategy contract - the callback surface user code implements.
//!
//! A strategy is linked into the runtime and driven by the harness.
//! All callbacks run serially on the dispatch task, so implementations
//! need no internal locking; a callback that blocks stalls every market
//! update, which is documented but not enforced.
//!
//! Only `on_price_update` is required. The other hooks default to no-ops;
//! `on_heartbeat` returns whether it handled the beat, and the harness
//! logs its own status line when it did not.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::error;

use super::execution::{ExecutionEngine, ExecutionError};
use crate::domain::{BookLevel, Market, Order, OrderIntent, OrderSide, OrderType, Outcome, Trade};

/// Order book view passed to `on_orderbook_update`.
#[derive(Debug, Clone)]
pub struct BookSnapshot {
    /// Outcome token the book belongs to.
    pub token_id: String,
    /// Bid levels as delivered by the venue.
    pub bids: Vec<BookLevel>,
    /// Ask levels as delivered by the venue.
    pub asks: Vec<BookLevel>,
    /// Venue timestamp (Unix ms).
    pub timestamp_ms: u64,
}

impl BookSnapshot {
    /// Highest bid price, if any.
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    /// Lowest ask price, if any.
    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    /// Mid price when both sides exist.
    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    /// Bid-ask spread when both sides exist.
    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }
}

/// Public trade print passed to `on_market_trade`.
#[derive(Debug, Clone)]
pub struct MarketTrade {
    /// Outcome token traded.
    pub token_id: String,
    /// Print price.
    pub price: f64,
    /// Print size.
    pub size: f64,
    /// Venue timestamp (Unix ms).
    pub timestamp_ms: u64,
}

/// Execution and market access handed to every callback.
///
/// Wraps the engine (intents flow engine-ward through these methods) and
/// the harness's market cache. The strategy never holds the engine
/// directly, so no reference cycle exists between the two.
pub struct StrategyCtx<'a> {
    engine: &'a mut ExecutionEngine,
    markets: &'a HashMap<String, Market>,
    default_size: f64,
}

impl<'a> StrategyCtx<'a> {
    pub(crate) fn new(
        engine: &'a mut ExecutionEngine,
        markets: &'a HashMap<String, Market>,
        default_size: f64,
    ) -> Self {
        Self {
            engine,
            markets,
            default_size,
        }
    }

    /// Buy an outcome. Price defaults to the market's last known price
    /// for that outcome, size to the configured default.
    pub async fn buy(
        &mut self,
        market: &Market,
        outcome: Outcome,
        price: Option<f64>,
        size: Option<f64>,
    ) -> Result<Order, ExecutionError> {
        let intent = OrderIntent {
            market_id: market.id.clone(),
            token_id: market.token_id(outcome).to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            price: price.unwrap_or_else(|| market.price(outcome)),
            size: size.unwrap_or(self.default_size),
        };
        self.engine.submit(intent).await
    }

    /// Sell an outcome. Price defaults to the last known price, size to
    /// the currently held position.
    pub async fn sell(
        &mut self,
        market: &Market,
        outcome: Outcome,
        price: Option<f64>,
        size: Option<f64>,
    ) -> Result<Order, ExecutionError> {
        let token_id = market.token_id(outcome).to_string();
        let held = self.engine.position(&token_id).map_or(0.0, |p| p.size);
        let intent = OrderIntent {
            market_id: market.id.clone(),
            token_id,
            side: OrderSide::Sell,
            order_type: OrderType::Limit,
            price: price.unwrap_or_else(|| market.price(outcome)),
            size: size.unwrap_or(held),
        };
        self.engine.submit(intent).await
    }

    /// Submit a fully specified intent.
    pub async fn submit(&mut self, intent: OrderIntent) -> Result<Order, ExecutionError> {
        self.engine.submit(intent).await
    }

    /// Cancel an order; see `ExecutionEngine::cancel` for semantics.
    pub async fn cancel(&mut self, order_id: &str) -> bool {
        self.engine.cancel(order_id).await
    }

    /// Held size in one outcome of a market (0 when flat).
    pub fn position(&self, market: &Market, outcome: Outcome) -> f64 {
        self.engine
            .position(market.token_id(outcome))
            .map_or(0.0, |p| p.size)
    }

    /// Current cash balance.
    pub fn balance(&self) -> f64 {
        self.engine.balance()
    }

    /// Balance plus positions marked at last known market prices.
    pub fn equity(&self) -> f64 {
        self.engine.equity(|token_id| {
            self.markets
                .values()
                .find_map(|m| m.price_for_token(token_id))
        })
    }

    /// Lifetime realized P&L.
    pub fn realized_pnl(&self) -> f64 {
        self.engine.realized_pnl()
    }

    /// A loaded market by id.
    pub fn market(&self, market_id: &str) -> Option<&Market> {
        self.markets.get(market_id)
    }

    /// All loaded markets.
    pub fn markets(&self) -> impl Iterator<Item = &Market> {
        self.markets.values()
    }

    /// Direct engine access for anything the helpers do not cover.
    pub fn engine(&mut self) -> &mut ExecutionEngine {
        self.engine
    }
}

/// The strategy contract.
///
/// `on_price_update` is the main trading hook and the only required
/// method. Callbacks may await (the engine's submit path does), but they
/// run serially: a long-running callback delays all further dispatch.
#[async_trait]
pub trait Strategy: Send {
    /// Strategy name, used in logs.
    fn name(&self) -> &str {
        "strategy"
    }

    /// Market references this strategy trades (URLs, slugs, or ids).
    /// Merged with the references from configuration.
    fn market_refs(&self) -> Vec<String> {
        Vec::new()
    }

    /// Called once before the streams start.
    async fn on_start(&mut self, _ctx: &mut StrategyCtx<'_>) {}

    /// Called once during shutdown, before in-flight fills are drained.
    async fn on_stop(&mut self, _ctx: &mut StrategyCtx<'_>) {}

    /// Called on every price change, after the market's last known price
    /// has been updated in place. `price` is the traded outcome's price.
    async fn on_price_update(&mut self, ctx: &mut StrategyCtx<'_>, market: &Market, price: f64);

    /// Called on order book snapshots.
    async fn on_orderbook_update(
        &mut self,
        _ctx: &mut StrategyCtx<'_>,
        _market: &Market,
        _book: &BookSnapshot,
    ) {
    }

    /// Called on public trade prints.
    async fn on_market_trade(
        &mut self,
        _ctx: &mut StrategyCtx<'_>,
        _market: &Market,
        _trade: &MarketTrade,
    ) {
    }

    /// Called when one of this strategy's orders fills.
    async fn on_fill(&mut self, _ctx: &mut StrategyCtx<'_>, _order: &Order, _trade: &Trade) {}

    /// Periodic heartbeat. Return true to suppress the harness's own
    /// status line.
    async fn on_heartbeat(&mut self, _ctx: &mut StrategyCtx<'_>) -> bool {
        false
    }

    /// Called with the message of a caught callback panic. Dispatch
    /// continues afterwards.
    fn on_error(&mut self, message: &str) {
        error!(strategy = self.name(), message, "Strategy callback error");
    }
}
