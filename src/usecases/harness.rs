//! Strategy harness - composition root of the runtime.
//!
//! Resolves market references on startup, subscribes the multiplexer,
//! fans decoded events into the strategy, runs the heartbeat and the
//! optional market refresh cadence, and shuts everything down cleanly.
//!
//! The harness is single-threaded from the strategy's point of view:
//! every callback runs serially on the dispatch task. A callback panic
//! is caught at the dispatch boundary, routed to `on_error`, and
//! dispatch continues.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use super::execution::ExecutionEngine;
use super::strategy::{BookSnapshot, MarketTrade, Strategy, StrategyCtx};
use crate::adapters::api::urls::{is_market_url, parse_market_url, UrlKind};
use crate::adapters::feeds::{StreamConfig, StreamMultiplexer};
use crate::config::AppConfig;
use crate::domain::{Market, MarketEvent, OrderEventKind};
use crate::ports::MarketMetadata;

/// Runs one strategy against live market data.
pub struct StrategyHarness<S: Strategy> {
    config: AppConfig,
    strategy: S,
    engine: ExecutionEngine,
    metadata: Arc<dyn MarketMetadata>,
    mux: Arc<StreamMultiplexer>,
    /// Taken by `run`; present only before the harness has started.
    event_rx: Option<mpsc::Receiver<MarketEvent>>,
    /// Loaded market cache, keyed by market id. The dispatch loop is the
    /// only writer after load.
    markets: HashMap<String, Market>,
}

impl<S: Strategy> StrategyHarness<S> {
    /// Compose a harness from its parts.
    pub fn new(
        config: AppConfig,
        strategy: S,
        engine: ExecutionEngine,
        metadata: Arc<dyn MarketMetadata>,
    ) -> Self {
        let (mux, event_rx) = StreamMultiplexer::new(StreamConfig::from_config(&config));
        Self {
            config,
            strategy,
            engine,
            metadata,
            mux: Arc::new(mux),
            event_rx: Some(event_rx),
            markets: HashMap::new(),
        }
    }

    /// The loaded market cache.
    pub fn markets(&self) -> &HashMap<String, Market> {
        &self.markets
    }

    /// The execution engine.
    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// The stream multiplexer.
    pub fn multiplexer(&self) -> &Arc<StreamMultiplexer> {
        &self.mux
    }

    /// Run the strategy until shutdown fires or the stream fails
    /// terminally.
    #[instrument(skip_all, fields(strategy = self.strategy.name()))]
    pub async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let mut event_rx = self
            .event_rx
            .take()
            .context("Harness already ran; build a new one")?;

        self.load_markets().await;
        self.subscribe_markets().await;

        self.call_start().await;

        let mux = Arc::clone(&self.mux);
        let mux_shutdown = shutdown_rx.resubscribe();
        let mut mux_task = tokio::spawn(async move { mux.run(mux_shutdown).await });
        let mut mux_done = false;

        let heartbeat_period =
            Duration::from_secs(self.config.strategy.heartbeat_interval_secs);
        let mut heartbeat = interval_at(Instant::now() + heartbeat_period, heartbeat_period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let refresh_secs = self.config.strategy.market_refresh_interval_secs;
        let refresh_period = Duration::from_secs(refresh_secs.max(1));
        let mut refresh = interval_at(Instant::now() + refresh_period, refresh_period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            markets = self.markets.len(),
            mode = %self.engine.mode(),
            "Strategy running"
        );

        let run_result = loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break Ok(());
                }
                joined = &mut mux_task => {
                    mux_done = true;
                    break match joined {
                        Ok(result) => result.context("Stream multiplexer exited"),
                        Err(e) => Err(anyhow::anyhow!("Stream task panicked: {e}")),
                    };
                }
                _ = heartbeat.tick() => {
                    self.heartbeat().await;
                }
                _ = refresh.tick(), if refresh_secs > 0 => {
                    self.refresh_markets().await;
                }
                event = event_rx.recv() => {
                    match event {
                        Some(event) => self.dispatch(event).await,
                        None => break Ok(()),
                    }
                }
            }
        };

        self.call_stop().await;
        self.drain_fills().await;

        if !mux_done {
            // Shutdown has been signalled; give the sockets a moment to
            // send their close frames before giving up on the task.
            if tokio::time::timeout(Duration::from_secs(5), &mut mux_task)
                .await
                .is_err()
            {
                warn!("Stream task did not stop in time, aborting");
                mux_task.abort();
            }
        }

        info!(strategy = self.strategy.name(), "Strategy stopped");
        run_result
    }

    /// Resolve every configured market reference through the metadata
    /// port. Unresolvable references warn and are skipped.
    pub async fn load_markets(&mut self) {
        let mut references = self.strategy.market_refs();
        references.extend(self.config.strategy.markets.iter().cloned());

        let mut seen = HashSet::new();
        references.retain(|r| seen.insert(r.clone()));

        info!(count = references.len(), "Loading market references");

        for reference in references {
            match self.resolve_reference(&reference).await {
                Ok(markets) => {
                    for market in markets {
                        info!(
                            market_id = %market.id,
                            slug = %market.slug,
                            question = %market.question,
                            "Market loaded"
                        );
                        self.markets.insert(market.id.clone(), market);
                    }
                }
                Err(e) => {
                    warn!(reference, error = %e, "Could not resolve market reference");
                }
            }
        }

        if self.markets.is_empty() {
            warn!("No market references resolved; running without subscriptions");
        }
    }

    /// Resolve one reference: full URL, bare slug, or numeric id.
    async fn resolve_reference(&self, reference: &str) -> Result<Vec<Market>> {
        if is_market_url(reference) {
            let parsed =
                parse_market_url(reference).context("Not a recognizable Polymarket URL")?;
            return match parsed.kind {
                UrlKind::Event => self.metadata.event_by_slug(&parsed.slug).await,
                UrlKind::Market => Ok(vec![self.metadata.market_by_slug(&parsed.slug).await?]),
            };
        }

        if reference.chars().all(|c| c.is_ascii_digit()) {
            return Ok(vec![self.metadata.market_by_id(reference).await?]);
        }

        Ok(vec![self.metadata.market_by_slug(reference).await?])
    }

    /// Subscribe both outcome tokens of every loaded market, and the
    /// condition ids on the user channel when credentials exist.
    async fn subscribe_markets(&self) {
        let token_ids: Vec<String> = self
            .markets
            .values()
            .flat_map(|m| m.token_ids().map(str::to_string))
            .collect();
        if !token_ids.is_empty() {
            self.mux.subscribe_market(token_ids).await;
        }

        if self.config.has_ws_credentials() {
            let condition_ids: Vec<String> = self
                .markets
                .values()
                .map(|m| m.condition_id.clone())
                .filter(|c| !c.is_empty())
                .collect();
            if !condition_ids.is_empty() {
                self.mux.subscribe_user(condition_ids).await;
            }
        }
    }

    /// Feed one event through the dispatch path.
    ///
    /// Exposed for replay tooling and tests; `run` calls this for every
    /// event the multiplexer produces.
    pub async fn dispatch(&mut self, event: MarketEvent) {
        match event {
            MarketEvent::PriceChange {
                token_id, price, ..
            } => {
                let Some((market_id, outcome)) = self.market_for_token(&token_id) else {
                    debug!(token_id, "Price change for unknown token");
                    return;
                };
                // The only in-place market mutation the harness performs.
                let market = match self.markets.get_mut(&market_id) {
                    Some(market) => {
                        market.set_price(outcome, price);
                        market.clone()
                    }
                    None => return,
                };

                let mut ctx = StrategyCtx::new(
                    &mut self.engine,
                    &self.markets,
                    self.config.strategy.default_size,
                );
                let result = AssertUnwindSafe(
                    self.strategy.on_price_update(&mut ctx, &market, price),
                )
                .catch_unwind()
                .await;
                self.report_panic("on_price_update", result.err());
            }
            MarketEvent::Book {
                token_id,
                bids,
                asks,
                timestamp_ms,
                ..
            } => {
                let Some((market_id, _)) = self.market_for_token(&token_id) else {
                    debug!(token_id, "Book for unknown token");
                    return;
                };
                let Some(market) = self.markets.get(&market_id).cloned() else {
                    return;
                };
                let book = BookSnapshot {
                    token_id,
                    bids,
                    asks,
                    timestamp_ms,
                };

                let mut ctx = StrategyCtx::new(
                    &mut self.engine,
                    &self.markets,
                    self.config.strategy.default_size,
                );
                let result = AssertUnwindSafe(
                    self.strategy.on_orderbook_update(&mut ctx, &market, &book),
                )
                .catch_unwind()
                .await;
                self.report_panic("on_orderbook_update", result.err());
            }
            MarketEvent::Trade {
                token_id,
                price,
                size,
                timestamp_ms,
                ..
            } => {
                let Some((market_id, _)) = self.market_for_token(&token_id) else {
                    debug!(token_id, "Trade for unknown token");
                    return;
                };
                let Some(market) = self.markets.get(&market_id).cloned() else {
                    return;
                };
                let trade = MarketTrade {
                    token_id,
                    price,
                    size,
                    timestamp_ms,
                };

                let mut ctx = StrategyCtx::new(
                    &mut self.engine,
                    &self.markets,
                    self.config.strategy.default_size,
                );
                let result = AssertUnwindSafe(
                    self.strategy.on_market_trade(&mut ctx, &market, &trade),
                )
                .catch_unwind()
                .await;
                self.report_panic("on_market_trade", result.err());
            }
            MarketEvent::OrderUpdate {
                order_id,
                kind,
                price,
                size,
                trade_id,
                timestamp_ms,
            } => {
                self.engine.apply_order_update(
                    &order_id,
                    kind,
                    price,
                    size,
                    trade_id.as_deref(),
                    timestamp_ms,
                );
                if kind != OrderEventKind::Fill {
                    self.engine.persist_order(&order_id).await;
                }
            }
        }

        self.drain_fills().await;
    }

    /// Drain queued fills: notify the strategy, then persist. A fill
    /// handler may trade again, so loop until the queue stays empty.
    async fn drain_fills(&mut self) {
        loop {
            let fills = self.engine.take_fills();
            if fills.is_empty() {
                break;
            }
            for fill in fills {
                let mut ctx = StrategyCtx::new(
                    &mut self.engine,
                    &self.markets,
                    self.config.strategy.default_size,
                );
                let result = AssertUnwindSafe(
                    self.strategy.on_fill(&mut ctx, &fill.order, &fill.trade),
                )
                .catch_unwind()
                .await;
                self.report_panic("on_fill", result.err());

                self.engine.persist_fill(&fill).await;
            }
        }
    }

    /// Heartbeat: let the strategy handle it, otherwise log status.
    async fn heartbeat(&mut self) {
        let mut ctx = StrategyCtx::new(
            &mut self.engine,
            &self.markets,
            self.config.strategy.default_size,
        );
        let result = AssertUnwindSafe(self.strategy.on_heartbeat(&mut ctx))
            .catch_unwind()
            .await;

        let handled = match result {
            Ok(handled) => handled,
            Err(payload) => {
                self.report_panic("on_heartbeat", Some(payload));
                false
            }
        };

        if !handled {
            let status = self.mux.status().await;
            let (frames_ok, frames_failed, events_out) = self.mux.decode_stats().await;
            info!(
                strategy = self.strategy.name(),
                markets = self.markets.len(),
                positions = self.engine.positions().len(),
                open_orders = self.engine.open_orders().len(),
                balance = self.engine.balance(),
                realized_pnl = self.engine.realized_pnl(),
                market_ws = %status.market,
                user_ws = %status.user,
                frames_ok,
                frames_failed,
                events_out,
                "Heartbeat"
            );
        }

        self.drain_fills().await;
    }

    /// Re-resolve loaded markets through the metadata port, preserving
    /// stream-updated prices (the stream is the fresher source).
    async fn refresh_markets(&mut self) {
        let ids: Vec<String> = self.markets.keys().cloned().collect();
        debug!(count = ids.len(), "Refreshing market metadata");

        for id in ids {
            match self.metadata.market_by_id(&id).await {
                Ok(mut fresh) => {
                    if let Some(current) = self.markets.get(&id) {
                        fresh.price_yes = current.price_yes;
                        fresh.price_no = current.price_no;
                    }
                    self.markets.insert(id, fresh);
                }
                Err(e) => warn!(market_id = %id, error = %e, "Market refresh failed"),
            }
        }
    }

    async fn call_start(&mut self) {
        let mut ctx = StrategyCtx::new(
            &mut self.engine,
            &self.markets,
            self.config.strategy.default_size,
        );
        let result = AssertUnwindSafe(self.strategy.on_start(&mut ctx))
            .catch_unwind()
            .await;
        self.report_panic("on_start", result.err());
        self.drain_fills().await;
    }

    async fn call_stop(&mut self) {
        let mut ctx = StrategyCtx::new(
            &mut self.engine,
            &self.markets,
            self.config.strategy.default_size,
        );
        let result = AssertUnwindSafe(self.strategy.on_stop(&mut ctx))
            .catch_unwind()
            .await;
        self.report_panic("on_stop", result.err());
    }

    /// Locate the market owning a token id, with its outcome side.
    fn market_for_token(&self, token_id: &str) -> Option<(String, crate::domain::Outcome)> {
        self.markets
            .values()
            .find_map(|m| m.outcome_for(token_id).map(|o| (m.id.clone(), o)))
    }

    /// Route a caught callback panic to `on_error`.
    fn report_panic(
        &mut self,
        hook: &str,
        payload: Option<Box<dyn std::any::Any + Send>>,
    ) {
        if let Some(payload) = payload {
            let message = format!("{hook} panicked: {}", panic_message(payload.as_ref()));
            warn!(
                strategy = self.strategy.name(),
                message = %message,
                "Caught strategy panic"
            );
            self.strategy.on_error(&message);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
