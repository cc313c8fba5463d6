//! Integration tests - end-to-end runtime component testing.
//!
//! Exercises the harness dispatch path, the execution engine, and the
//! storage adapter together, with mockall standing in for the REST
//! ports. Wire frames go through the real decoder so the scenarios
//! cover both historical `price_change` shapes.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use mockall::mock;

use polytrader::adapters::feeds::MessageDecoder;
use polytrader::adapters::persistence::FileStore;
use polytrader::config::{AppConfig, PaperConfig};
use polytrader::domain::{
    Market, Order, OrderIntent, OrderSide, OrderStatus, OrderType, Outcome, Position, Trade,
    TradingMode,
};
use polytrader::ports::{
    MarketMetadata, OrderFilter, Storage, TradeFilter, VenueExecution, VenuePlacement,
};
use polytrader::usecases::{ExecutionEngine, Strategy, StrategyCtx, StrategyHarness};

// ---- Mock Definitions ----

mock! {
    pub Metadata {}

    #[async_trait]
    impl MarketMetadata for Metadata {
        async fn market_by_slug(&self, slug: &str) -> anyhow::Result<Market>;
        async fn market_by_id(&self, id: &str) -> anyhow::Result<Market>;
        async fn event_by_slug(&self, slug: &str) -> anyhow::Result<Vec<Market>>;
    }
}

mock! {
    pub Venue {}

    #[async_trait]
    impl VenueExecution for Venue {
        async fn place_order(&self, intent: &OrderIntent) -> anyhow::Result<VenuePlacement>;
        async fn cancel_order(&self, order_id: &str) -> anyhow::Result<bool>;
    }
}

/// Storage stub for tests that only assert on in-memory state.
struct NullStore;

#[async_trait]
impl Storage for NullStore {
    async fn save_order(&self, _order: &Order) -> anyhow::Result<()> {
        Ok(())
    }
    async fn save_trade(&self, _trade: &Trade) -> anyhow::Result<()> {
        Ok(())
    }
    async fn save_position(&self, _position: &Position) -> anyhow::Result<()> {
        Ok(())
    }
    async fn list_orders(&self, _filter: &OrderFilter) -> anyhow::Result<Vec<Order>> {
        Ok(Vec::new())
    }
    async fn list_trades(&self, _filter: &TradeFilter) -> anyhow::Result<Vec<Trade>> {
        Ok(Vec::new())
    }
}

// ---- Test Fixtures ----

fn market(id: &str, yes: &str, no: &str) -> Market {
    Market {
        id: id.to_string(),
        condition_id: format!("0xcond-{id}"),
        question: format!("Question {id}?"),
        slug: format!("slug-{id}"),
        token_id_yes: yes.to_string(),
        token_id_no: no.to_string(),
        price_yes: 0.50,
        price_no: 0.50,
        volume: 0.0,
        liquidity: 0.0,
        active: true,
        closed: false,
        fetched_at: Utc::now(),
    }
}

fn paper_engine() -> ExecutionEngine {
    let paper = PaperConfig {
        starting_balance: 10_000.0,
        slippage: 0.0,
        fill_delay_ms: 0,
    };
    ExecutionEngine::new(TradingMode::Paper, paper, Arc::new(NullStore), None)
}

fn config_with_markets(markets: &[&str]) -> AppConfig {
    let mut config = AppConfig::default();
    config.strategy.markets = markets.iter().map(|m| m.to_string()).collect();
    config
}

/// Records every callback invocation through a shared handle and
/// optionally buys on the first price update.
#[derive(Clone)]
struct RecordingStrategy {
    calls: Arc<Mutex<Vec<String>>>,
    buy_on_first_update: bool,
}

impl RecordingStrategy {
    fn new(buy_on_first_update: bool) -> (Self, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                calls: Arc::clone(&calls),
                buy_on_first_update,
            },
            calls,
        )
    }

    fn record(&self, entry: String) {
        self.calls.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl Strategy for RecordingStrategy {
    fn name(&self) -> &str {
        "recording"
    }

    async fn on_price_update(&mut self, ctx: &mut StrategyCtx<'_>, market: &Market, price: f64) {
        self.record(format!("price:{}:{price}", market.id));

        if self.buy_on_first_update {
            self.buy_on_first_update = false;
            ctx.buy(market, Outcome::Yes, Some(0.40), Some(100.0))
                .await
                .expect("paper buy should be accepted");
        }
    }

    async fn on_fill(&mut self, _ctx: &mut StrategyCtx<'_>, order: &Order, trade: &Trade) {
        self.record(format!("fill:{}:{}:{}", order.id, trade.price, trade.size));
    }
}

// ---- Harness Scenarios ----

#[tokio::test]
async fn market_resolution_warns_and_continues() {
    let mut metadata = MockMetadata::new();
    metadata
        .expect_market_by_slug()
        .returning(|slug| match slug {
            "slug-a" => Ok(market("a", "TY", "TN")),
            other => Err(anyhow::anyhow!("unknown slug {other}")),
        });
    metadata
        .expect_market_by_id()
        .returning(|id| Ok(market(id, "BY", "BN")));

    let (strategy, _calls) = RecordingStrategy::new(false);
    let config = config_with_markets(&["slug-a", "12345", "slug-missing"]);
    let mut harness =
        StrategyHarness::new(config, strategy, paper_engine(), Arc::new(metadata));

    harness.load_markets().await;

    // The failing reference is skipped, the other two resolve.
    assert_eq!(harness.markets().len(), 2);
    assert!(harness.markets().contains_key("a"));
    assert!(harness.markets().contains_key("12345"));
}

#[tokio::test]
async fn event_url_loads_every_market_in_the_event() {
    let mut metadata = MockMetadata::new();
    metadata.expect_event_by_slug().returning(|_slug| {
        Ok(vec![market("e1", "E1Y", "E1N"), market("e2", "E2Y", "E2N")])
    });

    let (strategy, _calls) = RecordingStrategy::new(false);
    let config = config_with_markets(&["https://polymarket.com/event/some-event"]);
    let mut harness =
        StrategyHarness::new(config, strategy, paper_engine(), Arc::new(metadata));

    harness.load_markets().await;
    assert_eq!(harness.markets().len(), 2);
}

#[tokio::test]
async fn batched_price_update_reaches_strategy_in_order() {
    let mut metadata = MockMetadata::new();
    metadata
        .expect_market_by_slug()
        .returning(|_| Ok(market("m1", "TY", "TN")));

    let (strategy, calls) = RecordingStrategy::new(false);
    let config = config_with_markets(&["slug-m1"]);
    let mut harness =
        StrategyHarness::new(config, strategy, paper_engine(), Arc::new(metadata));
    harness.load_markets().await;

    let mut decoder = MessageDecoder::new();
    let events = decoder.decode(
        r#"{"event_type":"price_change","market":"m1","price_changes":[
            {"asset_id":"TY","price":"0.65","best_bid":"0.64","best_ask":"0.66"},
            {"asset_id":"TN","price":"0.35"}
        ]}"#,
    );
    assert_eq!(events.len(), 2);
    for event in events {
        harness.dispatch(event).await;
    }

    let market = &harness.markets()["m1"];
    assert_eq!(market.price_yes, 0.65);
    assert_eq!(market.price_no, 0.35);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.as_slice(), ["price:m1:0.65", "price:m1:0.35"]);
}

#[tokio::test]
async fn legacy_price_update_reaches_strategy() {
    let mut metadata = MockMetadata::new();
    metadata
        .expect_market_by_slug()
        .returning(|_| Ok(market("m1", "TY", "TN")));

    let (strategy, calls) = RecordingStrategy::new(false);
    let config = config_with_markets(&["slug-m1"]);
    let mut harness =
        StrategyHarness::new(config, strategy, paper_engine(), Arc::new(metadata));
    harness.load_markets().await;

    let mut decoder = MessageDecoder::new();
    let events = decoder.decode(
        r#"{"event_type":"price_change","market":"m1","asset_id":"TY","price":"0.70","bid":"0.69","ask":"0.71"}"#,
    );
    assert_eq!(events.len(), 1);
    for event in events {
        harness.dispatch(event).await;
    }

    assert_eq!(harness.markets()["m1"].price_yes, 0.70);
    assert_eq!(calls.lock().unwrap().as_slice(), ["price:m1:0.7"]);
}

#[tokio::test]
async fn strategy_buy_produces_fill_notification() {
    let mut metadata = MockMetadata::new();
    metadata
        .expect_market_by_slug()
        .returning(|_| Ok(market("m1", "TY", "TN")));

    let (strategy, calls) = RecordingStrategy::new(true);
    let config = config_with_markets(&["slug-m1"]);
    let mut harness =
        StrategyHarness::new(config, strategy, paper_engine(), Arc::new(metadata));
    harness.load_markets().await;

    let mut decoder = MessageDecoder::new();
    let events = decoder.decode(
        r#"{"event_type":"price_change","market":"m1","asset_id":"TY","price":"0.40"}"#,
    );
    for event in events {
        harness.dispatch(event).await;
    }

    // The buy filled at the limit and the strategy saw the fill.
    let calls = calls.lock().unwrap();
    assert_eq!(calls[0], "price:m1:0.4");
    assert_eq!(calls[1], "fill:paper-000001:0.4:100");

    let engine = harness.engine();
    assert!((engine.balance() - 9_960.0).abs() < 1e-9);
    let position = engine.position("TY").unwrap();
    assert!((position.size - 100.0).abs() < 1e-9);
    assert!((position.avg_entry_price - 0.40).abs() < 1e-9);
}

#[tokio::test]
async fn unknown_token_events_are_ignored() {
    let mut metadata = MockMetadata::new();
    metadata
        .expect_market_by_slug()
        .returning(|_| Ok(market("m1", "TY", "TN")));

    let (strategy, calls) = RecordingStrategy::new(false);
    let config = config_with_markets(&["slug-m1"]);
    let mut harness =
        StrategyHarness::new(config, strategy, paper_engine(), Arc::new(metadata));
    harness.load_markets().await;

    let mut decoder = MessageDecoder::new();
    let events = decoder.decode(
        r#"{"event_type":"price_change","market":"other","asset_id":"ZZ","price":"0.10"}"#,
    );
    for event in events {
        harness.dispatch(event).await;
    }

    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(harness.markets()["m1"].price_yes, 0.50);
}

// ---- Engine Scenarios (paper mode, slippage 0) ----

#[tokio::test]
async fn buy_sell_cycle_matches_expected_numbers() {
    let mut engine = paper_engine();

    let buy = OrderIntent {
        market_id: "m1".to_string(),
        token_id: "T1".to_string(),
        side: OrderSide::Buy,
        order_type: OrderType::Limit,
        price: 0.40,
        size: 100.0,
    };
    let order = engine.submit(buy).await.unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert!((engine.balance() - 9_960.0).abs() < 1e-9);

    let sell = OrderIntent {
        market_id: "m1".to_string(),
        token_id: "T1".to_string(),
        side: OrderSide::Sell,
        order_type: OrderType::Limit,
        price: 0.50,
        size: 100.0,
    };
    let order = engine.submit(sell).await.unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert!((engine.balance() - 10_010.0).abs() < 1e-9);
    assert!(engine.position("T1").is_none());
    assert!((engine.realized_pnl() - 10.0).abs() < 1e-9);
}

#[tokio::test]
async fn venue_rejection_inserts_no_order() {
    let mut venue = MockVenue::new();
    venue.expect_place_order().returning(|_| {
        Ok(VenuePlacement {
            order_id: String::new(),
            accepted: false,
            rejection_reason: Some("insufficient allowance".to_string()),
        })
    });

    let paper = PaperConfig {
        starting_balance: 10_000.0,
        slippage: 0.0,
        fill_delay_ms: 0,
    };
    let mut engine = ExecutionEngine::new(
        TradingMode::Live,
        paper,
        Arc::new(NullStore),
        Some(Arc::new(venue)),
    );

    let intent = OrderIntent {
        market_id: "m1".to_string(),
        token_id: "T1".to_string(),
        side: OrderSide::Buy,
        order_type: OrderType::Limit,
        price: 0.40,
        size: 100.0,
    };
    let err = engine.submit(intent).await.unwrap_err();
    assert!(err.to_string().contains("venue rejected"));
    assert!(engine.open_orders().is_empty());
    assert!(engine.trades().is_empty());
}

#[tokio::test]
async fn live_fill_arrives_via_user_channel() {
    let mut venue = MockVenue::new();
    venue.expect_place_order().returning(|_| {
        Ok(VenuePlacement {
            order_id: "venue-77".to_string(),
            accepted: true,
            rejection_reason: None,
        })
    });

    let paper = PaperConfig {
        starting_balance: 10_000.0,
        slippage: 0.0,
        fill_delay_ms: 0,
    };
    let mut engine = ExecutionEngine::new(
        TradingMode::Live,
        paper,
        Arc::new(NullStore),
        Some(Arc::new(venue)),
    );

    let intent = OrderIntent {
        market_id: "m1".to_string(),
        token_id: "T1".to_string(),
        side: OrderSide::Buy,
        order_type: OrderType::Limit,
        price: 0.40,
        size: 100.0,
    };
    let order = engine.submit(intent).await.unwrap();
    assert_eq!(order.id, "venue-77");
    assert_eq!(order.status, OrderStatus::Open);
    assert!(engine.trades().is_empty());

    // Partial fill, then the remainder; a redelivered copy is deduped.
    let mut decoder = MessageDecoder::new();
    let frames = [
        r#"{"event_type":"order_fill","order_id":"venue-77","price":"0.40","size":"60","trade_id":"f-1"}"#,
        r#"{"event_type":"order_fill","order_id":"venue-77","price":"0.40","size":"60","trade_id":"f-1"}"#,
        r#"{"event_type":"order_fill","order_id":"venue-77","price":"0.40","size":"40","trade_id":"f-2"}"#,
    ];
    for frame in frames {
        for event in decoder.decode(frame) {
            if let polytrader::domain::MarketEvent::OrderUpdate {
                order_id,
                kind,
                price,
                size,
                trade_id,
                timestamp_ms,
            } = event
            {
                engine.apply_order_update(
                    &order_id,
                    kind,
                    price,
                    size,
                    trade_id.as_deref(),
                    timestamp_ms,
                );
            }
        }
    }

    let order = engine.order("venue-77").unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert!((order.filled_size - 100.0).abs() < 1e-9);
    assert_eq!(engine.trades().len(), 2);
    assert!((engine.balance() - 9_960.0).abs() < 1e-9);
}

// ---- Storage Round Trips ----

#[tokio::test]
async fn persisted_fill_round_trips_through_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path().to_str().unwrap()).await.unwrap());

    let paper = PaperConfig {
        starting_balance: 10_000.0,
        slippage: 0.0,
        fill_delay_ms: 0,
    };
    let mut engine =
        ExecutionEngine::new(TradingMode::Paper, paper, Arc::clone(&store) as Arc<dyn Storage>, None);

    let intent = OrderIntent {
        market_id: "m1".to_string(),
        token_id: "T1".to_string(),
        side: OrderSide::Buy,
        order_type: OrderType::Limit,
        price: 0.40,
        size: 100.0,
    };
    engine.submit(intent).await.unwrap();

    for fill in engine.take_fills() {
        // Persist twice: saves are idempotent by primary key.
        engine.persist_fill(&fill).await;
        engine.persist_fill(&fill).await;
    }

    let orders = store.list_orders(&OrderFilter::default()).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].id, "paper-000001");
    assert_eq!(orders[0].status, OrderStatus::Filled);

    let trades = store.list_trades(&TradeFilter::default()).await.unwrap();
    assert_eq!(trades.len(), 1);
    assert!((trades[0].value() - 40.0).abs() < 1e-9);

    let filtered = store
        .list_trades(&TradeFilter {
            token_id: Some("OTHER".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(filtered.is_empty());
}
