//! Use cases layer - application business logic.
//!
//! Orchestrates domain types with the ports to implement the runtime's
//! core workflows:
//!
//! - `execution`: unified paper/live order path and position accounting
//! - `strategy`: the callback contract user strategies implement
//! - `harness`: event loop composing streams, engine and strategy

pub mod execution;
pub mod harness;
pub mod strategy;

pub use execution::{ExecutionEngine, ExecutionError, FillEvent};
pub use harness::StrategyHarness;
pub use strategy::{BookSnapshot, MarketTrade, Strategy, StrategyCtx};
