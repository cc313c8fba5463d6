//! Polytrader - real-time trading runtime for Polymarket.
//!
//! Re-exports all modules for integration tests and benchmarks.

pub mod adapters;
pub mod analytics;
pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;
