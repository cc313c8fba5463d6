//! Adapters layer - hexagonal architecture outer ring.
//!
//! Concrete implementations of the port traits plus the transport
//! machinery the runtime owns directly. Each sub-module groups adapters
//! by infrastructure concern:
//!
//! - `api`: Gamma/CLOB REST clients and request signing
//! - `feeds`: WebSocket multiplexer and frame decoder
//! - `persistence`: file-backed storage and CSV export

pub mod api;
pub mod feeds;
pub mod persistence;
