//! Streaming adapters - WebSocket transport and frame decoding.
//!
//! - `decoder`: wire frame → normalized `MarketEvent` translation
//! - `multiplexer`: dual-channel socket owner with reconnect and liveness

pub mod decoder;
pub mod multiplexer;

pub use decoder::MessageDecoder;
pub use multiplexer::{ChannelState, MuxStatus, StreamConfig, StreamMultiplexer};
