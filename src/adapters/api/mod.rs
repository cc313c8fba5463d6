//! REST API adapters - Gamma metadata and CLOB execution.
//!
//! - `gamma`: rate-limited metadata client (MarketMetadata port)
//! - `clob`: signed live order gateway (VenueExecution port)
//! - `auth`: HMAC-SHA256 request signing
//! - `urls`: Polymarket URL → slug extraction

pub mod auth;
pub mod clob;
pub mod gamma;
pub mod urls;

pub use auth::{ApiCredentials, ClobAuth};
pub use clob::ClobExecution;
pub use gamma::GammaClient;
