//! External-world clients for the up/down limit order bot.
//!
//! - `discovery`: Gamma API market discovery by deterministic slug enumeration
//! - `clob`: Polymarket CLOB client (EIP-712 order signing, HMAC L2 auth)
//! - `chain`: Polygon chain client (balances, approvals, merge/redeem)
//! - `data`: Data API positions client (redemption sweep input)

pub mod auth;
pub mod chain;
pub mod clob;
pub mod contracts;
pub mod data;
pub mod discovery;
pub mod order_builder;
pub mod types;

pub use chain::{ChainClient, ChainError};
pub use clob::{ClobClient, ClobError, OrderArgs, OrderType};
pub use data::{DataApiClient, DataApiError, UserPosition};
pub use discovery::{Discovery, DiscoveryError};
pub use types::{ApiCreds, BookLevel, OpenOrder, OrderBookSummary, OrderDetails, SignatureType};
