//! Shared types and helpers for the up/down limit order bot.
//!
//! This crate contains:
//! - Domain types (`Market`, `OrderRecord`, `BotState`, side/status enums)
//! - Tick-size and price-grid helpers
//!
//! CRITICAL: All prices and quantities use `rust_decimal::Decimal`.
//! NEVER use f64 for financial math.

pub mod price;
pub mod types;

pub use price::{shares_for_usd, snap_to_tick, TickSize};
pub use types::*;
