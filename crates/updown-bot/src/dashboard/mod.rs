//! Read-only dashboard.
//!
//! The HTTP API serves a copy of the supervisor's `BotState` snapshot plus
//! rollups computed from the order-history file. Handlers never call the
//! exchange or the chain.

pub mod server;
pub mod stats;

pub use server::{serve, DashboardContext};
