//! Market-making bot for Polymarket's 15-minute BTC up/down markets.
//!
//! The heart of the crate is the [`supervisor::Supervisor`]: a single-task
//! state machine that discovers upcoming markets, places orders inside a
//! strict pre-start window, reconciles order state against the exchange and
//! the wallet, merges matched share pairs back into collateral, liquidates
//! residuals near expiry and redeems resolved positions.
//!
//! ## Modules
//!
//! - `config`: `.env` configuration
//! - `adapters`: trait seams over the exchange / chain / data clients
//! - `supervisor`: the tick state machine and its persistence
//! - `strategy`: order-authoring strategies (liquidity, split, test)
//! - `dashboard`: read-only axum API over a state snapshot
//! - `cli`: clap command surface

pub mod adapters;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod strategy;
pub mod supervisor;

pub use config::{Config, OrderMode, StrategyConfig};
pub use supervisor::Supervisor;
