//! The supervisor: a single-task orchestration state machine.
//!
//! One periodic tick walks a fixed sequence of phases; no phase observes
//! another's in-flight changes, and a failing phase records the error and
//! lets the rest of the tick run:
//!
//! 1. redemption sweep (rate limited)
//! 2. market discovery, tracking and price enrichment
//! 3. order placement behind the temporal gate
//! 4. order reconciliation (status refresh, periodic merge, near-expiry
//!    liquidation, post-expiry cleanup)
//! 5. strategy-timeout exit
//! 6. fallback idle placement
//! 7. housekeeping of markets older than a day
//! 8. balance and P&L refresh
//! 9. dashboard view rebuild and persistence

mod discovery;
mod exit;
mod housekeeping;
mod orders;
pub mod persist;
mod positions;
mod recover;
mod redeem;
mod work;

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};

use updown_common::{BotState, Market, OrderRecord};
use updown_market::types::SignatureType;
use updown_market::{ChainClient, ChainError, ClobClient, ClobError, DataApiClient, Discovery};

use crate::adapters::{ChainApi, ExchangeApi, MarketSource, PositionsApi};
use crate::config::Config;
use crate::strategy;

pub use persist::StateFiles;

/// Snapshot shared with the dashboard; held only for short copies.
pub type SharedBotState = Arc<Mutex<BotState>>;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Clob(#[from] ClobError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// The bot core. Owns all mutable state; everything else sees copies.
pub struct Supervisor {
    pub(crate) cfg: Config,
    pub(crate) source: Arc<dyn MarketSource>,
    pub(crate) exchange: Arc<dyn ExchangeApi>,
    pub(crate) chain: Arc<dyn ChainApi>,
    pub(crate) positions_api: Arc<dyn PositionsApi>,
    pub(crate) files: StateFiles,
    shared: SharedBotState,

    pub(crate) tracked_markets: HashMap<String, Market>,
    pub(crate) orders_placed: HashMap<String, bool>,
    pub(crate) active_orders: HashMap<String, Vec<OrderRecord>>,
    pub(crate) order_history: HashMap<String, OrderRecord>,

    pub(crate) last_merge_attempt: HashMap<String, Instant>,
    pub(crate) merged_amounts: HashMap<String, Decimal>,
    pub(crate) positions_sold: HashMap<String, bool>,
    pub(crate) strategy_executed: HashMap<String, bool>,
    pub(crate) last_redemption_check: Option<Instant>,
}

impl Supervisor {
    /// Build a supervisor over the real clients.
    pub fn from_config(cfg: Config) -> Result<Self, SupervisorError> {
        let source = Arc::new(Discovery::new(cfg.gamma_api_base_url.clone()));
        let exchange = Arc::new(ClobClient::new(
            cfg.clob_api_url.clone(),
            cfg.chain_id,
            Some(&cfg.private_key),
            SignatureType::parse(&cfg.signature_type),
            cfg.funder_address.as_deref(),
        )?);
        let chain = Arc::new(ChainClient::new(cfg.rpc_url.clone(), &cfg.private_key, cfg.chain_id)?);
        let positions_api = Arc::new(DataApiClient::new(cfg.data_api_base_url.clone()));
        Ok(Self::with_adapters(
            cfg,
            source,
            exchange,
            chain,
            positions_api,
            StateFiles::default(),
        ))
    }

    /// Build a supervisor over arbitrary adapters (tests use mocks here).
    pub fn with_adapters(
        cfg: Config,
        source: Arc<dyn MarketSource>,
        exchange: Arc<dyn ExchangeApi>,
        chain: Arc<dyn ChainApi>,
        positions_api: Arc<dyn PositionsApi>,
        files: StateFiles,
    ) -> Self {
        Self {
            cfg,
            source,
            exchange,
            chain,
            positions_api,
            files,
            shared: Arc::new(Mutex::new(BotState::default())),
            tracked_markets: HashMap::new(),
            orders_placed: HashMap::new(),
            active_orders: HashMap::new(),
            order_history: HashMap::new(),
            last_merge_attempt: HashMap::new(),
            merged_amounts: HashMap::new(),
            positions_sold: HashMap::new(),
            strategy_executed: HashMap::new(),
            last_redemption_check: None,
        }
    }

    /// Handle for dashboard snapshots.
    pub fn shared_state(&self) -> SharedBotState {
        Arc::clone(&self.shared)
    }

    pub fn wallet_address(&self) -> String {
        self.chain.wallet_address()
    }

    /// Load persisted state, set up auth and recover orphaned orders.
    pub async fn start(&mut self) {
        info!("{}", "=".repeat(60));
        info!("Starting Polymarket up/down limit order bot");
        info!("{}", "=".repeat(60));
        info!(wallet = %self.chain.wallet_address(), "Wallet");
        info!(order_size_usd = %self.cfg.order_size_usd, spread = %self.cfg.spread_offset, "Sizing");
        info!(
            window_min = self.cfg.order_placement_min_minutes,
            window_max = self.cfg.order_placement_max_minutes,
            "Placement window (minutes before start)"
        );

        self.load_state();

        let balance = self.chain.usdc_balance().await.unwrap_or(Decimal::ZERO);

        match self.exchange.ensure_auth().await {
            Ok(()) => {
                info!("CLOB API creds derived and set");
                if let Err(e) = self.exchange.update_balance_allowance().await {
                    warn!(error = %e, "Could not update L2 balance allowance");
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not derive API creds; running in read-only mode");
            }
        }

        if let Err(e) = self.recover_existing_orders().await {
            warn!(error = %e, "Order recovery failed");
        }

        if let Ok(mut state) = self.shared.lock() {
            state.is_running = true;
            state.usdc_balance = balance;
            state.last_check = Some(Utc::now());
        }
    }

    pub fn stop(&self) {
        if let Ok(mut state) = self.shared.lock() {
            state.is_running = false;
        }
    }

    /// Drive ticks until an interrupt arrives. Each tick runs under a
    /// deadline equal to the tick interval; an interrupt cancels the tick at
    /// its next suspension point.
    pub async fn run(&mut self) {
        #[derive(PartialEq)]
        enum Outcome {
            Completed,
            DeadlineExceeded,
            Interrupted,
        }

        let interval = Duration::from_secs(self.cfg.check_interval_seconds.max(1));
        loop {
            let outcome = tokio::select! {
                result = tokio::time::timeout(interval, self.run_once()) => {
                    if result.is_ok() { Outcome::Completed } else { Outcome::DeadlineExceeded }
                }
                _ = tokio::signal::ctrl_c() => Outcome::Interrupted,
            };
            match outcome {
                Outcome::Interrupted => {
                    info!("Shutdown requested");
                    self.stop();
                    return;
                }
                Outcome::DeadlineExceeded => {
                    warn!("Tick exceeded its deadline and was abandoned");
                    self.record_error("tick deadline exceeded");
                }
                Outcome::Completed => {}
            }

            info!(seconds = interval.as_secs(), "Sleeping until next tick");
            let interrupted = tokio::select! {
                _ = tokio::time::sleep(interval) => false,
                _ = tokio::signal::ctrl_c() => true,
            };
            if interrupted {
                info!("Shutdown requested");
                self.stop();
                return;
            }
        }
    }

    /// One full tick.
    pub async fn run_once(&mut self) {
        let now = Utc::now();
        if let Ok(mut state) = self.shared.lock() {
            state.last_check = Some(now);
        }

        // Phase 1: redemption sweep (advisory; failures skip, not error).
        if self.should_check_redemptions() {
            match self.check_and_redeem_all().await {
                Ok(redeemed) if redeemed > 0 => {
                    info!(redeemed, "Claimed winnings from resolved markets");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Redemption sweep skipped"),
            }
            self.last_redemption_check = Some(Instant::now());
        }

        // Phase 2: discovery.
        info!("Discovering BTC 15-minute markets...");
        let discovered = self.source.discover(now).await;
        let mut upcoming = self.filter_upcoming(discovered, now);
        for market in &mut upcoming {
            strategy::refresh_market_prices(&self.exchange, market).await;
        }
        if let Ok(mut state) = self.shared.lock() {
            state.active_markets = upcoming.clone();
        }
        info!(count = upcoming.len(), "Upcoming/active markets");

        // Phase 3: placement gate.
        for market in &upcoming {
            let cid = market.condition_id.clone();
            if self.orders_placed.get(&cid).copied().unwrap_or(false) {
                continue;
            }
            if !discovery::should_place_orders(&self.cfg, market, now) {
                continue;
            }
            let (busy, reason) = self.has_active_market_work(now).await;
            if busy {
                info!(market = %market.market_slug, reason, "Skipping placement");
                continue;
            }
            info!(
                market = %market.market_slug,
                minutes_until_start = market.seconds_until_start(now) / 60,
                "Placing orders"
            );
            self.try_place_for_market(market, now).await;
        }

        // Phase 4: reconciliation.
        self.check_active_orders(now).await;

        // Phase 5: strategy-timeout exit.
        self.check_strategy_execution(now).await;

        // Phase 6: fallback idle placement.
        self.place_fallback_orders_if_idle(&upcoming, now).await;

        // Phase 7: housekeeping.
        self.cleanup_old_markets(now).await;

        // Phase 8: balance + total P&L refresh.
        match self.chain.usdc_balance().await {
            Ok(balance) => {
                if let Ok(mut state) = self.shared.lock() {
                    state.usdc_balance = balance;
                }
            }
            Err(e) => self.record_error(format!("balance refresh failed: {e}")),
        }
        let total_pnl: Decimal = self.order_history.values().filter_map(|o| o.pnl_usd).sum();
        if let Ok(mut state) = self.shared.lock() {
            state.total_pnl = total_pnl;
        }

        // Phase 9: view rebuild + persistence.
        self.update_order_lists(now);
        self.persist_orders();
    }

    /// Run one strategy placement and register the resulting group.
    pub(crate) async fn try_place_for_market(&mut self, market: &Market, now: DateTime<Utc>) -> bool {
        let placed =
            strategy::place_orders_for_market(&self.exchange, &self.chain, &self.cfg, market, now)
                .await;
        match placed {
            Ok(orders) if !orders.is_empty() => {
                self.register_orders(&market.condition_id, orders);
                true
            }
            Ok(_) => false,
            Err(e) => {
                self.record_error(&e);
                false
            }
        }
    }

    /// Mark a market as placed and absorb its order group.
    pub(crate) fn register_orders(&mut self, condition_id: &str, orders: Vec<OrderRecord>) {
        if orders.is_empty() {
            return;
        }
        self.orders_placed.insert(condition_id.to_string(), true);
        for order in &orders {
            self.order_history.insert(order.order_id.clone(), order.clone());
        }
        self.active_orders.insert(condition_id.to_string(), orders);
        self.persist_orders();
    }

    /// Rebuild the dashboard's pending/recent order views.
    pub(crate) fn update_order_lists(&mut self, now: DateTime<Utc>) {
        let now_ts = now.timestamp();

        let mut pending: Vec<OrderRecord> = Vec::new();
        for orders in self.active_orders.values() {
            for order in orders {
                if !order.is_live() {
                    continue;
                }
                match self.tracked_markets.get(&order.condition_id) {
                    None => pending.push(order.clone()),
                    Some(market) if market.end_ts >= now_ts - 300 && !market.is_resolved => {
                        pending.push(order.clone());
                    }
                    Some(_) => {}
                }
            }
        }
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut recent: Vec<OrderRecord> = self.order_history.values().cloned().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(100);

        if let Ok(mut state) = self.shared.lock() {
            state.pending_orders = pending;
            state.recent_orders = recent;
        }
    }

    pub(crate) fn record_error(&self, err: impl Display) {
        let message = err.to_string();
        warn!(error = %message, "Tick phase error");
        if let Ok(mut state) = self.shared.lock() {
            state.error_count += 1;
            state.last_error = Some(message);
        }
    }

    // ------------------------------------------------------------------
    // Persistence plumbing
    // ------------------------------------------------------------------

    fn load_state(&mut self) {
        match self.files.load_markets() {
            Ok(markets) => self.tracked_markets = markets,
            Err(e) => warn!(error = %e, "Could not load markets state"),
        }
        match self.files.load_history() {
            Ok(history) => {
                for order in history {
                    self.order_history.insert(order.order_id.clone(), order);
                }
            }
            Err(e) => warn!(error = %e, "Could not load order history"),
        }
        match self.files.load_orders() {
            Ok(groups) => {
                for (cid, orders) in groups {
                    if orders.is_empty() {
                        continue;
                    }
                    if orders.iter().any(OrderRecord::is_live) {
                        self.orders_placed.insert(cid.clone(), true);
                    }
                    for order in &orders {
                        self.order_history.insert(order.order_id.clone(), order.clone());
                    }
                    self.active_orders.insert(cid, orders);
                }
            }
            Err(e) => warn!(error = %e, "Could not load active orders"),
        }
        info!(
            markets = self.tracked_markets.len(),
            groups = self.active_orders.len(),
            history = self.order_history.len(),
            "Persisted state loaded"
        );
    }

    pub(crate) fn persist_orders(&self) {
        if let Err(e) = self.files.save_orders(&self.active_orders) {
            warn!(error = %e, "Could not persist active orders");
        }
        if let Err(e) = self.files.save_history(&self.order_history) {
            warn!(error = %e, "Could not persist order history");
        }
    }

    pub(crate) fn persist_markets(&self) {
        if let Err(e) = self.files.save_markets(&self.tracked_markets) {
            warn!(error = %e, "Could not persist markets state");
        }
    }

    /// Short condition-id prefix used in synthetic record ids.
    pub(crate) fn short_cid(condition_id: &str) -> &str {
        condition_id.get(..16).unwrap_or(condition_id)
    }
}
