//! End-to-end supervisor ticks against in-memory adapters.
//!
//! Each test seeds the state files and the mock exchange/chain, runs one or
//! more ticks, and asserts on the shared snapshot, the recorded calls and
//! the rewritten state files.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use updown_bot::adapters::{
    BookTop, ChainApi, ExchangeApi, MarketSource, OpenOrderInfo, OrderPlacement, OrderRequest,
    PositionsApi, RemoteOrder,
};
use updown_bot::config::{Config, OrderMode, StrategyConfig};
use updown_bot::supervisor::{StateFiles, Supervisor};
use updown_common::{
    Market, OrderRecord, OrderSide, OrderStatus, Outcome, TickSize, TransactionType,
};
use updown_market::{ChainError, ClobError, DataApiError, UserPosition};

// ----------------------------------------------------------------------
// Mocks
// ----------------------------------------------------------------------

#[derive(Default)]
struct MockSource {
    markets: Mutex<Vec<Market>>,
}

#[async_trait]
impl MarketSource for MockSource {
    async fn discover(&self, _now: DateTime<Utc>) -> Vec<Market> {
        self.markets.lock().unwrap().clone()
    }
}

#[derive(Default)]
struct MockExchange {
    books: Mutex<HashMap<String, BookTop>>,
    statuses: Mutex<HashMap<String, RemoteOrder>>,
    open: Mutex<Vec<OpenOrderInfo>>,
    placements: Mutex<Vec<OrderRequest>>,
    cancelled: Mutex<Vec<String>>,
    next_id: AtomicUsize,
    /// When set, SELL placements never show up in the open-order listing.
    hide_sells_from_book: AtomicBool,
}

impl MockExchange {
    fn set_book(&self, token_id: &str, bid: Decimal, ask: Decimal) {
        self.books.lock().unwrap().insert(
            token_id.to_string(),
            BookTop {
                best_bid: Some(bid),
                best_ask: Some(ask),
            },
        );
    }

    fn set_status(&self, order_id: &str, status: &str, matched: Decimal, original: Decimal) {
        self.statuses.lock().unwrap().insert(
            order_id.to_string(),
            RemoteOrder {
                status: status.to_string(),
                size_matched: matched,
                original_size: original,
            },
        );
    }

    fn placements(&self) -> Vec<OrderRequest> {
        self.placements.lock().unwrap().clone()
    }

    fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExchangeApi for MockExchange {
    fn wallet_address(&self) -> Option<String> {
        Some("0x00000000000000000000000000000000deadbeef".to_string())
    }

    fn can_trade(&self) -> bool {
        true
    }

    async fn ensure_auth(&self) -> Result<(), ClobError> {
        Ok(())
    }

    async fn book_top(&self, token_id: &str) -> Result<BookTop, ClobError> {
        Ok(self
            .books
            .lock()
            .unwrap()
            .get(token_id)
            .copied()
            .unwrap_or_default())
    }

    async fn tick_size(&self, _token_id: &str) -> Result<TickSize, ClobError> {
        Ok(TickSize::Hundredth)
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderPlacement, ClobError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let order_id = format!("order-{n}");
        self.placements.lock().unwrap().push(request.clone());

        let hidden =
            request.side == OrderSide::Sell && self.hide_sells_from_book.load(Ordering::SeqCst);
        if !hidden {
            self.open.lock().unwrap().push(OpenOrderInfo {
                id: order_id.clone(),
                condition_id: String::new(),
                token_id: request.token_id.clone(),
                side: request.side,
                price: request.price,
                size: request.size,
            });
        }
        Ok(OrderPlacement::Accepted { order_id })
    }

    async fn order_status(&self, order_id: &str) -> Result<RemoteOrder, ClobError> {
        self.statuses
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .ok_or(ClobError::Api {
                status: 404,
                body: "not found".to_string(),
            })
    }

    async fn open_orders(
        &self,
        _condition_id: Option<&str>,
    ) -> Result<Vec<OpenOrderInfo>, ClobError> {
        Ok(self.open.lock().unwrap().clone())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), ClobError> {
        self.cancelled.lock().unwrap().push(order_id.to_string());
        Ok(())
    }

    async fn update_balance_allowance(&self) -> Result<(), ClobError> {
        Ok(())
    }
}

struct MockChain {
    usdc: Mutex<Decimal>,
    balances: Mutex<HashMap<String, Decimal>>,
    merges: Mutex<Vec<(String, Decimal)>>,
    redeems: Mutex<Vec<String>>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            usdc: Mutex::new(dec!(100)),
            balances: Mutex::new(HashMap::new()),
            merges: Mutex::new(Vec::new()),
            redeems: Mutex::new(Vec::new()),
        }
    }
}

impl MockChain {
    fn set_balance(&self, token_id: &str, units: Decimal) {
        self.balances.lock().unwrap().insert(token_id.to_string(), units);
    }

    fn merges(&self) -> Vec<(String, Decimal)> {
        self.merges.lock().unwrap().clone()
    }

    fn redeems(&self) -> Vec<String> {
        self.redeems.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainApi for MockChain {
    fn wallet_address(&self) -> String {
        "0x00000000000000000000000000000000deadbeef".to_string()
    }

    async fn usdc_balance(&self) -> Result<Decimal, ChainError> {
        Ok(*self.usdc.lock().unwrap())
    }

    async fn outcome_balance(&self, token_id: &str) -> Result<Decimal, ChainError> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(token_id)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn merge_positions(
        &self,
        condition_id: &str,
        units: Decimal,
    ) -> Result<String, ChainError> {
        self.merges
            .lock()
            .unwrap()
            .push((condition_id.to_string(), units));
        // Burning the pair reduces both balances.
        let mut balances = self.balances.lock().unwrap();
        for value in balances.values_mut() {
            *value = (*value - units).max(Decimal::ZERO);
        }
        Ok(format!("0xmerge{units}"))
    }

    async fn redeem_positions(&self, condition_id: &str) -> Result<String, ChainError> {
        self.redeems.lock().unwrap().push(condition_id.to_string());
        Ok("0xredeem".to_string())
    }
}

#[derive(Default)]
struct MockPositions {
    positions: Mutex<Vec<UserPosition>>,
}

#[async_trait]
impl PositionsApi for MockPositions {
    async fn positions(&self, _wallet: &str) -> Result<Vec<UserPosition>, DataApiError> {
        Ok(self.positions.lock().unwrap().clone())
    }
}

// ----------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------

struct Harness {
    source: Arc<MockSource>,
    exchange: Arc<MockExchange>,
    chain: Arc<MockChain>,
    positions: Arc<MockPositions>,
    files: StateFiles,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self {
            source: Arc::new(MockSource::default()),
            exchange: Arc::new(MockExchange::default()),
            chain: Arc::new(MockChain::default()),
            positions: Arc::new(MockPositions::default()),
            files: StateFiles::in_dir(dir.path()),
            _dir: dir,
        }
    }

    fn supervisor(&self, cfg: Config) -> Supervisor {
        Supervisor::with_adapters(
            cfg,
            self.source.clone(),
            self.exchange.clone(),
            self.chain.clone(),
            self.positions.clone(),
            self.files.clone(),
        )
    }
}

fn test_config(mode: OrderMode) -> Config {
    let mut strategies = HashMap::new();
    strategies.insert(
        "quick_exit_7_5min".to_string(),
        StrategyConfig {
            exit_timeout_seconds: 450,
            cancel_unfilled: true,
            market_sell_filled: true,
            enabled: true,
        },
    );
    Config {
        private_key: "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".into(),
        chain_id: 137,
        signature_type: "EOA".into(),
        funder_address: None,
        order_size_usd: dec!(10),
        spread_offset: dec!(0.01),
        check_interval_seconds: 60,
        order_placement_min_minutes: 10,
        order_placement_max_minutes: 20,
        redeem_check_interval_seconds: 60,
        min_sell_price: dec!(0.10),
        market_sell_discount: dec!(0.02),
        strategy_name: "quick_exit_7_5min".into(),
        order_mode: mode,
        gamma_api_base_url: String::new(),
        clob_api_url: String::new(),
        data_api_base_url: String::new(),
        rpc_url: String::new(),
        dashboard_host: "127.0.0.1".into(),
        dashboard_port: 0,
        log_level: "INFO".into(),
        log_file: "bot.log".into(),
        strategies,
    }
}

fn market(cid: &str, start_offset_secs: i64) -> Market {
    let start = Utc::now().timestamp() + start_offset_secs;
    Market {
        condition_id: cid.to_string(),
        market_slug: format!("btc-updown-15m-{start}"),
        question: "Bitcoin Up or Down?".to_string(),
        start_ts: start,
        end_ts: start + 900,
        outcomes: vec![
            Outcome::new(format!("{cid}-up"), "Up"),
            Outcome::new(format!("{cid}-down"), "Down"),
        ],
        is_active: true,
        is_resolved: false,
    }
}

fn seed_order(
    market: &Market,
    order_id: &str,
    outcome_idx: usize,
    status: OrderStatus,
) -> OrderRecord {
    let outcome = &market.outcomes[outcome_idx];
    OrderRecord {
        order_id: order_id.to_string(),
        market_slug: market.market_slug.clone(),
        condition_id: market.condition_id.clone(),
        token_id: outcome.token_id.clone(),
        outcome: outcome.outcome.clone(),
        side: OrderSide::Buy,
        price: dec!(0.49),
        size: dec!(20.41),
        size_usd: dec!(10.0009),
        status,
        size_matched: None,
        created_at: Utc::now(),
        filled_at: None,
        error_message: None,
        strategy: Some("quick_exit_7_5min".to_string()),
        transaction_type: TransactionType::Buy,
        revenue_usd: Some(dec!(0)),
        cost_usd: Some(dec!(10.0009)),
        pnl_usd: Some(dec!(-10.0009)),
    }
}

fn seed_state(harness: &Harness, market: &Market, orders: Vec<OrderRecord>) {
    let mut markets = HashMap::new();
    markets.insert(market.condition_id.clone(), market.clone());
    harness.files.save_markets(&markets).unwrap();

    let mut groups = HashMap::new();
    groups.insert(market.condition_id.clone(), orders);
    harness.files.save_orders(&groups).unwrap();
}

// ----------------------------------------------------------------------
// Discovery + placement gate
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn discovery_filter_keeps_only_window_markets() {
    let harness = Harness::new();
    *harness.source.markets.lock().unwrap() = vec![
        market("0xsoon", 30 * 60),      // starts in 30 minutes: kept
        market("0xpast", -12 * 3600),   // ended ~12h ago: dropped
        market("0xfar", 25 * 3600),     // starts in 25h: dropped
    ];

    let mut supervisor = harness.supervisor(test_config(OrderMode::Test));
    supervisor.start().await;
    supervisor.run_once().await;

    let snapshot = supervisor.shared_state().lock().unwrap().clone();
    let cids: Vec<&str> = snapshot
        .active_markets
        .iter()
        .map(|m| m.condition_id.as_str())
        .collect();
    assert_eq!(cids, vec!["0xsoon"]);

    // Only the kept market was registered in the markets file.
    let persisted = harness.files.load_markets().unwrap();
    assert!(persisted.contains_key("0xsoon"));
    assert!(!persisted.contains_key("0xpast"));
    assert!(!persisted.contains_key("0xfar"));
}

#[tokio::test(start_paused = true)]
async fn placement_gate_blocks_outside_window() {
    let harness = Harness::new();
    // 9.5 minutes and 21 minutes out: both outside the 10-20 minute window.
    *harness.source.markets.lock().unwrap() = vec![market("0xlate", 570), market("0xearly", 1260)];

    let mut supervisor = harness.supervisor(test_config(OrderMode::Test));
    supervisor.start().await;
    supervisor.run_once().await;

    assert!(harness.exchange.placements().is_empty());
}

// ----------------------------------------------------------------------
// Liquidity placement + verification (spec scenario: pricing + FAILED)
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn liquidity_placement_prices_and_verification() {
    let harness = Harness::new();
    let m = market("0xliq", 720); // 12 minutes out
    harness.exchange.set_book(&format!("0xliq-up"), dec!(0.50), dec!(0.52));
    harness.exchange.hide_sells_from_book.store(true, Ordering::SeqCst);
    *harness.source.markets.lock().unwrap() = vec![m.clone()];

    let mut supervisor = harness.supervisor(test_config(OrderMode::Liquidity));
    supervisor.start().await;
    supervisor.run_once().await;

    // BUY at bid - spread, SELL at ask + spread, sized to $10 each.
    let placements = harness.exchange.placements();
    assert_eq!(placements.len(), 2);
    assert_eq!(placements[0].side, OrderSide::Buy);
    assert_eq!(placements[0].price, dec!(0.49));
    assert_eq!(placements[0].size, dec!(20.41));
    assert_eq!(placements[1].side, OrderSide::Sell);
    assert_eq!(placements[1].price, dec!(0.53));
    assert_eq!(placements[1].size, dec!(18.87));

    // The SELL never showed up in the book: verification fails it and zeroes
    // its size and accounting.
    let groups = harness.files.load_orders().unwrap();
    let orders = &groups[&m.condition_id];
    assert_eq!(orders.len(), 2);
    let buy = orders.iter().find(|o| o.side == OrderSide::Buy).unwrap();
    let sell = orders.iter().find(|o| o.side == OrderSide::Sell).unwrap();
    assert_eq!(buy.status, OrderStatus::Placed);
    assert!(buy.error_message.is_none());
    assert_eq!(sell.status, OrderStatus::Failed);
    assert_eq!(sell.size, Decimal::ZERO);
    assert_eq!(sell.size_usd, Decimal::ZERO);
    assert_eq!(sell.cost_usd, Some(Decimal::ZERO));
    assert_eq!(sell.revenue_usd, Some(Decimal::ZERO));
    assert_eq!(sell.pnl_usd, Some(Decimal::ZERO));
    assert!(sell.error_message.is_some());

    // The dashboard's pending view only carries the live order.
    let snapshot = supervisor.shared_state().lock().unwrap().clone();
    assert_eq!(snapshot.pending_orders.len(), 1);
    assert_eq!(snapshot.pending_orders[0].side, OrderSide::Buy);
}

// ----------------------------------------------------------------------
// Split strategy (spec scenario: hedge + imbalance legs)
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn split_strategy_places_hedge_then_imbalance() {
    let harness = Harness::new();
    let m = market("0xsplit", 720);
    harness.exchange.set_book(&format!("0xsplit-up"), dec!(0.52), dec!(0.54));
    harness.exchange.set_book(&format!("0xsplit-down"), dec!(0.46), dec!(0.48));
    *harness.source.markets.lock().unwrap() = vec![m.clone()];

    let mut supervisor = harness.supervisor(test_config(OrderMode::Split));
    supervisor.start().await;
    supervisor.run_once().await;

    let placements = harness.exchange.placements();
    assert_eq!(placements.len(), 4);

    // Split leg: buy both outcomes at the ask with half the notional.
    assert_eq!(placements[0].side, OrderSide::Buy);
    assert_eq!(placements[0].price, dec!(0.54));
    assert_eq!(placements[0].size, dec!(9.26));
    assert_eq!(placements[1].side, OrderSide::Buy);
    assert_eq!(placements[1].price, dec!(0.48));
    assert_eq!(placements[1].size, dec!(10.42));

    // Imbalance leg: mid_up 0.53 vs mid_down 0.47 -> sell UP, buy DOWN.
    assert_eq!(placements[2].side, OrderSide::Sell);
    assert_eq!(placements[2].token_id, "0xsplit-up");
    assert_eq!(placements[2].price, dec!(0.51));
    assert_eq!(placements[2].size, dec!(7.84));
    assert_eq!(placements[3].side, OrderSide::Buy);
    assert_eq!(placements[3].token_id, "0xsplit-down");
    assert_eq!(placements[3].price, dec!(0.49));
    assert_eq!(placements[3].size, dec!(8.16));
}

// ----------------------------------------------------------------------
// Merge bookkeeping (spec scenario: 6.2 / 6.5 wallet balances)
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn merge_during_market_lifetime() {
    let harness = Harness::new();
    let m = market("0xmerge", -120); // started 2 minutes ago, ends in 13
    seed_state(
        &harness,
        &m,
        vec![seed_order(&m, "filled-1", 0, OrderStatus::Filled)],
    );
    harness.chain.set_balance("0xmerge-up", dec!(6.2));
    harness.chain.set_balance("0xmerge-down", dec!(6.5));

    let mut supervisor = harness.supervisor(test_config(OrderMode::Test));
    supervisor.start().await;
    supervisor.run_once().await;

    // One merge of min(6.2, 6.5).
    assert_eq!(harness.chain.merges(), vec![("0xmerge".to_string(), dec!(6.2))]);

    // A synthetic MERGE record landed in the history with pnl = merged units.
    let history = harness.files.load_history().unwrap();
    let merge = history
        .iter()
        .find(|o| o.transaction_type == TransactionType::Merge)
        .expect("MERGE record");
    assert_eq!(merge.size, dec!(6.2));
    assert_eq!(merge.pnl_usd, Some(dec!(6.2)));
    assert_eq!(merge.revenue_usd, Some(dec!(6.2)));
    assert_eq!(merge.cost_usd, Some(Decimal::ZERO));
    assert_eq!(merge.status, OrderStatus::Filled);

    // The 30-second merge cadence blocks an immediate second attempt.
    supervisor.run_once().await;
    assert_eq!(harness.chain.merges().len(), 1);
}

// ----------------------------------------------------------------------
// Post-expiry cleanup (spec scenario: cancel at end + 301s)
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn post_expiry_cleanup_cancels_open_orders() {
    let harness = Harness::new();
    let m = market("0xdone", -1201); // ended 301 seconds ago
    seed_state(
        &harness,
        &m,
        vec![seed_order(&m, "stale-1", 0, OrderStatus::Placed)],
    );
    harness.exchange.set_status("stale-1", "LIVE", dec!(0), dec!(20.41));

    let mut supervisor = harness.supervisor(test_config(OrderMode::Test));
    supervisor.start().await;
    supervisor.run_once().await;

    assert_eq!(harness.exchange.cancelled(), vec!["stale-1".to_string()]);

    let groups = harness.files.load_orders().unwrap();
    assert_eq!(groups[&m.condition_id][0].status, OrderStatus::Cancelled);

    let snapshot = supervisor.shared_state().lock().unwrap().clone();
    assert!(snapshot.pending_orders.is_empty());
}

// ----------------------------------------------------------------------
// Reconciliation transitions
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn reconciliation_updates_fills() {
    let harness = Harness::new();
    let m = market("0xfill", -120);
    seed_state(
        &harness,
        &m,
        vec![
            seed_order(&m, "full", 0, OrderStatus::Placed),
            seed_order(&m, "part", 1, OrderStatus::Placed),
        ],
    );
    harness.exchange.set_status("full", "MATCHED", dec!(20.41), dec!(20.41));
    harness.exchange.set_status("part", "LIVE", dec!(5), dec!(20.41));

    let mut supervisor = harness.supervisor(test_config(OrderMode::Test));
    supervisor.start().await;
    supervisor.run_once().await;

    let groups = harness.files.load_orders().unwrap();
    let orders = &groups[&m.condition_id];
    let full = orders.iter().find(|o| o.order_id == "full").unwrap();
    let part = orders.iter().find(|o| o.order_id == "part").unwrap();
    assert_eq!(full.status, OrderStatus::Filled);
    assert!(full.filled_at.is_some());
    assert_eq!(full.size_matched, Some(dec!(20.41)));
    assert_eq!(part.status, OrderStatus::PartiallyFilled);
    assert_eq!(part.size_matched, Some(dec!(5)));

    // Terminal orders never regress: a second tick with the exchange now
    // reporting CANCELLED must not reopen the filled order.
    harness.exchange.set_status("full", "CANCELLED", dec!(0), dec!(20.41));
    supervisor.run_once().await;
    let groups = harness.files.load_orders().unwrap();
    let full = groups[&m.condition_id]
        .iter()
        .find(|o| o.order_id == "full")
        .unwrap();
    assert_eq!(full.status, OrderStatus::Filled);
}

// ----------------------------------------------------------------------
// Redemption sweep
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn redemption_sweep_redeems_and_records() {
    let harness = Harness::new();
    *harness.positions.positions.lock().unwrap() = vec![
        UserPosition {
            condition_id: "0xwin".into(),
            title: "Bitcoin Up or Down?".into(),
            outcome: "Up".into(),
            size: 3.2,
            cur_price: 1.0,
            current_value: 3.2,
            redeemable: true,
            ..Default::default()
        },
        UserPosition {
            condition_id: "0xwin".into(),
            title: "Bitcoin Up or Down?".into(),
            outcome: "Down".into(),
            size: 3.0,
            cur_price: 1.0,
            current_value: 3.0,
            redeemable: true,
            ..Default::default()
        },
        UserPosition {
            condition_id: "0xopen".into(),
            redeemable: false,
            current_value: 9.0,
            ..Default::default()
        },
    ];

    let mut supervisor = harness.supervisor(test_config(OrderMode::Test));
    supervisor.start().await;
    supervisor.run_once().await;

    // One redeem per redeemable condition id.
    assert_eq!(harness.chain.redeems(), vec!["0xwin".to_string()]);

    let history = harness.files.load_history().unwrap();
    let redeem = history
        .iter()
        .find(|o| o.transaction_type == TransactionType::Redeem)
        .expect("REDEEM record");
    assert_eq!(redeem.size, dec!(6.2));
    assert_eq!(redeem.pnl_usd, Some(dec!(6.2)));
    assert_eq!(redeem.market_slug, "Bitcoin Up or Down?");

    // The sweep is rate-limited: the next tick inside the interval skips it.
    supervisor.run_once().await;
    assert_eq!(harness.chain.redeems().len(), 1);
}

// ----------------------------------------------------------------------
// Strategy-driven exit
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn strategy_exit_cancels_after_timeout() {
    let harness = Harness::new();
    let m = market("0xexit", -460); // started 460s ago; timeout is 450s
    seed_state(
        &harness,
        &m,
        vec![seed_order(&m, "resting", 0, OrderStatus::Placed)],
    );
    harness.exchange.set_status("resting", "LIVE", dec!(0), dec!(20.41));

    let mut supervisor = harness.supervisor(test_config(OrderMode::Test));
    supervisor.start().await;
    supervisor.run_once().await;

    assert_eq!(harness.exchange.cancelled(), vec!["resting".to_string()]);
    let groups = harness.files.load_orders().unwrap();
    assert_eq!(groups[&m.condition_id][0].status, OrderStatus::Cancelled);

    // The exit runs at most once per market.
    supervisor.run_once().await;
    assert_eq!(harness.exchange.cancelled().len(), 1);
}

// ----------------------------------------------------------------------
// Orphan recovery
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn startup_recovers_unknown_open_orders() {
    let harness = Harness::new();
    harness.exchange.open.lock().unwrap().push(OpenOrderInfo {
        id: "lost-1".into(),
        condition_id: "0xlost".into(),
        token_id: "0xlost-up".into(),
        side: OrderSide::Buy,
        price: dec!(0.44),
        size: dec!(12),
    });
    harness.exchange.set_status("lost-1", "LIVE", dec!(0), dec!(12));

    let mut supervisor = harness.supervisor(test_config(OrderMode::Test));
    supervisor.start().await;

    let groups = harness.files.load_orders().unwrap();
    let recovered = &groups["0xlost"][0];
    assert_eq!(recovered.order_id, "lost-1");
    assert_eq!(recovered.status, OrderStatus::Placed);
    assert_eq!(recovered.price, dec!(0.44));
    assert!(recovered.market_slug.starts_with("recovered-"));
    assert_eq!(recovered.outcome, "Unknown");

    let history = harness.files.load_history().unwrap();
    assert!(history.iter().any(|o| o.order_id == "lost-1"));
}

// ----------------------------------------------------------------------
// Persistence round-trip + placement idempotence across restart
// ----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn restart_preserves_groups_and_never_places_twice() {
    let harness = Harness::new();
    let m = market("0xonce", 720);
    harness.exchange.set_book(&format!("0xonce-up"), dec!(0.50), dec!(0.52));
    harness.exchange.set_book(&format!("0xonce-down"), dec!(0.46), dec!(0.48));
    *harness.source.markets.lock().unwrap() = vec![m.clone()];

    let mut supervisor = harness.supervisor(test_config(OrderMode::Test));
    supervisor.start().await;
    supervisor.run_once().await;
    let placed_before = harness.exchange.placements().len();
    assert!(placed_before > 0);

    let saved_groups = harness.files.load_orders().unwrap();

    // A fresh supervisor over the same files loads the group, marks the
    // market as placed, and does not submit again.
    let mut restarted = harness.supervisor(test_config(OrderMode::Test));
    restarted.start().await;
    restarted.run_once().await;

    assert_eq!(harness.exchange.placements().len(), placed_before);
    let reloaded = harness.files.load_orders().unwrap();
    for (cid, orders) in &saved_groups {
        let after = &reloaded[cid];
        for order in orders {
            let found = after.iter().find(|o| o.order_id == order.order_id).unwrap();
            assert_eq!(found.price, order.price);
            assert_eq!(found.size, order.size);
            assert_eq!(found.created_at, order.created_at);
        }
    }
}
