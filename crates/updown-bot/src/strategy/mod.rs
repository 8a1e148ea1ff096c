//! Order-authoring strategies.
//!
//! Each strategy plans a batch of order intents from the current books
//! (pure), submits them with pacing, and then verifies the batch against the
//! exchange's open-order listing. Verification settles the
//! signed-but-not-visible window: ids missing from the book become `FAILED`
//! with zeroed size and accounting so no phantom P&L survives.

pub mod liquidity;
pub mod simple;
pub mod split;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use tracing::{debug, info, warn};

use updown_common::{Market, OrderRecord, OrderSide, OrderStatus, TickSize, TransactionType};

use crate::adapters::{ChainApi, ExchangeApi, OrderPlacement, OrderRequest};
use crate::config::{Config, OrderMode};

/// Pause between consecutive submissions, honoring the upstream throttle.
pub const SUBMIT_PACING: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("insufficient balance: ${have} < ${need}")]
    InsufficientBalance { have: Decimal, need: Decimal },

    #[error("could not find both Up and Down outcomes")]
    MissingOutcomes,

    #[error("insufficient orderbook data")]
    NoBookData,

    #[error("wallet address not available")]
    NoWallet,
}

/// One planned order before submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub token_id: String,
    pub outcome: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
}

/// Refresh the cached best bid/ask/mid of every outcome from the live books.
/// Best-effort: outcomes whose book cannot be fetched keep their old cache.
pub async fn refresh_market_prices(exchange: &Arc<dyn ExchangeApi>, market: &mut Market) {
    for outcome in &mut market.outcomes {
        if outcome.token_id.is_empty() {
            continue;
        }
        let top = match exchange.book_top(&outcome.token_id).await {
            Ok(top) => top,
            Err(e) => {
                debug!(token_id = %outcome.token_id, error = %e, "Book fetch skipped");
                continue;
            }
        };
        if let Some(bid) = top.best_bid.filter(|b| *b > Decimal::ZERO) {
            outcome.best_bid = Some(bid);
        }
        if let Some(ask) = top.best_ask.filter(|a| *a > Decimal::ZERO) {
            outcome.best_ask = Some(ask);
        }
        if let (Some(bid), Some(ask)) = (outcome.best_bid, outcome.best_ask) {
            outcome.price = Some((bid + ask) / dec!(2));
        }
    }
}

/// Tick size for a token, defaulting to 0.01 when the lookup fails.
pub async fn tick_or_default(exchange: &Arc<dyn ExchangeApi>, token_id: &str) -> TickSize {
    match exchange.tick_size(token_id).await {
        Ok(tick) => tick,
        Err(e) => {
            debug!(token_id, error = %e, "Tick lookup failed, assuming 0.01");
            TickSize::default()
        }
    }
}

/// Tick sizes for every outcome of a market.
pub async fn market_ticks(
    exchange: &Arc<dyn ExchangeApi>,
    market: &Market,
) -> HashMap<String, TickSize> {
    let mut ticks = HashMap::new();
    for outcome in &market.outcomes {
        if outcome.token_id.is_empty() {
            continue;
        }
        let tick = tick_or_default(exchange, &outcome.token_id).await;
        ticks.insert(outcome.token_id.clone(), tick);
    }
    ticks
}

/// Build an order record with side-dependent accounting.
pub fn order_record(
    market: &Market,
    token_id: &str,
    outcome: &str,
    side: OrderSide,
    order_id: &str,
    price: Decimal,
    size: Decimal,
    strategy: &str,
    now: DateTime<Utc>,
) -> OrderRecord {
    let size_usd = price * size;
    let (transaction_type, cost, revenue, pnl) = match side {
        OrderSide::Buy => (TransactionType::Buy, size_usd, Decimal::ZERO, -size_usd),
        OrderSide::Sell => (TransactionType::Sell, Decimal::ZERO, size_usd, size_usd),
    };
    OrderRecord {
        order_id: order_id.to_string(),
        market_slug: market.market_slug.clone(),
        condition_id: market.condition_id.clone(),
        token_id: token_id.to_string(),
        outcome: outcome.to_string(),
        side,
        price,
        size,
        size_usd,
        status: OrderStatus::Placed,
        size_matched: None,
        created_at: now,
        filled_at: None,
        error_message: None,
        strategy: Some(strategy.to_string()),
        transaction_type,
        revenue_usd: Some(revenue),
        cost_usd: Some(cost),
        pnl_usd: Some(pnl),
    }
}

/// Record for an order that failed before transmission.
pub fn failed_order_record(
    market: &Market,
    intent: &OrderIntent,
    strategy: &str,
    now: DateTime<Utc>,
    message: String,
) -> OrderRecord {
    let mut record = order_record(
        market,
        &intent.token_id,
        &intent.outcome,
        intent.side,
        "FAILED",
        intent.price,
        Decimal::ZERO,
        strategy,
        now,
    );
    // Keep the intended notional on the record for diagnostics.
    record.size_usd = intent.price * intent.size;
    record.status = OrderStatus::Failed;
    record.error_message = Some(message);
    record
}

/// Submit a batch of intents with pacing, producing one record per intent.
pub async fn submit_intents(
    exchange: &Arc<dyn ExchangeApi>,
    market: &Market,
    intents: &[OrderIntent],
    strategy: &str,
) -> Vec<OrderRecord> {
    let mut records = Vec::with_capacity(intents.len());
    for (i, intent) in intents.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(SUBMIT_PACING).await;
        }
        let request = OrderRequest {
            token_id: intent.token_id.clone(),
            side: intent.side,
            price: intent.price,
            size: intent.size,
        };
        let now = Utc::now();
        match exchange.place_order(&request).await {
            Ok(OrderPlacement::Accepted { order_id }) => {
                info!(
                    market = %market.market_slug,
                    outcome = %intent.outcome,
                    side = %intent.side,
                    price = %intent.price,
                    size = %intent.size,
                    order_id,
                    "Order placed"
                );
                records.push(order_record(
                    market,
                    &intent.token_id,
                    &intent.outcome,
                    intent.side,
                    &order_id,
                    intent.price,
                    intent.size,
                    strategy,
                    now,
                ));
            }
            Ok(OrderPlacement::Unconfirmed { order_id, error }) => {
                warn!(
                    market = %market.market_slug,
                    outcome = %intent.outcome,
                    order_id,
                    error,
                    "Order submitted but response failed; will verify"
                );
                let mut record = order_record(
                    market,
                    &intent.token_id,
                    &intent.outcome,
                    intent.side,
                    &order_id,
                    intent.price,
                    intent.size,
                    strategy,
                    now,
                );
                record.error_message = Some(error);
                records.push(record);
            }
            Err(e) => {
                warn!(
                    market = %market.market_slug,
                    outcome = %intent.outcome,
                    error = %e,
                    "Order placement failed"
                );
                records.push(failed_order_record(market, intent, strategy, now, e.to_string()));
            }
        }
    }
    records
}

/// Post-submission verification against the exchange's open-order listing.
///
/// Ids present in the listing stay `PLACED` (errors cleared); ids absent
/// become `FAILED` with size and accounting zeroed. A listing failure leaves
/// the batch untouched.
pub async fn verify_orders_in_book(
    exchange: &Arc<dyn ExchangeApi>,
    market: &Market,
    orders: Vec<OrderRecord>,
) -> Vec<OrderRecord> {
    let open = match exchange.open_orders(Some(&market.condition_id)).await {
        Ok(open) => open,
        Err(e) => {
            warn!(market = %market.market_slug, error = %e, "Open-order verification skipped");
            return orders;
        }
    };
    let active: std::collections::HashSet<&str> = open.iter().map(|o| o.id.as_str()).collect();

    orders
        .into_iter()
        .map(|mut order| {
            if active.contains(order.order_id.as_str()) {
                order.status = OrderStatus::Placed;
                order.error_message = None;
            } else {
                order.status = OrderStatus::Failed;
                order.size = Decimal::ZERO;
                order.size_usd = Decimal::ZERO;
                order.cost_usd = Some(Decimal::ZERO);
                order.revenue_usd = Some(Decimal::ZERO);
                order.pnl_usd = Some(Decimal::ZERO);
                if order.error_message.is_none() {
                    order.error_message =
                        Some("Order not found in orderbook after placement".to_string());
                }
            }
            order
        })
        .collect()
}

/// Author opening orders for a market using the configured mode.
///
/// `Err` aborts the whole batch (nothing was submitted); an `Ok` batch may
/// still contain `FAILED` records for individual orders.
pub async fn place_orders_for_market(
    exchange: &Arc<dyn ExchangeApi>,
    chain: &Arc<dyn ChainApi>,
    cfg: &Config,
    market: &Market,
    now: DateTime<Utc>,
) -> Result<Vec<OrderRecord>, StrategyError> {
    if exchange.wallet_address().is_none() {
        return Err(StrategyError::NoWallet);
    }
    if !exchange.can_trade() {
        // Read-only mode (no L2 creds): discovery and tracking continue,
        // submission is skipped.
        warn!(market = %market.market_slug, "No API credentials; skipping order submission");
        return Ok(Vec::new());
    }

    match cfg.order_mode {
        OrderMode::Liquidity => liquidity::place(exchange, chain, cfg, market).await,
        OrderMode::Split => {
            split::place(exchange, cfg, market, &split::SplitParams::default(), now).await
        }
        OrderMode::Test => {
            simple::place(exchange, chain, cfg, market, dec!(0.49), dec!(10)).await
        }
    }
}

/// Go-style balance gate: only a known-positive yet insufficient balance
/// blocks a batch; an unreadable balance does not.
pub(crate) async fn check_balance(
    chain: &Arc<dyn ChainApi>,
    required: Decimal,
) -> Result<(), StrategyError> {
    let balance = chain.usdc_balance().await.unwrap_or(Decimal::ZERO);
    if balance > Decimal::ZERO && balance < required {
        return Err(StrategyError::InsufficientBalance {
            have: balance,
            need: required,
        });
    }
    Ok(())
}
