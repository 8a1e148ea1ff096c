//! Simple test strategy: buy both outcomes at a fixed price and size.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;

use updown_common::{find_up_down_outcomes, Market, OrderRecord, OrderSide};

use crate::adapters::{ChainApi, ExchangeApi};
use crate::config::Config;

use super::{check_balance, submit_intents, verify_orders_in_book, OrderIntent, StrategyError};

/// Plan fixed-price BUY orders for both outcomes.
pub fn plan(market: &Market, price: Decimal, size: Decimal) -> Result<Vec<OrderIntent>, StrategyError> {
    let (up, down) = find_up_down_outcomes(&market.outcomes);
    let (up, down) = match (up, down) {
        (Some(up), Some(down)) => (up, down),
        _ => return Err(StrategyError::MissingOutcomes),
    };
    Ok([up, down]
        .into_iter()
        .map(|outcome| OrderIntent {
            token_id: outcome.token_id.clone(),
            outcome: outcome.outcome.clone(),
            side: OrderSide::Buy,
            price,
            size,
        })
        .collect())
}

/// Submit fixed-price test orders for both outcomes.
pub async fn place(
    exchange: &Arc<dyn ExchangeApi>,
    chain: &Arc<dyn ChainApi>,
    cfg: &Config,
    market: &Market,
    price: Decimal,
    size: Decimal,
) -> Result<Vec<OrderRecord>, StrategyError> {
    check_balance(chain, price * size * dec!(2)).await?;

    let intents = plan(market, price, size)?;
    info!(market = %market.market_slug, price = %price, size = %size, "Placing test orders");

    let records = submit_intents(exchange, market, &intents, &cfg.strategy_name).await;
    Ok(verify_orders_in_book(exchange, market, records).await)
}
