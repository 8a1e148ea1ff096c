//! Liquidity strategy: quote both sides of both outcomes.
//!
//! For each outcome with a two-sided book, place a BUY one spread below the
//! best bid and a SELL one spread above the best ask, each sized to the
//! configured USD notional. Prices are snapped to the token's own tick grid.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;

use updown_common::{shares_for_usd, snap_to_tick, Market, OrderSide, TickSize};

use crate::adapters::{ChainApi, ExchangeApi};
use crate::config::Config;

use super::{
    check_balance, market_ticks, refresh_market_prices, submit_intents, verify_orders_in_book,
    OrderIntent, StrategyError,
};

/// Plan the liquidity quotes for a market whose prices are already cached.
/// Outcomes without a two-sided book are skipped; zero-share quotes are
/// dropped.
pub fn plan(
    market: &Market,
    spread_offset: Decimal,
    order_size_usd: Decimal,
    ticks: &HashMap<String, TickSize>,
) -> Vec<OrderIntent> {
    let mut intents = Vec::new();
    for outcome in &market.outcomes {
        if outcome.token_id.trim().is_empty() {
            continue;
        }
        let (bid, ask) = match (outcome.best_bid, outcome.best_ask) {
            (Some(bid), Some(ask)) if bid > Decimal::ZERO && ask > Decimal::ZERO => (bid, ask),
            _ => continue,
        };
        let tick = ticks.get(&outcome.token_id).copied().unwrap_or_default();

        let buy_price = snap_to_tick(bid - spread_offset, tick);
        let buy_size = shares_for_usd(order_size_usd, buy_price);
        if buy_size > Decimal::ZERO {
            intents.push(OrderIntent {
                token_id: outcome.token_id.clone(),
                outcome: outcome.outcome.clone(),
                side: OrderSide::Buy,
                price: buy_price,
                size: buy_size,
            });
        }

        let sell_price = snap_to_tick(ask + spread_offset, tick);
        let sell_size = shares_for_usd(order_size_usd, sell_price);
        if sell_size > Decimal::ZERO {
            intents.push(OrderIntent {
                token_id: outcome.token_id.clone(),
                outcome: outcome.outcome.clone(),
                side: OrderSide::Sell,
                price: sell_price,
                size: sell_size,
            });
        }
    }
    intents
}

/// Submit liquidity quotes for a market and verify them against the book.
pub async fn place(
    exchange: &Arc<dyn ExchangeApi>,
    chain: &Arc<dyn ChainApi>,
    cfg: &Config,
    market: &Market,
) -> Result<Vec<updown_common::OrderRecord>, StrategyError> {
    check_balance(chain, cfg.min_balance_needed()).await?;

    let mut market = market.clone();
    refresh_market_prices(exchange, &mut market).await;
    let ticks = market_ticks(exchange, &market).await;

    let intents = plan(&market, cfg.spread_offset, cfg.order_size_usd, &ticks);
    if intents.is_empty() {
        return Ok(Vec::new());
    }
    info!(
        market = %market.market_slug,
        count = intents.len(),
        "Placing liquidity orders"
    );

    let records = submit_intents(exchange, &market, &intents, &cfg.strategy_name).await;
    Ok(verify_orders_in_book(exchange, &market, records).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use updown_common::Outcome;

    fn priced_outcome(token: &str, name: &str, bid: Decimal, ask: Decimal) -> Outcome {
        Outcome {
            token_id: token.into(),
            outcome: name.into(),
            price: Some((bid + ask) / dec!(2)),
            best_bid: Some(bid),
            best_ask: Some(ask),
        }
    }

    fn market(outcomes: Vec<Outcome>) -> Market {
        Market {
            condition_id: "0xc0ffee".into(),
            market_slug: "btc-updown-15m-1735689600".into(),
            question: "q".into(),
            start_ts: 1_735_689_600,
            end_ts: 1_735_690_500,
            outcomes,
            is_active: true,
            is_resolved: false,
        }
    }

    #[test]
    fn test_plan_prices_and_sizes() {
        let m = market(vec![priced_outcome("up", "Up", dec!(0.50), dec!(0.52))]);
        let ticks = HashMap::from([("up".to_string(), TickSize::Hundredth)]);
        let intents = plan(&m, dec!(0.01), dec!(10), &ticks);

        assert_eq!(intents.len(), 2);
        assert_eq!(intents[0].side, OrderSide::Buy);
        assert_eq!(intents[0].price, dec!(0.49));
        assert_eq!(intents[0].size, dec!(20.41));
        assert_eq!(intents[1].side, OrderSide::Sell);
        assert_eq!(intents[1].price, dec!(0.53));
        assert_eq!(intents[1].size, dec!(18.87));
    }

    #[test]
    fn test_plan_skips_one_sided_books() {
        let mut outcome = priced_outcome("up", "Up", dec!(0.50), dec!(0.52));
        outcome.best_ask = None;
        let m = market(vec![outcome]);
        assert!(plan(&m, dec!(0.01), dec!(10), &HashMap::new()).is_empty());
    }

    #[test]
    fn test_plan_uses_per_token_tick() {
        let m = market(vec![priced_outcome("up", "Up", dec!(0.501), dec!(0.521))]);
        let ticks = HashMap::from([("up".to_string(), TickSize::Thousandth)]);
        let intents = plan(&m, dec!(0.01), dec!(10), &ticks);
        assert_eq!(intents[0].price, dec!(0.491));
        assert_eq!(intents[1].price, dec!(0.531));
    }

    #[test]
    fn test_plan_clamps_to_valid_range() {
        let m = market(vec![priced_outcome("up", "Up", dec!(0.015), dec!(0.99))]);
        let ticks = HashMap::from([("up".to_string(), TickSize::Hundredth)]);
        let intents = plan(&m, dec!(0.02), dec!(10), &ticks);
        // 0.015 - 0.02 clamps to the bottom of the grid.
        assert_eq!(intents[0].price, dec!(0.01));
        // 0.99 + 0.02 clamps to the top.
        assert_eq!(intents[1].price, dec!(0.99));
    }

    #[test]
    fn test_plan_both_outcomes() {
        let m = market(vec![
            priced_outcome("up", "Up", dec!(0.50), dec!(0.52)),
            priced_outcome("down", "Down", dec!(0.46), dec!(0.48)),
        ]);
        let ticks = HashMap::from([
            ("up".to_string(), TickSize::Hundredth),
            ("down".to_string(), TickSize::Hundredth),
        ]);
        let intents = plan(&m, dec!(0.01), dec!(10), &ticks);
        assert_eq!(intents.len(), 4);
        assert_eq!(intents[2].price, dec!(0.45));
        assert_eq!(intents[3].price, dec!(0.49));
    }
}
