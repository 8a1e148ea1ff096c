//! Split / arbitrage strategy.
//!
//! Phase one buys both outcomes at their best ask with half the notional
//! each, forming a hedged pair priced near $1. Phase two measures the
//! mid-price imbalance between the outcomes and, when it is wide enough,
//! sells the rich side and buys the cheap side with a fraction of the
//! notional.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;

use updown_common::{
    find_up_down_outcomes, shares_for_usd, snap_to_tick, Market, OrderRecord, OrderSide, TickSize,
};

use crate::adapters::ExchangeApi;
use crate::config::Config;

use super::{
    market_ticks, refresh_market_prices, submit_intents, verify_orders_in_book, OrderIntent,
    StrategyError,
};

/// Pause between the split and imbalance phases, letting the split fill.
const SETTLE_PAUSE: Duration = Duration::from_secs(2);

/// Minimum share size worth submitting.
const MIN_SHARES: Decimal = dec!(0.01);

/// Tunables for the imbalance leg.
#[derive(Debug, Clone)]
pub struct SplitParams {
    /// Trade only when the mid-price gap exceeds this.
    pub imbalance_threshold: Decimal,
    /// Fraction of the order notional committed to the imbalance leg.
    pub trade_ratio: Decimal,
    /// Price offset applied inside the spread.
    pub order_offset: Decimal,
    /// Hard floor under `imbalance_threshold`.
    pub min_imbalance: Decimal,
    /// Stop authoring this close to the market start.
    pub stop_trading_minutes_before_start: i64,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            imbalance_threshold: dec!(0.03),
            trade_ratio: dec!(0.4),
            order_offset: dec!(0.01),
            min_imbalance: dec!(0.02),
            stop_trading_minutes_before_start: 5,
        }
    }
}

/// Phase one: BUY both outcomes at their best ask, half the notional each.
pub fn plan_split(
    market: &Market,
    order_size_usd: Decimal,
    ticks: &HashMap<String, TickSize>,
) -> Vec<OrderIntent> {
    let half = order_size_usd / dec!(2);
    let (up, down) = find_up_down_outcomes(&market.outcomes);

    let mut intents = Vec::new();
    for outcome in [up, down].into_iter().flatten() {
        let Some(ask) = outcome.best_ask.filter(|a| *a > Decimal::ZERO) else {
            continue;
        };
        let tick = ticks.get(&outcome.token_id).copied().unwrap_or_default();
        let price = snap_to_tick(ask, tick);
        let size = shares_for_usd(half, price);
        if size > MIN_SHARES {
            intents.push(OrderIntent {
                token_id: outcome.token_id.clone(),
                outcome: outcome.outcome.clone(),
                side: OrderSide::Buy,
                price,
                size,
            });
        }
    }
    intents
}

/// Phase two: trade the mid-price imbalance between the outcomes.
///
/// Returns an empty plan when the gap is inside the thresholds; errors when
/// the books are not two-sided on both outcomes.
pub fn plan_imbalance(
    market: &Market,
    params: &SplitParams,
    order_size_usd: Decimal,
    ticks: &HashMap<String, TickSize>,
) -> Result<Vec<OrderIntent>, StrategyError> {
    let (up, down) = match find_up_down_outcomes(&market.outcomes) {
        (Some(up), Some(down)) => (up, down),
        _ => return Err(StrategyError::MissingOutcomes),
    };
    let (up_bid, up_ask, down_bid, down_ask) =
        match (up.best_bid, up.best_ask, down.best_bid, down.best_ask) {
            (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
            _ => return Err(StrategyError::NoBookData),
        };

    let mid_up = (up_bid + up_ask) / dec!(2);
    let mid_down = (down_bid + down_ask) / dec!(2);
    let imbalance = (mid_up - mid_down).abs();
    if imbalance < params.min_imbalance.max(params.imbalance_threshold) {
        return Ok(Vec::new());
    }

    // Rich side is sold inside its bid, cheap side bought above its ask.
    let (rich, rich_bid, cheap, cheap_ask) = if mid_up > mid_down {
        (up, up_bid, down, down_ask)
    } else if mid_down > mid_up {
        (down, down_bid, up, up_ask)
    } else {
        return Ok(Vec::new());
    };

    let trade_amount = order_size_usd * params.trade_ratio;
    let mut intents = Vec::new();

    let rich_tick = ticks.get(&rich.token_id).copied().unwrap_or_default();
    let sell_price = snap_to_tick(rich_bid - params.order_offset, rich_tick);
    let sell_size = shares_for_usd(trade_amount, sell_price);
    if sell_size > MIN_SHARES {
        intents.push(OrderIntent {
            token_id: rich.token_id.clone(),
            outcome: rich.outcome.clone(),
            side: OrderSide::Sell,
            price: sell_price,
            size: sell_size,
        });
    }

    let cheap_tick = ticks.get(&cheap.token_id).copied().unwrap_or_default();
    let buy_price = snap_to_tick(cheap_ask + params.order_offset, cheap_tick);
    let buy_size = shares_for_usd(trade_amount, buy_price);
    if buy_size > MIN_SHARES {
        intents.push(OrderIntent {
            token_id: cheap.token_id.clone(),
            outcome: cheap.outcome.clone(),
            side: OrderSide::Buy,
            price: buy_price,
            size: buy_size,
        });
    }

    Ok(intents)
}

/// Run both phases for a market.
pub async fn place(
    exchange: &Arc<dyn ExchangeApi>,
    cfg: &Config,
    market: &Market,
    params: &SplitParams,
    now: DateTime<Utc>,
) -> Result<Vec<OrderRecord>, StrategyError> {
    let until_start = market.seconds_until_start(now);
    if until_start < params.stop_trading_minutes_before_start * 60 {
        info!(
            market = %market.market_slug,
            until_start,
            "Too close to market start, skipping split strategy"
        );
        return Ok(Vec::new());
    }

    let mut market = market.clone();
    refresh_market_prices(exchange, &mut market).await;
    let ticks = market_ticks(exchange, &market).await;

    // Phase one: the hedged pair.
    let split_intents = plan_split(&market, cfg.order_size_usd, &ticks);
    let mut records = if split_intents.is_empty() {
        Vec::new()
    } else {
        info!(market = %market.market_slug, count = split_intents.len(), "Performing split");
        let submitted = submit_intents(exchange, &market, &split_intents, &cfg.strategy_name).await;
        verify_orders_in_book(exchange, &market, submitted).await
    };

    // Let the split orders hit the book before reading the imbalance.
    tokio::time::sleep(SETTLE_PAUSE).await;
    refresh_market_prices(exchange, &mut market).await;

    match plan_imbalance(&market, params, cfg.order_size_usd, &ticks) {
        Ok(intents) if !intents.is_empty() => {
            info!(
                market = %market.market_slug,
                count = intents.len(),
                "Placing imbalance orders"
            );
            let submitted = submit_intents(exchange, &market, &intents, &cfg.strategy_name).await;
            records.extend(verify_orders_in_book(exchange, &market, submitted).await);
        }
        Ok(_) => {}
        Err(e) => {
            // The split may already have gone through; the imbalance leg is
            // opportunistic.
            info!(market = %market.market_slug, error = %e, "Imbalance leg skipped");
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use updown_common::Outcome;

    fn priced(token: &str, name: &str, bid: Decimal, ask: Decimal) -> Outcome {
        Outcome {
            token_id: token.into(),
            outcome: name.into(),
            price: Some((bid + ask) / dec!(2)),
            best_bid: Some(bid),
            best_ask: Some(ask),
        }
    }

    fn market() -> Market {
        Market {
            condition_id: "0xc0ffee".into(),
            market_slug: "btc-updown-15m-1735689600".into(),
            question: "q".into(),
            start_ts: 1_735_689_600,
            end_ts: 1_735_690_500,
            outcomes: vec![
                priced("up", "Up", dec!(0.52), dec!(0.54)),
                priced("down", "Down", dec!(0.46), dec!(0.48)),
            ],
            is_active: true,
            is_resolved: false,
        }
    }

    fn hundredth_ticks() -> HashMap<String, TickSize> {
        HashMap::from([
            ("up".to_string(), TickSize::Hundredth),
            ("down".to_string(), TickSize::Hundredth),
        ])
    }

    #[test]
    fn test_plan_split_sizes() {
        let intents = plan_split(&market(), dec!(10), &hundredth_ticks());
        assert_eq!(intents.len(), 2);
        assert_eq!(intents[0].side, OrderSide::Buy);
        assert_eq!(intents[0].price, dec!(0.54));
        assert_eq!(intents[0].size, dec!(9.26)); // 5 / 0.54
        assert_eq!(intents[1].price, dec!(0.48));
        assert_eq!(intents[1].size, dec!(10.42)); // 5 / 0.48
    }

    #[test]
    fn test_plan_imbalance_sells_rich_buys_cheap() {
        // mid_up = 0.53, mid_down = 0.47, imbalance = 0.06 >= 0.03.
        let intents =
            plan_imbalance(&market(), &SplitParams::default(), dec!(10), &hundredth_ticks())
                .unwrap();
        assert_eq!(intents.len(), 2);

        let sell = &intents[0];
        assert_eq!(sell.side, OrderSide::Sell);
        assert_eq!(sell.token_id, "up");
        assert_eq!(sell.price, dec!(0.51)); // 0.52 - 0.01
        assert_eq!(sell.size, dec!(7.84)); // 4 / 0.51

        let buy = &intents[1];
        assert_eq!(buy.side, OrderSide::Buy);
        assert_eq!(buy.token_id, "down");
        assert_eq!(buy.price, dec!(0.49)); // 0.48 + 0.01
        assert_eq!(buy.size, dec!(8.16)); // 4 / 0.49
    }

    #[test]
    fn test_plan_imbalance_mirrors_when_down_is_rich() {
        let mut m = market();
        m.outcomes = vec![
            priced("up", "Up", dec!(0.46), dec!(0.48)),
            priced("down", "Down", dec!(0.52), dec!(0.54)),
        ];
        let intents =
            plan_imbalance(&m, &SplitParams::default(), dec!(10), &hundredth_ticks()).unwrap();
        assert_eq!(intents[0].token_id, "down");
        assert_eq!(intents[0].side, OrderSide::Sell);
        assert_eq!(intents[1].token_id, "up");
        assert_eq!(intents[1].side, OrderSide::Buy);
    }

    #[test]
    fn test_plan_imbalance_skips_small_gaps() {
        let mut m = market();
        m.outcomes = vec![
            priced("up", "Up", dec!(0.50), dec!(0.52)),
            priced("down", "Down", dec!(0.49), dec!(0.51)),
        ];
        let intents =
            plan_imbalance(&m, &SplitParams::default(), dec!(10), &hundredth_ticks()).unwrap();
        assert!(intents.is_empty());
    }

    #[test]
    fn test_plan_imbalance_requires_two_sided_books() {
        let mut m = market();
        m.outcomes[1].best_ask = None;
        assert!(matches!(
            plan_imbalance(&m, &SplitParams::default(), dec!(10), &hundredth_ticks()),
            Err(StrategyError::NoBookData)
        ));
    }

    #[test]
    fn test_plan_split_skips_missing_asks() {
        let mut m = market();
        m.outcomes[0].best_ask = None;
        let intents = plan_split(&m, dec!(10), &hundredth_ticks());
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].token_id, "down");
    }
}
