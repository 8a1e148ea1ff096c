//! Aggregates over the order-history file.
//!
//! A market counts as a successful trade when both outcomes ended up with
//! filled size; `MERGE`/`REDEEM` records contribute P&L but not fill counts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use updown_common::{is_down_name, is_up_name, OrderRecord, OrderSide, TransactionType};

fn round2(value: Decimal) -> Decimal {
    value.round_dp(2)
}

/// One market's aggregate row for `/api/market-history`.
#[derive(Debug, Clone, Serialize)]
pub struct MarketHistoryRow {
    pub market_slug: String,
    pub condition_id: String,
    pub strategy: String,
    pub status: String,
    pub result: String,
    pub total_cost: Decimal,
    pub total_revenue: Decimal,
    pub pnl: Decimal,
    pub filled_count: usize,
    pub total_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Roll the history up per market, newest first, capped at 100 rows.
pub fn market_history_rows(orders: &[OrderRecord]) -> Vec<MarketHistoryRow> {
    struct Agg {
        market_slug: String,
        strategy: String,
        created_at: DateTime<Utc>,
        total_cost: Decimal,
        total_revenue: Decimal,
        filled: usize,
        total: usize,
        open: bool,
    }

    let mut by_market: BTreeMap<&str, Agg> = BTreeMap::new();
    for order in orders {
        let agg = by_market.entry(&order.condition_id).or_insert_with(|| Agg {
            market_slug: order.market_slug.clone(),
            strategy: order.strategy.clone().unwrap_or_else(|| "None".to_string()),
            created_at: order.created_at,
            total_cost: Decimal::ZERO,
            total_revenue: Decimal::ZERO,
            filled: 0,
            total: 0,
            open: false,
        });
        agg.created_at = agg.created_at.min(order.created_at);

        if order.transaction_type == TransactionType::Buy {
            agg.total += 1;
            if order.is_filled() {
                agg.filled += 1;
            }
        }
        if order.is_live() {
            agg.open = true;
        }
        if order.is_filled() {
            match order.side {
                OrderSide::Buy => {
                    agg.total_cost += order.cost_usd.unwrap_or(order.size_usd);
                }
                OrderSide::Sell => {
                    agg.total_revenue += order.revenue_usd.unwrap_or(order.size_usd);
                }
            }
        }
    }

    let mut rows: Vec<MarketHistoryRow> = by_market
        .into_iter()
        .map(|(cid, agg)| {
            let result = if agg.open {
                "OPEN"
            } else if agg.total_revenue > Decimal::ZERO {
                if agg.total_revenue >= agg.total_cost {
                    "SUCCESS"
                } else {
                    "FAILED"
                }
            } else {
                "N/A"
            };
            // Open markets report no money movement yet.
            let (cost, revenue, pnl) = if agg.open {
                (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
            } else {
                (
                    agg.total_cost,
                    agg.total_revenue,
                    agg.total_revenue - agg.total_cost,
                )
            };
            MarketHistoryRow {
                market_slug: agg.market_slug,
                condition_id: cid.to_string(),
                strategy: agg.strategy,
                status: format!("FILLED {}/{}", agg.filled, agg.total),
                result: result.to_string(),
                total_cost: round2(cost),
                total_revenue: round2(revenue),
                pnl: round2(pnl),
                filled_count: agg.filled,
                total_count: agg.total,
                created_at: agg.created_at,
            }
        })
        .collect();

    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rows.truncate(100);
    rows
}

/// Overall trading statistics for `/api/statistics`.
#[derive(Debug, Clone, Serialize)]
pub struct OverallStats {
    pub total_markets: usize,
    pub successful_trades: usize,
    pub unsuccessful_trades: usize,
    pub total_pnl: Decimal,
}

pub fn overall_stats(orders: &[OrderRecord]) -> OverallStats {
    let mut by_market: BTreeMap<&str, Vec<&OrderRecord>> = BTreeMap::new();
    let mut total_pnl = Decimal::ZERO;
    for order in orders {
        by_market.entry(&order.condition_id).or_default().push(order);
        total_pnl += order.pnl_usd.unwrap_or(Decimal::ZERO);
    }

    let (mut successful, mut unsuccessful) = (0usize, 0usize);
    for group in by_market.values() {
        if market_is_successful(group) {
            successful += 1;
        } else {
            unsuccessful += 1;
        }
    }
    OverallStats {
        total_markets: by_market.len(),
        successful_trades: successful,
        unsuccessful_trades: unsuccessful,
        total_pnl: round2(total_pnl),
    }
}

/// Per-strategy statistics for `/api/strategy-statistics`.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyStats {
    pub strategy_name: String,
    pub total_markets: usize,
    pub successful_trades: usize,
    pub unsuccessful_trades: usize,
    pub total_pnl: Decimal,
}

pub fn strategy_stats(orders: &[OrderRecord]) -> Vec<StrategyStats> {
    let mut by_strategy: BTreeMap<String, Vec<&OrderRecord>> = BTreeMap::new();
    for order in orders {
        let name = order.strategy.clone().unwrap_or_else(|| "None".to_string());
        by_strategy.entry(name).or_default().push(order);
    }

    by_strategy
        .into_iter()
        .map(|(name, records)| {
            let mut by_market: BTreeMap<&str, Vec<&OrderRecord>> = BTreeMap::new();
            let mut pnl = Decimal::ZERO;
            for order in &records {
                by_market.entry(&order.condition_id).or_default().push(order);
                pnl += order.pnl_usd.unwrap_or(Decimal::ZERO);
            }
            let (mut successful, mut unsuccessful) = (0usize, 0usize);
            for group in by_market.values() {
                if market_is_successful(group) {
                    successful += 1;
                } else {
                    unsuccessful += 1;
                }
            }
            StrategyStats {
                strategy_name: name,
                total_markets: by_market.len(),
                successful_trades: successful,
                unsuccessful_trades: unsuccessful,
                total_pnl: round2(pnl),
            }
        })
        .collect()
}

/// Both sides filled means the hedged pair actually came together.
fn market_is_successful(orders: &[&OrderRecord]) -> bool {
    let mut up = Decimal::ZERO;
    let mut down = Decimal::ZERO;
    for order in orders {
        if !order.is_filled() {
            continue;
        }
        if is_up_name(&order.outcome) {
            up += order.size;
        }
        if is_down_name(&order.outcome) {
            down += order.size;
        }
    }
    up > Decimal::ZERO && down > Decimal::ZERO
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use updown_common::OrderStatus;

    fn order(
        cid: &str,
        outcome: &str,
        side: OrderSide,
        status: OrderStatus,
        size: Decimal,
        pnl: Decimal,
        strategy: Option<&str>,
        offset_secs: i64,
    ) -> OrderRecord {
        let size_usd = size * dec!(0.5);
        OrderRecord {
            order_id: format!("{cid}-{outcome}-{side}-{offset_secs}"),
            market_slug: format!("slug-{cid}"),
            condition_id: cid.to_string(),
            token_id: "1".into(),
            outcome: outcome.to_string(),
            side,
            price: dec!(0.5),
            size,
            size_usd,
            status,
            size_matched: None,
            created_at: Utc::now() + chrono::Duration::seconds(offset_secs),
            filled_at: None,
            error_message: None,
            strategy: strategy.map(str::to_string),
            transaction_type: match side {
                OrderSide::Buy => TransactionType::Buy,
                OrderSide::Sell => TransactionType::Sell,
            },
            revenue_usd: if side == OrderSide::Sell { Some(size_usd) } else { Some(dec!(0)) },
            cost_usd: if side == OrderSide::Buy { Some(size_usd) } else { Some(dec!(0)) },
            pnl_usd: Some(pnl),
        }
    }

    #[test]
    fn test_overall_stats_counts_hedged_fills() {
        let orders = vec![
            order("a", "Up", OrderSide::Buy, OrderStatus::Filled, dec!(10), dec!(-5), None, 0),
            order("a", "Down", OrderSide::Buy, OrderStatus::Filled, dec!(10), dec!(-5), None, 1),
            order("b", "Up", OrderSide::Buy, OrderStatus::Filled, dec!(10), dec!(-5), None, 2),
            order("b", "Down", OrderSide::Buy, OrderStatus::Cancelled, dec!(10), dec!(0), None, 3),
        ];
        let stats = overall_stats(&orders);
        assert_eq!(stats.total_markets, 2);
        assert_eq!(stats.successful_trades, 1);
        assert_eq!(stats.unsuccessful_trades, 1);
        assert_eq!(stats.total_pnl, dec!(-15));
    }

    #[test]
    fn test_market_history_rows() {
        let orders = vec![
            order("a", "Up", OrderSide::Buy, OrderStatus::Filled, dec!(10), dec!(-5), Some("s"), 0),
            order("a", "Down", OrderSide::Buy, OrderStatus::Filled, dec!(10), dec!(-5), Some("s"), 1),
            order("a", "Up", OrderSide::Sell, OrderStatus::Filled, dec!(10), dec!(6), Some("s"), 2),
        ];
        let rows = market_history_rows(&orders);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.total_count, 2);
        assert_eq!(row.filled_count, 2);
        assert_eq!(row.status, "FILLED 2/2");
        assert_eq!(row.total_cost, dec!(10)); // two filled buys of $5 each
        assert_eq!(row.total_revenue, dec!(5)); // one filled sell of $5
        assert_eq!(row.result, "FAILED"); // revenue below cost
        assert_eq!(row.pnl, dec!(-5));
    }

    #[test]
    fn test_market_history_open_market_zeroes_money() {
        let orders = vec![
            order("a", "Up", OrderSide::Buy, OrderStatus::Filled, dec!(10), dec!(-5), None, 0),
            order("a", "Down", OrderSide::Buy, OrderStatus::Placed, dec!(10), dec!(-5), None, 1),
        ];
        let rows = market_history_rows(&orders);
        assert_eq!(rows[0].result, "OPEN");
        assert_eq!(rows[0].total_cost, Decimal::ZERO);
        assert_eq!(rows[0].pnl, Decimal::ZERO);
    }

    #[test]
    fn test_market_history_sorted_newest_first() {
        let orders = vec![
            order("old", "Up", OrderSide::Buy, OrderStatus::Filled, dec!(1), dec!(0), None, -100),
            order("new", "Up", OrderSide::Buy, OrderStatus::Filled, dec!(1), dec!(0), None, 0),
        ];
        let rows = market_history_rows(&orders);
        assert_eq!(rows[0].condition_id, "new");
        assert_eq!(rows[1].condition_id, "old");
    }

    #[test]
    fn test_strategy_stats_split_by_tag() {
        let orders = vec![
            order("a", "Up", OrderSide::Buy, OrderStatus::Filled, dec!(10), dec!(1), Some("x"), 0),
            order("a", "Down", OrderSide::Buy, OrderStatus::Filled, dec!(10), dec!(1), Some("x"), 1),
            order("b", "Up", OrderSide::Buy, OrderStatus::Filled, dec!(10), dec!(2), None, 2),
        ];
        let stats = strategy_stats(&orders);
        assert_eq!(stats.len(), 2);
        // BTreeMap ordering: "None" before "x".
        assert_eq!(stats[0].strategy_name, "None");
        assert_eq!(stats[0].total_markets, 1);
        assert_eq!(stats[0].successful_trades, 0);
        assert_eq!(stats[1].strategy_name, "x");
        assert_eq!(stats[1].successful_trades, 1);
        assert_eq!(stats[1].total_pnl, dec!(2));
    }
}
