//! Strategy-driven exit.
//!
//! A named strategy (e.g. `quick_exit_7_5min`) carries an exit timeout
//! measured from market start. Once it elapses, unfilled orders are
//! cancelled, matched pairs are merged, and leftover balances are sold
//! immediately instead of waiting for the end-of-window liquidation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;

use updown_common::{find_up_down_outcomes, infer_up_down_token_ids, Market, OrderRecord, OrderStatus};

use super::positions::DUST_THRESHOLD;
use super::Supervisor;
use crate::strategy;

impl Supervisor {
    /// Phase 5: apply the configured strategy's exit to every eligible group.
    pub(crate) async fn check_strategy_execution(&mut self, now: DateTime<Utc>) {
        let Some(strat) = self.cfg.active_strategy().cloned() else {
            return;
        };
        if !strat.enabled {
            return;
        }

        let cids: Vec<String> = self.active_orders.keys().cloned().collect();
        for cid in cids {
            if self.strategy_executed.get(&cid).copied().unwrap_or(false) {
                continue;
            }
            let Some(market) = self.tracked_markets.get(&cid).cloned() else {
                continue;
            };
            let Some(orders) = self.active_orders.get(&cid).cloned() else {
                continue;
            };
            if orders.is_empty() {
                continue;
            }

            // Only groups authored by the configured strategy (legacy
            // untagged groups count as ours).
            let group_strategy = orders[0]
                .strategy
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| self.cfg.strategy_name.clone());
            if group_strategy.trim() != self.cfg.strategy_name {
                continue;
            }

            // The clock starts at market open.
            if now.timestamp() < market.start_ts {
                continue;
            }
            let since_start = now.timestamp() - market.start_ts;
            if since_start < strat.exit_timeout_seconds {
                continue;
            }

            info!(
                market = %market.market_slug,
                strategy = %self.cfg.strategy_name,
                since_start,
                timeout = strat.exit_timeout_seconds,
                "Strategy exit timeout reached"
            );

            let mut orders = orders;
            if strat.cancel_unfilled {
                for order in orders.iter_mut() {
                    if !order.is_live() {
                        continue;
                    }
                    let _ = self.exchange.cancel_order(&order.order_id).await;
                    order.status = OrderStatus::Cancelled;
                    self.order_history.insert(order.order_id.clone(), order.clone());
                }
            }

            if strat.market_sell_filled {
                let merged = self.merge_positions_if_possible(&market, &orders).await;
                if merged > Decimal::ZERO {
                    self.track_merge(&market, merged, now);
                }
                self.sell_leftovers_now(&market, &orders, now).await;
            }

            self.active_orders.insert(cid.clone(), orders);
            self.strategy_executed.insert(cid.clone(), true);
            self.positions_sold.insert(cid, true);
            self.persist_orders();
        }
    }

    /// Sell any remaining (post-merge) balances right now.
    async fn sell_leftovers_now(&mut self, market: &Market, orders: &[OrderRecord], now: DateTime<Utc>) {
        let (up_token, down_token) = infer_up_down_token_ids(market, orders);
        if up_token.is_empty() || down_token.is_empty() {
            return;
        }
        let up_balance = self.chain.outcome_balance(&up_token).await.unwrap_or(Decimal::ZERO);
        let down_balance = self
            .chain
            .outcome_balance(&down_token)
            .await
            .unwrap_or(Decimal::ZERO);
        let merged = self
            .merged_amounts
            .get(&market.condition_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let remaining_up = (up_balance - merged).max(Decimal::ZERO);
        let remaining_down = (down_balance - merged).max(Decimal::ZERO);

        let (up_outcome, down_outcome) = find_up_down_outcomes(&market.outcomes);
        let (up_outcome, down_outcome) = (up_outcome.cloned(), down_outcome.cloned());
        if remaining_up > DUST_THRESHOLD {
            if let Some(outcome) = up_outcome {
                self.sell_position_market(market, &outcome, remaining_up, now).await;
                tokio::time::sleep(strategy::SUBMIT_PACING).await;
            }
        }
        if remaining_down > DUST_THRESHOLD {
            if let Some(outcome) = down_outcome {
                self.sell_position_market(market, &outcome, remaining_down, now).await;
            }
        }
    }
}
