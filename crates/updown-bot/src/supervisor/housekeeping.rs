//! Housekeeping: retire markets a day after they end.

use chrono::{DateTime, Utc};
use tracing::info;

use updown_common::OrderStatus;

use super::Supervisor;

impl Supervisor {
    /// Phase 7: drop markets whose window ended more than 24 hours ago,
    /// finalising any still-open order in their groups.
    pub(crate) async fn cleanup_old_markets(&mut self, now: DateTime<Utc>) {
        let cutoff = now.timestamp() - 86_400;
        let old_cids: Vec<String> = self
            .tracked_markets
            .iter()
            .filter(|(_, m)| m.end_ts < cutoff)
            .map(|(cid, _)| cid.clone())
            .collect();
        if old_cids.is_empty() {
            return;
        }
        info!(count = old_cids.len(), "Cleaning up old markets");

        let mut status_changed = false;
        for cid in &old_cids {
            if self.active_orders.get(cid).is_some_and(|orders| !orders.is_empty()) {
                status_changed |= self.finalize_old_order_statuses(cid).await;
            }

            self.tracked_markets.remove(cid);
            self.orders_placed.remove(cid);
            self.active_orders.remove(cid);
            self.positions_sold.remove(cid);
            self.last_merge_attempt.remove(cid);
            self.merged_amounts.remove(cid);
            self.strategy_executed.remove(cid);
        }

        self.persist_markets();
        if status_changed {
            self.persist_orders();
        }
    }

    /// A day-old order still reported open is treated as cancelled so it
    /// cannot linger in the views forever.
    async fn finalize_old_order_statuses(&mut self, condition_id: &str) -> bool {
        let Some(mut orders) = self.active_orders.get(condition_id).cloned() else {
            return false;
        };

        let mut changed = false;
        for order in orders.iter_mut() {
            if order.status.is_terminal() {
                continue;
            }
            match self.exchange.order_status(&order.order_id).await {
                Ok(remote) if remote.status == "CANCELLED" => {
                    if order.status != OrderStatus::Cancelled {
                        order.status = OrderStatus::Cancelled;
                        changed = true;
                    }
                }
                Ok(_) if order.is_live() => {
                    order.status = OrderStatus::Cancelled;
                    changed = true;
                }
                Ok(_) => {}
                Err(_) => {
                    if order.is_live() {
                        order.status = OrderStatus::Cancelled;
                        changed = true;
                    }
                }
            }
            self.order_history.insert(order.order_id.clone(), order.clone());
        }

        self.active_orders.insert(condition_id.to_string(), orders);
        changed
    }
}
