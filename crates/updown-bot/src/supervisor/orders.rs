//! Order reconciliation: refresh live orders against the exchange, run the
//! periodic merge, liquidate near expiry and clean up after it.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;

use updown_common::{OrderRecord, OrderStatus};

use crate::adapters::RemoteOrder;

use super::Supervisor;

/// Minimum spacing between merge attempts per market.
const MERGE_ATTEMPT_INTERVAL: Duration = Duration::from_secs(30);

/// Translate a remote order view onto a local record.
///
/// Terminal local statuses never regress; callers only pass live records.
/// Returns whether the record changed status.
pub(crate) fn apply_remote_status(
    order: &mut OrderRecord,
    remote: &RemoteOrder,
    now: DateTime<Utc>,
) -> bool {
    let original_size = if remote.original_size > Decimal::ZERO {
        remote.original_size
    } else {
        order.size
    };
    order.size_matched = Some(remote.size_matched);

    let previous = order.status;
    if remote.status == "MATCHED"
        || (original_size > Decimal::ZERO && remote.size_matched >= original_size)
    {
        order.status = OrderStatus::Filled;
        order.filled_at = Some(now);
    } else if remote.size_matched > Decimal::ZERO {
        order.status = OrderStatus::PartiallyFilled;
    } else if remote.status == "CANCELLED" {
        order.status = OrderStatus::Cancelled;
    } else if matches!(remote.status.as_str(), "OPEN" | "PLACED" | "LIVE" | "ACTIVE") {
        order.status = OrderStatus::Placed;
    }
    order.status != previous
}

impl Supervisor {
    /// Whether the per-market merge cadence allows another attempt.
    pub(crate) fn merge_due(&self, condition_id: &str) -> bool {
        match self.last_merge_attempt.get(condition_id) {
            Some(last) => last.elapsed() >= MERGE_ATTEMPT_INTERVAL,
            None => true,
        }
    }

    /// Phase 4: walk every active order group.
    pub(crate) async fn check_active_orders(&mut self, now: DateTime<Utc>) {
        let mut changed = false;
        let cids: Vec<String> = self.active_orders.keys().cloned().collect();

        for cid in cids {
            let Some(orders) = self.active_orders.get(&cid).cloned() else {
                continue;
            };

            let Some(market) = self.tracked_markets.get(&cid).cloned() else {
                changed |= self.reconcile_orphan_group(&cid, orders, now).await;
                continue;
            };

            let mut orders = orders;

            // Refresh every live order against the exchange.
            for order in orders.iter_mut() {
                if !order.is_live() {
                    continue;
                }
                let Ok(remote) = self.exchange.order_status(&order.order_id).await else {
                    continue;
                };
                if apply_remote_status(order, &remote, now) {
                    changed = true;
                }
                self.order_history.insert(order.order_id.clone(), order.clone());
            }

            let sold = self.positions_sold.get(&cid).copied().unwrap_or(false);
            if !sold {
                if self.merge_due(&cid) {
                    let merged = self.merge_positions_if_possible(&market, &orders).await;
                    if merged > Decimal::ZERO {
                        self.track_merge(&market, merged, now);
                        changed = true;
                    }
                    self.last_merge_attempt.insert(cid.clone(), Instant::now());
                }
                self.sell_remaining_positions_if_needed(&market, &orders, now).await;
            }

            // After the market has been over for 5 minutes, nothing should
            // rest on the book anymore.
            if now.timestamp() > market.end_ts + 300 {
                for order in orders.iter_mut() {
                    if !order.is_live() {
                        continue;
                    }
                    let _ = self.exchange.cancel_order(&order.order_id).await;
                    order.status = OrderStatus::Cancelled;
                    self.order_history.insert(order.order_id.clone(), order.clone());
                    changed = true;
                }
                self.positions_sold.insert(cid.clone(), true);
            }

            self.active_orders.insert(cid, orders);
        }

        if changed {
            self.persist_orders();
        }
    }

    /// Reconcile a group whose market is no longer tracked.
    async fn reconcile_orphan_group(
        &mut self,
        cid: &str,
        orders: Vec<OrderRecord>,
        now: DateTime<Utc>,
    ) -> bool {
        let (mut changed, kept) = self.refresh_orphaned_orders(cid, orders, now).await;
        let Some(orders) = kept else {
            return changed;
        };

        if !self.positions_sold.get(cid).copied().unwrap_or(false) {
            if self.merge_due(cid) {
                let stub = self.build_orphan_market(cid, &orders, now);
                let merged = self.merge_positions_if_possible(&stub, &orders).await;
                if merged > Decimal::ZERO {
                    self.track_merge(&stub, merged, now);
                    changed = true;
                }
                self.last_merge_attempt.insert(cid.to_string(), Instant::now());
            }
            let (cleared, known) = self.wallet_positions_cleared(cid, &orders).await;
            if known && cleared {
                info!(condition_id = cid, "Orphaned positions cleared");
                self.positions_sold.insert(cid.to_string(), true);
                changed = true;
            }
        }

        self.active_orders.insert(cid.to_string(), orders);
        changed
    }
}
