//! Orphan-order recovery.
//!
//! After a restart the exchange may hold live orders the state files know
//! nothing about, and the state files may hold groups whose market is no
//! longer tracked. Both directions are reconciled here: exchange orders are
//! re-adopted into groups, and orphaned groups are refreshed, trimmed and
//! eventually auto-finalised.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use updown_common::{is_up_name, Market, OrderRecord, OrderStatus, Outcome, TransactionType};
use updown_market::discovery::{slug_start_ts, WINDOW_SECS};
use updown_market::ClobError;

use super::orders::apply_remote_status;
use super::Supervisor;

/// A market slug whose encoded window ended more than five minutes ago.
pub(crate) fn is_orphan_market_expired(market_slug: &str, now: DateTime<Utc>) -> bool {
    match slug_start_ts(market_slug) {
        Some(start) => now.timestamp() > start + WINDOW_SECS + 300,
        None => false,
    }
}

impl Supervisor {
    /// Adopt open orders the exchange knows about but we do not.
    pub(crate) async fn recover_existing_orders(&mut self) -> Result<(), ClobError> {
        let open = match self.exchange.open_orders(None).await {
            Ok(open) => open,
            Err(e) => {
                // No L2 auth (or a transient failure): recovery is best-effort.
                debug!(error = %e, "Open-order recovery unavailable");
                return Ok(());
            }
        };
        if open.is_empty() {
            return Ok(());
        }
        info!(count = open.len(), "Recovering existing orders from the orderbook");

        let mut recovered = 0usize;
        for remote in open {
            if remote.id.is_empty() || remote.condition_id.is_empty() {
                continue;
            }
            let already_tracked = self
                .active_orders
                .values()
                .flatten()
                .any(|o| o.order_id == remote.id);
            if already_tracked {
                continue;
            }

            // Hydrate slug/outcome from whatever we still know.
            let mut market_slug = format!("recovered-{}", Self::short_cid(&remote.condition_id));
            let mut outcome_name = "Unknown".to_string();
            if let Some(market) = self.tracked_markets.get(&remote.condition_id) {
                market_slug = market.market_slug.clone();
                if let Some(outcome) =
                    market.outcomes.iter().find(|o| o.token_id == remote.token_id)
                {
                    outcome_name = outcome.outcome.clone();
                }
            } else if let Some(known) = self
                .active_orders
                .values()
                .flatten()
                .find(|o| o.condition_id == remote.condition_id && o.token_id == remote.token_id)
            {
                market_slug = known.market_slug.clone();
                outcome_name = known.outcome.clone();
            }

            let now = Utc::now();
            let mut record = OrderRecord {
                order_id: remote.id.clone(),
                market_slug,
                condition_id: remote.condition_id.clone(),
                token_id: remote.token_id.clone(),
                outcome: outcome_name,
                side: remote.side,
                price: remote.price,
                size: remote.size,
                size_usd: remote.price * remote.size,
                status: OrderStatus::Placed,
                size_matched: None,
                created_at: now,
                filled_at: None,
                error_message: None,
                strategy: None,
                transaction_type: match remote.side {
                    updown_common::OrderSide::Buy => TransactionType::Buy,
                    updown_common::OrderSide::Sell => TransactionType::Sell,
                },
                revenue_usd: None,
                cost_usd: None,
                pnl_usd: None,
            };

            // Refresh to avoid re-adopting an already-dead order as live.
            if let Ok(details) = self.exchange.order_status(&remote.id).await {
                record.size_matched = Some(details.size_matched);
                if details.status == "CANCELLED" {
                    record.status = OrderStatus::Cancelled;
                }
            }

            self.order_history.insert(record.order_id.clone(), record.clone());
            self.active_orders
                .entry(remote.condition_id.clone())
                .or_default()
                .push(record);
            self.orders_placed.insert(remote.condition_id, true);
            recovered += 1;
        }

        if recovered > 0 {
            self.persist_orders();
        }
        info!(recovered, "Order recovery finished");
        Ok(())
    }

    /// Refresh an orphaned group's live orders and trim it.
    ///
    /// Returns `(changed, kept)`; `kept = None` means the whole group was
    /// dropped (nothing live or filled remained, or it was auto-finalised).
    pub(crate) async fn refresh_orphaned_orders(
        &mut self,
        condition_id: &str,
        orders: Vec<OrderRecord>,
        now: DateTime<Utc>,
    ) -> (bool, Option<Vec<OrderRecord>>) {
        let mut changed = false;
        let mut kept: Vec<OrderRecord> = Vec::new();

        for mut order in orders {
            if order.is_live() {
                match self.exchange.order_status(&order.order_id).await {
                    Ok(remote) => {
                        if apply_remote_status(&mut order, &remote, now) {
                            changed = true;
                        }
                    }
                    Err(_) => {
                        // Unreachable order on a clearly-expired market: it
                        // cannot fill anymore.
                        if is_orphan_market_expired(&order.market_slug, now) {
                            order.status = OrderStatus::Cancelled;
                            changed = true;
                        }
                    }
                }
            }

            self.order_history.insert(order.order_id.clone(), order.clone());
            if order.is_live() || order.status == OrderStatus::Filled {
                kept.push(order);
            } else {
                changed = true;
            }
        }

        if kept.is_empty() {
            self.clear_orphan_group(condition_id);
            return (true, None);
        }

        if !self.positions_sold.get(condition_id).copied().unwrap_or(false)
            && self.should_auto_finalize_orphan(condition_id, &kept).await
        {
            info!(condition_id, "Auto-finalising unrecoverable orphan group");
            self.positions_sold.insert(condition_id.to_string(), true);
            self.active_orders.remove(condition_id);
            self.last_merge_attempt.remove(condition_id);
            return (true, None);
        }

        (changed, Some(kept))
    }

    pub(crate) fn clear_orphan_group(&mut self, condition_id: &str) {
        self.active_orders.remove(condition_id);
        self.orders_placed.remove(condition_id);
        self.positions_sold.remove(condition_id);
        self.last_merge_attempt.remove(condition_id);
        self.merged_amounts.remove(condition_id);
        self.strategy_executed.remove(condition_id);
    }

    /// An orphan group may be finalised when it has no live orders, is
    /// missing critical data, and either the wallet confirms empty or the
    /// group is over a day old.
    pub(crate) async fn should_auto_finalize_orphan(
        &self,
        condition_id: &str,
        orders: &[OrderRecord],
    ) -> bool {
        if self.tracked_markets.contains_key(condition_id) {
            return false;
        }
        if orders.iter().any(OrderRecord::is_live) {
            return false;
        }

        let missing_data = orders.iter().any(|o| {
            o.token_id.trim().is_empty() || o.outcome.trim().eq_ignore_ascii_case("Unknown")
        });
        if !missing_data {
            return false;
        }

        let (cleared, known) = self.wallet_positions_cleared(condition_id, orders).await;
        if known && cleared {
            return true;
        }

        match orders.iter().map(|o| o.created_at).min() {
            Some(oldest) => Utc::now() - oldest > chrono::Duration::hours(24),
            None => false,
        }
    }

    /// Stand-in market for an orphaned group, good enough for merges and
    /// synthetic records.
    pub(crate) fn build_orphan_market(
        &self,
        condition_id: &str,
        orders: &[OrderRecord],
        now: DateTime<Utc>,
    ) -> Market {
        let slug = orders
            .iter()
            .map(|o| o.market_slug.trim())
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("orphaned-{condition_id}"));

        let mut seen = std::collections::HashSet::new();
        let mut outcomes = Vec::new();
        for order in orders {
            let token_id = order.token_id.trim();
            if token_id.is_empty() || !seen.insert(token_id.to_string()) {
                continue;
            }
            let name = order.outcome.trim();
            let name = if name.is_empty() || name.eq_ignore_ascii_case("Unknown") {
                if outcomes.is_empty() { "Up" } else { "Down" }
            } else {
                name
            };
            outcomes.push(Outcome::new(token_id, name));
        }
        // Keep Up before Down when both were recovered.
        outcomes.sort_by_key(|o| !is_up_name(&o.outcome));

        Market {
            condition_id: condition_id.to_string(),
            market_slug: slug,
            question: "Orphaned market".to_string(),
            start_ts: now.timestamp() - 60,
            end_ts: now.timestamp() + 3_600,
            outcomes,
            is_active: false,
            is_resolved: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_orphan_expiry_from_slug() {
        let start = 1_735_689_600i64;
        let slug = format!("btc-updown-15m-{start}");

        // One second after end + 5 minutes: expired.
        let now = Utc.timestamp_opt(start + WINDOW_SECS + 301, 0).single().unwrap();
        assert!(is_orphan_market_expired(&slug, now));

        // Still inside the grace window: not expired.
        let now = Utc.timestamp_opt(start + WINDOW_SECS + 299, 0).single().unwrap();
        assert!(!is_orphan_market_expired(&slug, now));

        // Foreign slugs never count as expired.
        let now = Utc.timestamp_opt(start + 10_000, 0).single().unwrap();
        assert!(!is_orphan_market_expired("recovered-0xc0ffee", now));
    }
}
