//! The "active work" gate and fallback idle placement.
//!
//! New markets are only entered when the bot is idle: no live orders resting
//! anywhere and no unmerged wallet positions. An unverifiable wallet never
//! blocks (that would deadlock the bot on RPC trouble), and a market that
//! ended more than five minutes ago is force-marked sold.

use chrono::{DateTime, Utc};

use tracing::info;
use updown_common::{infer_up_down_token_ids, Market, OrderRecord};

use super::discovery::should_place_orders;
use super::positions::DUST_THRESHOLD;
use super::Supervisor;

impl Supervisor {
    /// `(busy, reason)`: whether any market still needs attention.
    pub(crate) async fn has_active_market_work(&mut self, now: DateTime<Utc>) -> (bool, String) {
        // Live orders anywhere mean we are busy.
        for (cid, orders) in &self.active_orders {
            let live = orders.iter().filter(|o| o.is_live()).count();
            if live > 0 {
                let name = self.market_name_for_cid(cid);
                return (true, format!("waiting for {live} orders to fill in {name}"));
            }
        }

        // Unprocessed fills: filled orders whose wallet balances are not yet
        // merged or sold away.
        let cids: Vec<String> = self
            .active_orders
            .iter()
            .filter(|(cid, orders)| {
                !self.positions_sold.get(*cid).copied().unwrap_or(false)
                    && orders.iter().any(OrderRecord::is_filled)
            })
            .map(|(cid, _)| cid.clone())
            .collect();

        for cid in cids {
            let long_expired = self
                .tracked_markets
                .get(&cid)
                .is_some_and(|m| now.timestamp() > m.end_ts + 300);
            if long_expired {
                self.positions_sold.insert(cid, true);
                continue;
            }
            let orders = self.active_orders.get(&cid).cloned().unwrap_or_default();
            let (cleared, known) = self.wallet_positions_cleared(&cid, &orders).await;
            if known && !cleared {
                let name = self.market_name_for_cid(&cid);
                return (true, format!("waiting to merge positions in {name}"));
            }
        }

        (false, String::new())
    }

    /// `(cleared, known)`: whether both outcome balances are dust.
    ///
    /// `known = false` when token ids cannot be inferred or the chain cannot
    /// be read; such groups are treated as not blocking.
    pub(crate) async fn wallet_positions_cleared(
        &self,
        condition_id: &str,
        orders: &[OrderRecord],
    ) -> (bool, bool) {
        let stub = Market {
            condition_id: condition_id.to_string(),
            market_slug: String::new(),
            question: String::new(),
            start_ts: 0,
            end_ts: 0,
            outcomes: vec![],
            is_active: false,
            is_resolved: false,
        };
        let (up_token, down_token) = infer_up_down_token_ids(&stub, orders);
        if up_token.is_empty() || down_token.is_empty() {
            return (true, false);
        }

        let up = self.chain.outcome_balance(&up_token).await;
        let down = self.chain.outcome_balance(&down_token).await;
        match (up, down) {
            (Ok(up), Ok(down)) => (up <= DUST_THRESHOLD && down <= DUST_THRESHOLD, true),
            _ => (true, false),
        }
    }

    /// Phase 6: when idle, place against the nearest in-window market that
    /// has not been entered yet.
    pub(crate) async fn place_fallback_orders_if_idle(
        &mut self,
        upcoming: &[Market],
        now: DateTime<Utc>,
    ) {
        if upcoming.is_empty() {
            return;
        }
        let (busy, _) = self.has_active_market_work(now).await;
        if busy {
            return;
        }

        let pick = upcoming
            .iter()
            .filter(|m| m.start_ts > now.timestamp())
            .filter(|m| !self.orders_placed.get(&m.condition_id).copied().unwrap_or(false))
            .filter(|m| should_place_orders(&self.cfg, m, now))
            .min_by_key(|m| m.start_ts)
            .cloned();
        let Some(pick) = pick else {
            return;
        };

        info!(market = %pick.market_slug, "Idle: placing fallback orders for the next market");
        self.try_place_for_market(&pick, now).await;
    }

    pub(crate) fn market_name_for_cid(&self, condition_id: &str) -> String {
        if let Some(market) = self.tracked_markets.get(condition_id) {
            if !market.market_slug.trim().is_empty() {
                return market.market_slug.clone();
            }
        }
        Supervisor::short_cid(condition_id).to_string()
    }
}
