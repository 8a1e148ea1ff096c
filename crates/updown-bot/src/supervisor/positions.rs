//! Wallet position handling: periodic merges and residual liquidation.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use tracing::{debug, info, warn};

use updown_common::{
    find_up_down_outcomes, infer_up_down_token_ids, snap_to_tick, Market, OrderRecord, OrderSide,
    OrderStatus, Outcome, TickSize, TransactionType,
};

use crate::adapters::{OrderPlacement, OrderRequest};
use crate::strategy;

use super::Supervisor;

/// Balances at or below this many share units count as dust.
pub(crate) const DUST_THRESHOLD: Decimal = dec!(0.01);

/// Merge only when at least this many whole sets are newly available.
const MIN_MERGE_UNITS: Decimal = dec!(0.001);

/// Price a residual liquidation: discount off the best bid, floored at the
/// configured minimum, snapped to the tick grid. `None` when the bid is
/// missing or below the floor.
pub(crate) fn liquidation_price(
    best_bid: Option<Decimal>,
    discount: Decimal,
    min_sell_price: Decimal,
    tick: TickSize,
) -> Option<Decimal> {
    let bid = best_bid.filter(|b| *b > Decimal::ZERO)?;
    if bid < min_sell_price {
        return None;
    }
    Some(snap_to_tick((bid - discount).max(min_sell_price), tick))
}

impl Supervisor {
    /// Attempt one merge for a market: burn `min(up, down)` minus what was
    /// already merged. Returns the units merged (zero on any failure).
    pub(crate) async fn merge_positions_if_possible(
        &mut self,
        market: &Market,
        orders: &[OrderRecord],
    ) -> Decimal {
        let (up_token, down_token) = infer_up_down_token_ids(market, orders);
        if up_token.is_empty() || down_token.is_empty() {
            return Decimal::ZERO;
        }

        let Ok(up_balance) = self.chain.outcome_balance(&up_token).await else {
            return Decimal::ZERO;
        };
        let Ok(down_balance) = self.chain.outcome_balance(&down_token).await else {
            return Decimal::ZERO;
        };
        if up_balance <= Decimal::ZERO || down_balance <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let already = self
            .merged_amounts
            .get(&market.condition_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let merge_amount = up_balance.min(down_balance) - already;
        if merge_amount <= MIN_MERGE_UNITS {
            return Decimal::ZERO;
        }

        match self.chain.merge_positions(&market.condition_id, merge_amount).await {
            Ok(tx) => {
                info!(
                    market = %market.market_slug,
                    units = %merge_amount,
                    tx,
                    "Merged sets back into collateral"
                );
                self.merged_amounts
                    .insert(market.condition_id.clone(), already + merge_amount);
                merge_amount
            }
            Err(e) => {
                warn!(market = %market.market_slug, error = %e, "Merge failed");
                Decimal::ZERO
            }
        }
    }

    /// Append the synthetic MERGE history record for a successful merge.
    pub(crate) fn track_merge(&mut self, market: &Market, merged: Decimal, now: DateTime<Utc>) {
        let record = OrderRecord {
            order_id: format!("MERGE-{}-{}", Self::short_cid(&market.condition_id), now.timestamp()),
            market_slug: market.market_slug.clone(),
            condition_id: market.condition_id.clone(),
            token_id: String::new(),
            outcome: "MERGE".to_string(),
            side: OrderSide::Sell,
            price: Decimal::ONE,
            size: merged,
            size_usd: merged,
            status: OrderStatus::Filled,
            size_matched: None,
            created_at: now,
            filled_at: Some(now),
            error_message: None,
            strategy: None,
            transaction_type: TransactionType::Merge,
            revenue_usd: Some(merged),
            cost_usd: Some(Decimal::ZERO),
            pnl_usd: Some(merged),
        };
        self.order_history.insert(record.order_id.clone(), record);
    }

    /// Sell whatever share balances remain (post-merge) once the market is
    /// inside its final minute.
    pub(crate) async fn sell_remaining_positions_if_needed(
        &mut self,
        market: &Market,
        orders: &[OrderRecord],
        now: DateTime<Utc>,
    ) {
        let cid = market.condition_id.clone();
        if self.positions_sold.get(&cid).copied().unwrap_or(false) {
            return;
        }
        if now.timestamp() < market.end_ts - 60 {
            return;
        }

        let (up_token, down_token) = infer_up_down_token_ids(market, orders);
        if up_token.is_empty() || down_token.is_empty() {
            self.positions_sold.insert(cid, true);
            return;
        }
        let up_balance = self.chain.outcome_balance(&up_token).await.unwrap_or(Decimal::ZERO);
        let down_balance = self
            .chain
            .outcome_balance(&down_token)
            .await
            .unwrap_or(Decimal::ZERO);
        let merged = self.merged_amounts.get(&cid).copied().unwrap_or(Decimal::ZERO);

        let remaining_up = (up_balance - merged).max(Decimal::ZERO);
        let remaining_down = (down_balance - merged).max(Decimal::ZERO);
        if remaining_up <= DUST_THRESHOLD && remaining_down <= DUST_THRESHOLD {
            self.positions_sold.insert(cid, true);
            return;
        }

        info!(
            market = %market.market_slug,
            up = %remaining_up,
            down = %remaining_down,
            "Selling remaining positions before expiry"
        );
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
        self.positions_sold.insert(cid, true);
        self.persist_orders();
    }

    /// Place one liquidation SELL near the bid. The record goes straight to
    /// history; liquidations are not tracked as active group members.
    pub(crate) async fn sell_position_market(
        &mut self,
        market: &Market,
        outcome: &Outcome,
        size: Decimal,
        now: DateTime<Utc>,
    ) -> bool {
        let top = match self.exchange.book_top(&outcome.token_id).await {
            Ok(top) => top,
            Err(e) => {
                warn!(token_id = %outcome.token_id, error = %e, "Liquidation book fetch failed");
                return false;
            }
        };
        let tick = strategy::tick_or_default(&self.exchange, &outcome.token_id).await;
        let Some(price) = liquidation_price(
            top.best_bid,
            self.cfg.market_sell_discount,
            self.cfg.min_sell_price,
            tick,
        ) else {
            debug!(
                token_id = %outcome.token_id,
                best_bid = ?top.best_bid,
                min_sell_price = %self.cfg.min_sell_price,
                "Best bid below minimum sell price, skipping liquidation"
            );
            return false;
        };

        let size = size.round_dp_with_strategy(2, RoundingStrategy::ToZero);
        let request = OrderRequest {
            token_id: outcome.token_id.clone(),
            side: OrderSide::Sell,
            price,
            size,
        };
        let placement = match self.exchange.place_order(&request).await {
            Ok(placement) => placement,
            Err(e) => {
                warn!(token_id = %outcome.token_id, error = %e, "Liquidation sell failed");
                return false;
            }
        };

        let mut record = strategy::order_record(
            market,
            &outcome.token_id,
            &outcome.outcome,
            OrderSide::Sell,
            placement.order_id(),
            price,
            size,
            &self.cfg.strategy_name,
            now,
        );
        if let OrderPlacement::Unconfirmed { error, .. } = &placement {
            record.error_message = Some(error.clone());
        }
        info!(
            market = %market.market_slug,
            outcome = %outcome.outcome,
            price = %price,
            size = %size,
            order_id = %record.order_id,
            "Liquidation sell placed"
        );
        self.order_history.insert(record.order_id.clone(), record);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liquidation_price_discounts_bid() {
        let price = liquidation_price(
            Some(dec!(0.50)),
            dec!(0.02),
            dec!(0.10),
            TickSize::Hundredth,
        );
        assert_eq!(price, Some(dec!(0.48)));
    }

    #[test]
    fn test_liquidation_price_floors_at_min() {
        let price = liquidation_price(
            Some(dec!(0.11)),
            dec!(0.02),
            dec!(0.10),
            TickSize::Hundredth,
        );
        assert_eq!(price, Some(dec!(0.10)));
    }

    #[test]
    fn test_liquidation_price_rejects_low_bids() {
        assert_eq!(
            liquidation_price(Some(dec!(0.09)), dec!(0.02), dec!(0.10), TickSize::Hundredth),
            None
        );
        assert_eq!(
            liquidation_price(None, dec!(0.02), dec!(0.10), TickSize::Hundredth),
            None
        );
        assert_eq!(
            liquidation_price(Some(Decimal::ZERO), dec!(0.02), dec!(0.10), TickSize::Hundredth),
            None
        );
    }

    #[test]
    fn test_liquidation_price_snaps_to_tick() {
        let price = liquidation_price(
            Some(dec!(0.505)),
            dec!(0.02),
            dec!(0.10),
            TickSize::Hundredth,
        );
        // 0.505 - 0.02 = 0.485 -> snapped half away from zero -> 0.49.
        assert_eq!(price, Some(dec!(0.49)));
    }
}
