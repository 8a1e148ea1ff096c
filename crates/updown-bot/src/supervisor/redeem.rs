//! Periodic redemption sweep.
//!
//! The Data API's positions listing marks redeemable condition ids; each one
//! gets a `redeemPositions` call and a synthetic REDEEM history record worth
//! the group's reported current value. The endpoint is advisory: failures
//! skip the sweep instead of erroring the tick.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use updown_common::{OrderRecord, OrderSide, OrderStatus, TransactionType};
use updown_market::{DataApiError, UserPosition};

use super::Supervisor;

impl Supervisor {
    pub(crate) fn should_check_redemptions(&self) -> bool {
        match self.last_redemption_check {
            Some(last) => {
                last.elapsed() >= Duration::from_secs(self.cfg.redeem_check_interval_seconds)
            }
            None => true,
        }
    }

    /// Redeem every redeemable position group; returns how many condition
    /// ids were redeemed.
    pub(crate) async fn check_and_redeem_all(&mut self) -> Result<usize, DataApiError> {
        let wallet = self.chain.wallet_address();
        let positions = self.positions_api.positions(&wallet).await?;
        if positions.is_empty() {
            return Ok(0);
        }

        let mut redeemable: BTreeMap<String, Vec<UserPosition>> = BTreeMap::new();
        for position in positions {
            if !position.redeemable || position.condition_id.is_empty() {
                continue;
            }
            redeemable
                .entry(position.condition_id.clone())
                .or_default()
                .push(position);
        }
        if redeemable.is_empty() {
            return Ok(0);
        }

        let mut redeemed = 0usize;
        for (cid, group) in redeemable {
            let tx = match self.chain.redeem_positions(&cid).await {
                Ok(tx) => tx,
                Err(e) => {
                    warn!(condition_id = %cid, error = %e, "Redeem failed");
                    continue;
                }
            };
            redeemed += 1;

            let amount: Decimal = group.iter().map(UserPosition::current_value_decimal).sum();
            let title = group[0].display_title().to_string();
            info!(condition_id = %cid, amount = %amount, tx, "Redeemed resolved market");

            let now = Utc::now();
            let record = OrderRecord {
                order_id: format!("REDEEM-{}-{}", Self::short_cid(&cid), now.timestamp()),
                market_slug: title,
                condition_id: cid,
                token_id: String::new(),
                outcome: "REDEEM".to_string(),
                side: OrderSide::Sell,
                price: Decimal::ONE,
                size: amount,
                size_usd: amount,
                status: OrderStatus::Filled,
                size_matched: None,
                created_at: now,
                filled_at: Some(now),
                error_message: None,
                strategy: None,
                transaction_type: TransactionType::Redeem,
                revenue_usd: Some(amount),
                cost_usd: Some(Decimal::ZERO),
                pnl_usd: Some(amount),
            };
            self.order_history.insert(record.order_id.clone(), record);
        }

        if redeemed > 0 {
            if let Err(e) = self.files.save_history(&self.order_history) {
                warn!(error = %e, "Could not persist order history after redemption");
            }
        }
        Ok(redeemed)
    }
}
