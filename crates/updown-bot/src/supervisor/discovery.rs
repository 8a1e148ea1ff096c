//! Discovery filtering and the order placement gate.

use chrono::{DateTime, Utc};

use updown_common::Market;

use crate::config::Config;

use super::Supervisor;

/// Markets stay interesting from 5 minutes past their end until 24 hours
/// before their start window closes.
pub(crate) fn within_tracking_window(market: &Market, now_ts: i64) -> bool {
    if market.is_resolved {
        return false;
    }
    market.end_ts >= now_ts - 300 && market.start_ts <= now_ts + 86_400
}

/// Whether `market` sits inside the configured pre-start placement window.
pub(crate) fn should_place_orders(cfg: &Config, market: &Market, now: DateTime<Utc>) -> bool {
    let seconds_until_start = market.seconds_until_start(now);
    seconds_until_start >= cfg.order_placement_min_minutes * 60
        && seconds_until_start <= cfg.order_placement_max_minutes * 60
}

impl Supervisor {
    /// Keep the markets worth tracking, register new ones, and return them
    /// sorted by start time.
    pub(crate) fn filter_upcoming(
        &mut self,
        markets: Vec<Market>,
        now: DateTime<Utc>,
    ) -> Vec<Market> {
        let now_ts = now.timestamp();
        let mut changed = false;
        let mut upcoming: Vec<Market> = Vec::new();

        for market in markets {
            if !within_tracking_window(&market, now_ts) {
                continue;
            }
            if !self.tracked_markets.contains_key(&market.condition_id) {
                self.tracked_markets
                    .insert(market.condition_id.clone(), market.clone());
                self.orders_placed.insert(market.condition_id.clone(), false);
                changed = true;
            }
            upcoming.push(market);
        }

        if changed {
            self.persist_markets();
        }
        upcoming.sort_by_key(|m| m.start_ts);
        upcoming
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn market_at(start_ts: i64) -> Market {
        Market {
            condition_id: format!("0x{start_ts}"),
            market_slug: format!("btc-updown-15m-{start_ts}"),
            question: "q".into(),
            start_ts,
            end_ts: start_ts + 900,
            outcomes: vec![],
            is_active: true,
            is_resolved: false,
        }
    }

    #[test]
    fn test_tracking_window_filter() {
        // now = 2025-01-01T12:00:00Z
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let now_ts = now.timestamp();

        // Starts in 30 minutes: kept.
        assert!(within_tracking_window(&market_at(now_ts + 30 * 60), now_ts));
        // Ended 12 hours ago: dropped (end < now - 300).
        assert!(!within_tracking_window(&market_at(now_ts - 12 * 3600), now_ts));
        // Starts in 25 hours: dropped (start > now + 86400).
        assert!(!within_tracking_window(&market_at(now_ts + 25 * 3600), now_ts));
        // Ended exactly 300 seconds ago: still kept.
        assert!(within_tracking_window(&market_at(now_ts - 900 - 300), now_ts));
        // Resolved markets are dropped regardless of timing.
        let mut resolved = market_at(now_ts + 30 * 60);
        resolved.is_resolved = true;
        assert!(!within_tracking_window(&resolved, now_ts));
    }

    #[test]
    fn test_placement_gate() {
        let cfg = test_config();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let now_ts = now.timestamp();

        // 12 minutes out: inside the 10-20 minute window.
        assert!(should_place_orders(&cfg, &market_at(now_ts + 720), now));
        // 9.5 minutes out: too late.
        assert!(!should_place_orders(&cfg, &market_at(now_ts + 570), now));
        // 21 minutes out: too early.
        assert!(!should_place_orders(&cfg, &market_at(now_ts + 1260), now));
        // Window bounds are inclusive.
        assert!(should_place_orders(&cfg, &market_at(now_ts + 600), now));
        assert!(should_place_orders(&cfg, &market_at(now_ts + 1200), now));
    }

    fn test_config() -> Config {
        Config {
            private_key: "0x01".into(),
            chain_id: 137,
            signature_type: "EOA".into(),
            funder_address: None,
            order_size_usd: dec!(10),
            spread_offset: dec!(0.01),
            check_interval_seconds: 60,
            order_placement_min_minutes: 10,
            order_placement_max_minutes: 20,
            redeem_check_interval_seconds: 60,
            min_sell_price: dec!(0.10),
            market_sell_discount: dec!(0.02),
            strategy_name: "quick_exit_7_5min".into(),
            order_mode: crate::config::OrderMode::Test,
            gamma_api_base_url: String::new(),
            clob_api_url: String::new(),
            data_api_base_url: String::new(),
            rpc_url: String::new(),
            dashboard_host: String::new(),
            dashboard_port: 0,
            log_level: "INFO".into(),
            log_file: "bot.log".into(),
            strategies: Default::default(),
        }
    }
}
