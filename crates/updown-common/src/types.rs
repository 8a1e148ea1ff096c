//! Domain types shared between the market clients and the supervisor.
//!
//! Serde field names follow the persisted JSON layout of the state files
//! (`start_timestamp`, `transaction_type`, ...), so loading state written by
//! earlier deployments keeps working.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side on the CLOB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of an order record.
///
/// `Filled`, `Cancelled` and `Failed` are terminal: once a record reaches one
/// of them it is never re-opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Placed,
    PartiallyFilled,
    Filled,
    Cancelled,
    Failed,
}

impl OrderStatus {
    /// Whether this status can still change (order may rest on the book).
    pub fn is_live(&self) -> bool {
        matches!(self, OrderStatus::Placed | OrderStatus::PartiallyFilled)
    }

    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Failed
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Placed => "PLACED",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// Accounting category of a history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Buy,
    Sell,
    Merge,
    Redeem,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionType::Buy => "BUY",
            TransactionType::Sell => "SELL",
            TransactionType::Merge => "MERGE",
            TransactionType::Redeem => "REDEEM",
        };
        write!(f, "{s}")
    }
}

/// One side of a binary market, with optionally cached book prices.
///
/// The cached prices are a dashboard convenience and are not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub token_id: String,
    pub outcome: String,
    /// Cached mid price, `(best_bid + best_ask) / 2`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_bid: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_ask: Option<Decimal>,
}

impl Outcome {
    pub fn new(token_id: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            outcome: outcome.into(),
            price: None,
            best_bid: None,
            best_ask: None,
        }
    }
}

/// A 15-minute up/down market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub condition_id: String,
    pub market_slug: String,
    pub question: String,
    #[serde(rename = "start_timestamp")]
    pub start_ts: i64,
    #[serde(rename = "end_timestamp")]
    pub end_ts: i64,
    #[serde(default)]
    pub outcomes: Vec<Outcome>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_resolved: bool,
}

impl Market {
    pub fn start_time(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.start_ts, 0).single().unwrap_or_default()
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.end_ts, 0).single().unwrap_or_default()
    }

    /// Seconds until the market window opens (negative once started).
    pub fn seconds_until_start(&self, now: DateTime<Utc>) -> i64 {
        self.start_ts - now.timestamp()
    }

    /// Seconds until the market window closes (negative once ended).
    pub fn seconds_until_end(&self, now: DateTime<Utc>) -> i64 {
        self.end_ts - now.timestamp()
    }
}

/// Case-insensitive check for the "Up"/"Yes" side of a market.
pub fn is_up_name(name: &str) -> bool {
    matches!(name.trim().to_ascii_uppercase().as_str(), "YES" | "UP")
}

/// Case-insensitive check for the "Down"/"No" side of a market.
pub fn is_down_name(name: &str) -> bool {
    matches!(name.trim().to_ascii_uppercase().as_str(), "NO" | "DOWN")
}

/// Pick the (up, down) outcomes from a market's outcome list.
///
/// The first matching outcome wins for each side, so the result does not
/// depend on the order the API listed them in.
pub fn find_up_down_outcomes(outcomes: &[Outcome]) -> (Option<&Outcome>, Option<&Outcome>) {
    let mut up = None;
    let mut down = None;
    for o in outcomes {
        if up.is_none() && is_up_name(&o.outcome) {
            up = Some(o);
        }
        if down.is_none() && is_down_name(&o.outcome) {
            down = Some(o);
        }
    }
    (up, down)
}

/// A single order as tracked by the bot, from placement through settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub market_slug: String,
    pub condition_id: String,
    pub token_id: String,
    pub outcome: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
    pub size_usd: Decimal,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_matched: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    pub transaction_type: TransactionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue_usd: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnl_usd: Option<Decimal>,
}

impl OrderRecord {
    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }

    pub fn is_filled(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Filled | OrderStatus::PartiallyFilled
        )
    }
}

/// Infer the (up, down) token ids for a market group.
///
/// Order records are preferred over the market's outcome list because
/// recovered groups may carry token ids the tracked market no longer does.
pub fn infer_up_down_token_ids(market: &Market, orders: &[OrderRecord]) -> (String, String) {
    let mut up = String::new();
    let mut down = String::new();
    for o in orders {
        if up.is_empty() && is_up_name(&o.outcome) && !o.token_id.is_empty() {
            up = o.token_id.clone();
        }
        if down.is_empty() && is_down_name(&o.outcome) && !o.token_id.is_empty() {
            down = o.token_id.clone();
        }
    }
    if up.is_empty() || down.is_empty() {
        for o in &market.outcomes {
            if up.is_empty() && is_up_name(&o.outcome) && !o.token_id.is_empty() {
                up = o.token_id.clone();
            }
            if down.is_empty() && is_down_name(&o.outcome) && !o.token_id.is_empty() {
                down = o.token_id.clone();
            }
        }
    }
    (up, down)
}

/// Snapshot of the supervisor's state, copied out for the dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotState {
    pub is_running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub active_markets: Vec<Market>,
    #[serde(default)]
    pub pending_orders: Vec<OrderRecord>,
    #[serde(default)]
    pub recent_orders: Vec<OrderRecord>,
    pub usdc_balance: Decimal,
    pub total_pnl: Decimal,
    pub error_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn outcome(token: &str, name: &str) -> Outcome {
        Outcome::new(token, name)
    }

    #[test]
    fn test_side_and_status_serde_names() {
        assert_eq!(serde_json::to_string(&OrderSide::Buy).unwrap(), "\"BUY\"");
        assert_eq!(
            serde_json::to_string(&OrderStatus::PartiallyFilled).unwrap(),
            "\"PARTIALLY_FILLED\""
        );
        assert_eq!(
            serde_json::to_string(&TransactionType::Merge).unwrap(),
            "\"MERGE\""
        );
        let s: OrderStatus = serde_json::from_str("\"CANCELLED\"").unwrap();
        assert_eq!(s, OrderStatus::Cancelled);
    }

    #[test]
    fn test_status_liveness() {
        assert!(OrderStatus::Placed.is_live());
        assert!(OrderStatus::PartiallyFilled.is_live());
        assert!(!OrderStatus::Filled.is_live());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
    }

    #[test]
    fn test_outcome_name_matching() {
        assert!(is_up_name("Up"));
        assert!(is_up_name("YES"));
        assert!(is_up_name(" yes "));
        assert!(is_down_name("Down"));
        assert!(is_down_name("no"));
        assert!(!is_up_name("Down"));
        assert!(!is_down_name("maybe"));
    }

    #[test]
    fn test_find_up_down_outcomes_order_independent() {
        let a = vec![outcome("t1", "Up"), outcome("t2", "Down")];
        let b = vec![outcome("t2", "Down"), outcome("t1", "Up")];

        let (up_a, down_a) = find_up_down_outcomes(&a);
        let (up_b, down_b) = find_up_down_outcomes(&b);
        assert_eq!(up_a.unwrap().token_id, up_b.unwrap().token_id);
        assert_eq!(down_a.unwrap().token_id, down_b.unwrap().token_id);
    }

    #[test]
    fn test_infer_token_ids_prefers_order_records() {
        let market = Market {
            condition_id: "0xabc".into(),
            market_slug: "btc-updown-15m-1".into(),
            question: "q".into(),
            start_ts: 0,
            end_ts: 900,
            outcomes: vec![outcome("m-up", "Up"), outcome("m-down", "Down")],
            is_active: true,
            is_resolved: false,
        };
        let orders = vec![OrderRecord {
            order_id: "o1".into(),
            market_slug: market.market_slug.clone(),
            condition_id: market.condition_id.clone(),
            token_id: "o-up".into(),
            outcome: "Up".into(),
            side: OrderSide::Buy,
            price: dec!(0.5),
            size: dec!(10),
            size_usd: dec!(5),
            status: OrderStatus::Filled,
            size_matched: None,
            created_at: Utc::now(),
            filled_at: None,
            error_message: None,
            strategy: None,
            transaction_type: TransactionType::Buy,
            revenue_usd: None,
            cost_usd: None,
            pnl_usd: None,
        }];

        let (up, down) = infer_up_down_token_ids(&market, &orders);
        assert_eq!(up, "o-up");
        assert_eq!(down, "m-down");
    }

    #[test]
    fn test_market_timing() {
        let m = Market {
            condition_id: "c".into(),
            market_slug: "s".into(),
            question: "q".into(),
            start_ts: 1_000,
            end_ts: 1_900,
            outcomes: vec![],
            is_active: true,
            is_resolved: false,
        };
        let now = Utc.timestamp_opt(400, 0).single().unwrap();
        assert_eq!(m.seconds_until_start(now), 600);
        assert_eq!(m.seconds_until_end(now), 1_500);
    }

    #[test]
    fn test_order_record_roundtrip() {
        let rec = OrderRecord {
            order_id: "0xdeadbeef".into(),
            market_slug: "btc-updown-15m-1735689600".into(),
            condition_id: "0xc0ffee".into(),
            token_id: "123456".into(),
            outcome: "Up".into(),
            side: OrderSide::Sell,
            price: dec!(0.53),
            size: dec!(18.87),
            size_usd: dec!(10.0011),
            status: OrderStatus::Placed,
            size_matched: Some(dec!(0)),
            created_at: Utc::now(),
            filled_at: None,
            error_message: None,
            strategy: Some("quick_exit_7_5min".into()),
            transaction_type: TransactionType::Sell,
            revenue_usd: Some(dec!(10.0011)),
            cost_usd: Some(dec!(0)),
            pnl_usd: Some(dec!(10.0011)),
        };
        let json = serde_json::to_string_pretty(&rec).unwrap();
        let back: OrderRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, back);
        // Optional fields are omitted, not null.
        assert!(!json.contains("filled_at"));
        assert!(json.contains("transaction_type"));
    }
}
