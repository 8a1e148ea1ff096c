//! Wire types for the Gamma, CLOB and Data APIs.
//!
//! Upstream JSON is dynamically typed (numbers arrive as strings, arrays as
//! JSON-encoded strings). Everything is normalised into these structs at the
//! edge; untyped `serde_json::Value`s never travel further into the bot.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Wallet signature scheme used for CLOB order signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureType {
    #[default]
    Eoa,
    PolyProxy,
    PolyGnosisSafe,
}

impl SignatureType {
    /// Parse the configuration string; unknown values fall back to EOA.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "POLY_PROXY" => SignatureType::PolyProxy,
            "POLY_GNOSIS_SAFE" => SignatureType::PolyGnosisSafe,
            _ => SignatureType::Eoa,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            SignatureType::Eoa => 0,
            SignatureType::PolyProxy => 1,
            SignatureType::PolyGnosisSafe => 2,
        }
    }
}

/// L2 API credentials for the CLOB.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiCreds {
    #[serde(rename = "apiKey", default)]
    pub api_key: String,
    #[serde(rename = "secret", default)]
    pub api_secret: String,
    #[serde(rename = "passphrase", default)]
    pub api_passphrase: String,
}

impl ApiCreds {
    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

/// One price level of an order book (prices arrive as strings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: String,
    pub size: String,
}

impl BookLevel {
    pub fn price_decimal(&self) -> Option<Decimal> {
        self.price.trim().parse().ok()
    }

    pub fn size_decimal(&self) -> Option<Decimal> {
        self.size.trim().parse().ok()
    }
}

/// Order book summary from `GET /book`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderBookSummary {
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
    #[serde(default)]
    pub min_order_size: Option<String>,
    #[serde(default)]
    pub tick_size: Option<String>,
    #[serde(default)]
    pub neg_risk: Option<bool>,
}

impl OrderBookSummary {
    /// Best bid, taken from the head of the bid levels.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().and_then(BookLevel::price_decimal)
    }

    /// Best ask, taken from the head of the ask levels.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().and_then(BookLevel::price_decimal)
    }
}

/// Single-order details from `GET /data/order/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderDetails {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub size_matched: Option<String>,
    #[serde(default)]
    pub original_size: Option<String>,
}

impl OrderDetails {
    pub fn status_upper(&self) -> String {
        self.status.trim().to_ascii_uppercase()
    }

    pub fn size_matched_decimal(&self) -> Decimal {
        parse_decimal_or_zero(self.size_matched.as_deref())
    }

    pub fn original_size_decimal(&self) -> Decimal {
        parse_decimal_or_zero(self.original_size.as_deref())
    }
}

/// One open order from the paginated `GET /data/orders` listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenOrder {
    #[serde(default)]
    pub id: String,
    /// Condition id of the market this order rests on.
    #[serde(default)]
    pub market: String,
    #[serde(default)]
    pub asset_id: String,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub original_size: Option<String>,
    #[serde(default)]
    pub size_matched: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
}

impl OpenOrder {
    pub fn price_decimal(&self) -> Decimal {
        parse_decimal_or_zero(self.price.as_deref())
    }

    pub fn original_size_decimal(&self) -> Decimal {
        parse_decimal_or_zero(self.original_size.as_deref())
    }

    pub fn size_matched_decimal(&self) -> Decimal {
        parse_decimal_or_zero(self.size_matched.as_deref())
    }

    pub fn is_sell(&self) -> bool {
        self.side.trim().eq_ignore_ascii_case("SELL")
    }
}

/// Page envelope for `GET /data/orders`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenOrdersPage {
    #[serde(default)]
    pub data: Vec<OpenOrder>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Response body of `POST /order`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostOrderResponse {
    #[serde(rename = "orderID", default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(rename = "errorMsg", default)]
    pub error_msg: Option<String>,
}

/// One event from `GET {gamma}/events?slug=...`.
///
/// Gamma nests the actual market inside `markets[]`; top-level fields are a
/// fallback for responses that inline the market.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GammaEvent {
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "conditionId", default)]
    pub condition_id: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(rename = "startDate", default)]
    pub start_date: Option<String>,
    #[serde(rename = "endDate", default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub closed: Option<bool>,
    #[serde(default)]
    pub resolved: Option<bool>,
    #[serde(default)]
    pub markets: Option<Vec<GammaMarket>>,
    #[serde(default)]
    pub tokens: Option<Vec<GammaToken>>,
}

/// One market nested inside a Gamma event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GammaMarket {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(rename = "conditionId", default)]
    pub condition_id: Option<String>,
    /// JSON-string-encoded array of token ids, e.g. `"[\"123\", \"456\"]"`.
    #[serde(rename = "clobTokenIds", default)]
    pub clob_token_ids: Option<serde_json::Value>,
    /// JSON-string-encoded array of outcome names.
    #[serde(default)]
    pub outcomes: Option<serde_json::Value>,
    #[serde(rename = "startDate", default)]
    pub start_date: Option<String>,
    #[serde(rename = "endDate", default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub tokens: Option<Vec<GammaToken>>,
}

/// Token entry in the legacy `tokens` fallback field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GammaToken {
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
}

/// Decode a Gamma field that is either a JSON array or a string containing
/// JSON-encoded array of strings.
pub fn decode_string_array(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::String(s) => {
            serde_json::from_str::<Vec<serde_json::Value>>(s)
                .map(|vals| vals.iter().map(json_to_string).collect())
                .unwrap_or_default()
        }
        serde_json::Value::Array(vals) => vals.iter().map(json_to_string).collect(),
        _ => Vec::new(),
    }
}

fn json_to_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_decimal_or_zero(s: Option<&str>) -> Decimal {
    s.and_then(|v| v.trim().parse().ok()).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_signature_type_parse() {
        assert_eq!(SignatureType::parse("EOA"), SignatureType::Eoa);
        assert_eq!(SignatureType::parse("poly_proxy"), SignatureType::PolyProxy);
        assert_eq!(
            SignatureType::parse("POLY_GNOSIS_SAFE"),
            SignatureType::PolyGnosisSafe
        );
        assert_eq!(SignatureType::parse("bogus"), SignatureType::Eoa);
        assert_eq!(SignatureType::PolyGnosisSafe.as_u8(), 2);
    }

    #[test]
    fn test_orderbook_parsing() {
        let json = r#"{
            "market": "0xc0ffee",
            "asset_id": "123",
            "bids": [{"price": "0.50", "size": "120"}],
            "asks": [{"price": "0.52", "size": "80"}],
            "tick_size": "0.01",
            "neg_risk": false
        }"#;
        let book: OrderBookSummary = serde_json::from_str(json).unwrap();
        assert_eq!(book.best_bid(), Some(dec!(0.50)));
        assert_eq!(book.best_ask(), Some(dec!(0.52)));
        assert_eq!(book.tick_size.as_deref(), Some("0.01"));
    }

    #[test]
    fn test_orderbook_empty_sides() {
        let book: OrderBookSummary = serde_json::from_str(r#"{"bids": [], "asks": []}"#).unwrap();
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn test_order_details_accessors() {
        let json = r#"{"id": "o1", "status": "live", "size_matched": "3.5", "original_size": "10"}"#;
        let details: OrderDetails = serde_json::from_str(json).unwrap();
        assert_eq!(details.status_upper(), "LIVE");
        assert_eq!(details.size_matched_decimal(), dec!(3.5));
        assert_eq!(details.original_size_decimal(), dec!(10));
    }

    #[test]
    fn test_order_details_missing_fields() {
        let details: OrderDetails = serde_json::from_str(r#"{"status": "CANCELLED"}"#).unwrap();
        assert_eq!(details.size_matched_decimal(), Decimal::ZERO);
        assert_eq!(details.original_size_decimal(), Decimal::ZERO);
    }

    #[test]
    fn test_decode_string_array_variants() {
        let embedded: serde_json::Value = serde_json::json!("[\"111\", \"222\"]");
        assert_eq!(decode_string_array(&embedded), vec!["111", "222"]);

        let plain: serde_json::Value = serde_json::json!(["Up", "Down"]);
        assert_eq!(decode_string_array(&plain), vec!["Up", "Down"]);

        let garbage: serde_json::Value = serde_json::json!(42);
        assert!(decode_string_array(&garbage).is_empty());
    }

    #[test]
    fn test_gamma_event_parsing() {
        let json = r#"[{
            "slug": "btc-updown-15m-1735689600",
            "title": "Bitcoin Up or Down?",
            "active": true,
            "closed": false,
            "markets": [{
                "question": "Bitcoin Up or Down - Jan 1, 12:00 AM ET",
                "conditionId": "0xc0ffee",
                "clobTokenIds": "[\"111\", \"222\"]",
                "outcomes": "[\"Up\", \"Down\"]"
            }]
        }]"#;
        let events: Vec<GammaEvent> = serde_json::from_str(json).unwrap();
        let markets = events[0].markets.as_ref().unwrap();
        assert_eq!(markets[0].condition_id.as_deref(), Some("0xc0ffee"));
        let tokens = decode_string_array(markets[0].clob_token_ids.as_ref().unwrap());
        assert_eq!(tokens, vec!["111", "222"]);
    }
}
