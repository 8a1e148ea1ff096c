//! Polymarket CLOB client.
//!
//! Carries both auth layers (wallet key for signing, derived API creds for
//! authenticated data endpoints) plus small per-token caches for tick size,
//! neg-risk flag and fee rate, which are immutable for a market's lifetime.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use chrono::Utc;
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use updown_common::{OrderSide, TickSize};

use crate::auth::{
    hmac_signature, sign_clob_auth, AuthError, HEADER_POLY_ADDRESS, HEADER_POLY_API_KEY,
    HEADER_POLY_NONCE, HEADER_POLY_PASSPHRASE, HEADER_POLY_SIGNATURE, HEADER_POLY_TIMESTAMP,
};
use crate::contracts::contract_config;
use crate::order_builder::{build_amounts, generate_salt, sign_order, SignedOrder, UnsignedOrder};
use crate::types::{
    ApiCreds, OpenOrder, OpenOrdersPage, OrderBookSummary, OrderDetails, PostOrderResponse,
    SignatureType,
};

const ENDPOINT_CREATE_API_KEY: &str = "/auth/api-key";
const ENDPOINT_DERIVE_API_KEY: &str = "/auth/derive-api-key";
const ENDPOINT_BOOK: &str = "/book";
const ENDPOINT_TICK_SIZE: &str = "/tick-size";
const ENDPOINT_NEG_RISK: &str = "/neg-risk";
const ENDPOINT_FEE_RATE: &str = "/fee-rate";
const ENDPOINT_ORDER: &str = "/order";
const ENDPOINT_ORDERS: &str = "/data/orders";
const ENDPOINT_ORDER_PREFIX: &str = "/data/order/";
const ENDPOINT_BALANCE_ALLOWANCE: &str = "/balance-allowance";
const ENDPOINT_BALANCE_ALLOWANCE_UPDATE: &str = "/balance-allowance/update";

const CURSOR_START: &str = "MA==";
const CURSOR_END: &str = "LTE=";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Time-in-force for a posted order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderType {
    #[default]
    Gtc,
    Fok,
    Gtd,
    Fak,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Gtc => "GTC",
            OrderType::Fok => "FOK",
            OrderType::Gtd => "GTD",
            OrderType::Fak => "FAK",
        }
    }
}

/// Inputs to build one limit order.
#[derive(Debug, Clone)]
pub struct OrderArgs {
    pub token_id: String,
    pub price: Decimal,
    pub size: Decimal,
    pub side: OrderSide,
    pub fee_rate_bps: u32,
    pub nonce: u64,
    pub expiration: u64,
    pub taker: Option<String>,
}

impl OrderArgs {
    pub fn new(token_id: impl Into<String>, side: OrderSide, price: Decimal, size: Decimal) -> Self {
        Self {
            token_id: token_id.into(),
            price,
            size,
            side,
            fee_rate_bps: 0,
            nonce: 0,
            expiration: 0,
            taker: None,
        }
    }
}

/// Filters for the open-orders listing.
#[derive(Debug, Clone, Default)]
pub struct OpenOrderParams {
    pub market: Option<String>,
    pub asset_id: Option<String>,
}

/// Parameters for the balance-allowance endpoints.
#[derive(Debug, Clone, Default)]
pub struct BalanceAllowanceParams {
    pub asset_type: String,
    pub token_id: Option<String>,
    pub signature_type: Option<u8>,
}

impl BalanceAllowanceParams {
    pub fn collateral() -> Self {
        Self {
            asset_type: "COLLATERAL".to_string(),
            token_id: None,
            signature_type: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClobError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CLOB API error: status {status}, body: {body}")]
    Api { status: u16, body: String },

    #[error("JSON parsing failed: {0}")]
    Json(String),

    #[error("invalid price {price}: allowed range is [{min}, {max}] on the {tick} grid")]
    InvalidPrice {
        price: Decimal,
        min: Decimal,
        max: Decimal,
        tick: TickSize,
    },

    #[error("unsupported tick size: {0}")]
    UnsupportedTick(String),

    #[error("invalid user provided fee rate {given}; market fee rate is {required}")]
    FeeMismatch { given: u32, required: u32 },

    #[error("a private key is needed to interact with this endpoint")]
    AuthMissingL1,

    #[error("API credentials are needed to interact with this endpoint")]
    AuthMissingL2,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("unsupported chain id: {0}")]
    UnsupportedChain(u64),
}

/// CLOB exchange client.
pub struct ClobClient {
    http: Client,
    host: String,
    chain_id: u64,
    signer: Option<PrivateKeySigner>,
    signature_type: SignatureType,
    funder: Option<Address>,
    creds: RwLock<Option<ApiCreds>>,
    tick_cache: RwLock<HashMap<String, TickSize>>,
    neg_risk_cache: RwLock<HashMap<String, bool>>,
    fee_cache: RwLock<HashMap<String, u32>>,
}

impl ClobClient {
    /// Create a client. The private key is optional: without it the client
    /// can still read public market data (books, ticks).
    pub fn new(
        host: impl Into<String>,
        chain_id: u64,
        private_key: Option<&str>,
        signature_type: SignatureType,
        funder: Option<&str>,
    ) -> Result<Self, ClobError> {
        let signer = match private_key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => {
                let normalized = format!("0x{}", key.trim_start_matches("0x"));
                let signer: PrivateKeySigner = normalized
                    .parse()
                    .map_err(|e| ClobError::Json(format!("invalid private key: {e}")))?;
                Some(signer)
            }
            None => None,
        };

        let funder = match funder.map(str::trim).filter(|f| !f.is_empty()) {
            Some(f) => Some(
                f.parse::<Address>()
                    .map_err(|e| ClobError::Json(format!("invalid funder address: {e}")))?,
            ),
            None => signer.as_ref().map(|s| s.address()),
        };

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Ok(Self {
            http,
            host: host.into().trim_end_matches('/').to_string(),
            chain_id,
            signer,
            signature_type,
            funder,
            creds: RwLock::new(None),
            tick_cache: RwLock::new(HashMap::new()),
            neg_risk_cache: RwLock::new(HashMap::new()),
            fee_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Wallet address of the signing key, if one was provided.
    pub fn address(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    pub fn set_creds(&self, creds: ApiCreds) {
        if let Ok(mut slot) = self.creds.write() {
            *slot = Some(creds);
        }
    }

    pub fn has_creds(&self) -> bool {
        self.creds
            .read()
            .map(|c| c.as_ref().is_some_and(ApiCreds::is_complete))
            .unwrap_or(false)
    }

    fn creds_snapshot(&self) -> Result<ApiCreds, ClobError> {
        self.creds
            .read()
            .ok()
            .and_then(|c| c.clone())
            .filter(ApiCreds::is_complete)
            .ok_or(ClobError::AuthMissingL2)
    }

    fn signer_ref(&self) -> Result<&PrivateKeySigner, ClobError> {
        self.signer.as_ref().ok_or(ClobError::AuthMissingL1)
    }

    // ------------------------------------------------------------------
    // Auth
    // ------------------------------------------------------------------

    fn l1_headers(&self, nonce: u64) -> Result<Vec<(String, String)>, ClobError> {
        let signer = self.signer_ref()?;
        let ts = Utc::now().timestamp();
        let sig = sign_clob_auth(signer, self.chain_id, ts, nonce)?;
        Ok(vec![
            (HEADER_POLY_ADDRESS.into(), format!("{}", signer.address())),
            (HEADER_POLY_SIGNATURE.into(), sig),
            (HEADER_POLY_TIMESTAMP.into(), ts.to_string()),
            (HEADER_POLY_NONCE.into(), nonce.to_string()),
        ])
    }

    fn l2_headers(
        &self,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<Vec<(String, String)>, ClobError> {
        let signer = self.signer_ref()?;
        let creds = self.creds_snapshot()?;
        let ts = Utc::now().timestamp();
        let sig = hmac_signature(&creds.api_secret, ts, method, path, body)?;
        Ok(vec![
            (HEADER_POLY_ADDRESS.into(), format!("{}", signer.address())),
            (HEADER_POLY_SIGNATURE.into(), sig),
            (HEADER_POLY_TIMESTAMP.into(), ts.to_string()),
            (HEADER_POLY_API_KEY.into(), creds.api_key),
            (HEADER_POLY_PASSPHRASE.into(), creds.api_passphrase),
        ])
    }

    /// Create API creds, falling back to deriving existing ones.
    pub async fn create_or_derive_api_creds(&self, nonce: u64) -> Result<ApiCreds, ClobError> {
        match self.create_api_key(nonce).await {
            Ok(creds) => Ok(creds),
            Err(_) => self.derive_api_key(nonce).await,
        }
    }

    pub async fn create_api_key(&self, nonce: u64) -> Result<ApiCreds, ClobError> {
        let headers = self.l1_headers(nonce)?;
        let value = self
            .request(Method::POST, ENDPOINT_CREATE_API_KEY, "", headers, None)
            .await?;
        serde_json::from_value(value).map_err(|e| ClobError::Json(e.to_string()))
    }

    pub async fn derive_api_key(&self, nonce: u64) -> Result<ApiCreds, ClobError> {
        let headers = self.l1_headers(nonce)?;
        let value = self
            .request(Method::GET, ENDPOINT_DERIVE_API_KEY, "", headers, None)
            .await?;
        serde_json::from_value(value).map_err(|e| ClobError::Json(e.to_string()))
    }

    // ------------------------------------------------------------------
    // Public market data
    // ------------------------------------------------------------------

    pub async fn get_order_book(&self, token_id: &str) -> Result<OrderBookSummary, ClobError> {
        let query = format!("?token_id={token_id}");
        let value = self
            .request(Method::GET, ENDPOINT_BOOK, &query, Vec::new(), None)
            .await?;
        serde_json::from_value(value).map_err(|e| ClobError::Json(e.to_string()))
    }

    pub async fn get_tick_size(&self, token_id: &str) -> Result<TickSize, ClobError> {
        if let Ok(cache) = self.tick_cache.read() {
            if let Some(&tick) = cache.get(token_id) {
                return Ok(tick);
            }
        }
        let query = format!("?token_id={token_id}");
        let value = self
            .request(Method::GET, ENDPOINT_TICK_SIZE, &query, Vec::new(), None)
            .await?;
        let raw = stringify_field(&value, "minimum_tick_size");
        let tick = TickSize::parse(&raw).ok_or(ClobError::UnsupportedTick(raw))?;
        if let Ok(mut cache) = self.tick_cache.write() {
            cache.insert(token_id.to_string(), tick);
        }
        Ok(tick)
    }

    pub async fn get_neg_risk(&self, token_id: &str) -> Result<bool, ClobError> {
        if let Ok(cache) = self.neg_risk_cache.read() {
            if let Some(&v) = cache.get(token_id) {
                return Ok(v);
            }
        }
        let query = format!("?token_id={token_id}");
        let value = self
            .request(Method::GET, ENDPOINT_NEG_RISK, &query, Vec::new(), None)
            .await?;
        let neg_risk = value
            .get("neg_risk")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if let Ok(mut cache) = self.neg_risk_cache.write() {
            cache.insert(token_id.to_string(), neg_risk);
        }
        Ok(neg_risk)
    }

    pub async fn get_fee_rate_bps(&self, token_id: &str) -> Result<u32, ClobError> {
        if let Ok(cache) = self.fee_cache.read() {
            if let Some(&v) = cache.get(token_id) {
                return Ok(v);
            }
        }
        let query = format!("?token_id={token_id}");
        let value = self
            .request(Method::GET, ENDPOINT_FEE_RATE, &query, Vec::new(), None)
            .await?;
        let fee = value
            .get("base_fee")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32;
        if let Ok(mut cache) = self.fee_cache.write() {
            cache.insert(token_id.to_string(), fee);
        }
        Ok(fee)
    }

    // ------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------

    /// Build and sign an order. Price must already be tick-snapped; an
    /// off-grid or out-of-range price is rejected here before signing.
    pub async fn create_order(&self, args: &OrderArgs) -> Result<SignedOrder, ClobError> {
        let signer = self.signer_ref()?;

        let tick = self.get_tick_size(&args.token_id).await?;
        if !tick.price_valid(args.price) {
            return Err(ClobError::InvalidPrice {
                price: args.price,
                min: tick.as_decimal(),
                max: Decimal::ONE - tick.as_decimal(),
                tick,
            });
        }

        let neg_risk = self.get_neg_risk(&args.token_id).await?;
        let market_fee = self.get_fee_rate_bps(&args.token_id).await?;
        if args.fee_rate_bps > 0 && market_fee > 0 && args.fee_rate_bps != market_fee {
            return Err(ClobError::FeeMismatch {
                given: args.fee_rate_bps,
                required: market_fee,
            });
        }

        let amounts = build_amounts(args.side, args.size, args.price, tick);
        let contract = contract_config(self.chain_id, neg_risk)
            .map_err(|e| ClobError::UnsupportedChain(e.0))?;

        let taker = match args.taker.as_deref().filter(|t| !t.is_empty()) {
            Some(t) => t
                .parse::<Address>()
                .map_err(|e| ClobError::Json(format!("invalid taker address: {e}")))?,
            None => Address::ZERO,
        };

        let unsigned = UnsignedOrder {
            salt: generate_salt(),
            maker: self.funder.unwrap_or_else(|| signer.address()),
            signer: signer.address(),
            taker,
            token_id: args.token_id.clone(),
            maker_amount: amounts.maker_amount,
            taker_amount: amounts.taker_amount,
            expiration: args.expiration,
            nonce: args.nonce,
            fee_rate_bps: market_fee,
            side: amounts.side,
            signature_type: self.signature_type.as_u8(),
        };
        debug!(
            token_id = %args.token_id,
            side = %args.side,
            price = %args.price,
            size = %args.size,
            salt = unsigned.salt,
            "Signing order"
        );

        Ok(sign_order(signer, self.chain_id, contract.exchange, &unsigned)?)
    }

    /// Post a signed order. The serialized body is the exact byte sequence
    /// the L2 signature commits to.
    pub async fn post_order(
        &self,
        order: &SignedOrder,
        order_type: OrderType,
    ) -> Result<PostOrderResponse, ClobError> {
        let creds = self.creds_snapshot()?;
        let body = order.post_body(&creds.api_key, order_type.as_str()).to_string();
        let headers = self.l2_headers("POST", ENDPOINT_ORDER, &body)?;
        let value = self
            .request(Method::POST, ENDPOINT_ORDER, "", headers, Some(body))
            .await?;
        serde_json::from_value(value).map_err(|e| ClobError::Json(e.to_string()))
    }

    pub async fn get_order(&self, order_id: &str) -> Result<OrderDetails, ClobError> {
        let path = format!("{ENDPOINT_ORDER_PREFIX}{order_id}");
        let headers = self.l2_headers("GET", &path, "")?;
        let value = self.request(Method::GET, &path, "", headers, None).await?;
        serde_json::from_value(value).map_err(|e| ClobError::Json(e.to_string()))
    }

    /// List open orders, walking the cursor pagination to completion.
    pub async fn get_orders(&self, params: &OpenOrderParams) -> Result<Vec<OpenOrder>, ClobError> {
        let headers = self.l2_headers("GET", ENDPOINT_ORDERS, "")?;

        let mut out = Vec::new();
        let mut cursor = CURSOR_START.to_string();
        while cursor != CURSOR_END {
            let mut query = format!("?next_cursor={}", urlencode(&cursor));
            if let Some(market) = params.market.as_deref().filter(|m| !m.is_empty()) {
                query.push_str(&format!("&market={market}"));
            }
            if let Some(asset) = params.asset_id.as_deref().filter(|a| !a.is_empty()) {
                query.push_str(&format!("&asset_id={asset}"));
            }
            let value = self
                .request(Method::GET, ENDPOINT_ORDERS, &query, headers.clone(), None)
                .await?;
            let page: OpenOrdersPage =
                serde_json::from_value(value).map_err(|e| ClobError::Json(e.to_string()))?;
            out.extend(page.data);
            cursor = match page.next_cursor {
                Some(next) if !next.is_empty() => next,
                _ => CURSOR_END.to_string(),
            };
        }
        Ok(out)
    }

    /// Cancel an order. Idempotent: cancelling an already-dead order is not
    /// an error at this layer.
    pub async fn cancel(&self, order_id: &str) -> Result<(), ClobError> {
        let body = serde_json::json!({ "orderID": order_id }).to_string();
        let headers = self.l2_headers("DELETE", ENDPOINT_ORDER, &body)?;
        self.request(Method::DELETE, ENDPOINT_ORDER, "", headers, Some(body))
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Balance allowance
    // ------------------------------------------------------------------

    pub async fn get_balance_allowance(
        &self,
        params: &BalanceAllowanceParams,
    ) -> Result<serde_json::Value, ClobError> {
        let query = self.balance_allowance_query(params);
        let headers = self.l2_headers("GET", ENDPOINT_BALANCE_ALLOWANCE, "")?;
        self.request(Method::GET, ENDPOINT_BALANCE_ALLOWANCE, &query, headers, None)
            .await
    }

    pub async fn update_balance_allowance(
        &self,
        params: &BalanceAllowanceParams,
    ) -> Result<serde_json::Value, ClobError> {
        let query = self.balance_allowance_query(params);
        let headers = self.l2_headers("GET", ENDPOINT_BALANCE_ALLOWANCE_UPDATE, "")?;
        self.request(
            Method::GET,
            ENDPOINT_BALANCE_ALLOWANCE_UPDATE,
            &query,
            headers,
            None,
        )
        .await
    }

    fn balance_allowance_query(&self, params: &BalanceAllowanceParams) -> String {
        let sig_type = params
            .signature_type
            .unwrap_or_else(|| self.signature_type.as_u8());
        let mut query = format!("?signature_type={sig_type}");
        if !params.asset_type.is_empty() {
            query.push_str(&format!("&asset_type={}", params.asset_type));
        }
        if let Some(token) = params.token_id.as_deref().filter(|t| !t.is_empty()) {
            query.push_str(&format!("&token_id={token}"));
        }
        query
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &str,
        headers: Vec<(String, String)>,
        body: Option<String>,
    ) -> Result<serde_json::Value, ClobError> {
        let url = format!("{}{}{}", self.host, path, query);
        let mut req = self
            .http
            .request(method, &url)
            .header("User-Agent", "updown-bot")
            .header("Accept", "*/*")
            .header("Content-Type", "application/json");
        for (k, v) in headers {
            req = req.header(k, v);
        }
        if let Some(body) = body {
            req = req.body(body);
        }

        let response = req.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClobError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|e| ClobError::Json(e.to_string()))
    }
}

/// Read a field that the API reports either as a string or a bare number.
fn stringify_field(value: &serde_json::Value, key: &str) -> String {
    match value.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn urlencode(s: &str) -> String {
    // Cursors are base64 and may carry '='.
    s.replace('=', "%3D")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn test_client() -> ClobClient {
        ClobClient::new(
            "https://clob.example.com/",
            137,
            Some(TEST_KEY),
            SignatureType::Eoa,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_new_normalises_key_and_host() {
        let client = test_client();
        assert!(client.address().is_some());
        assert_eq!(client.host, "https://clob.example.com");

        let bare_key = TEST_KEY.trim_start_matches("0x");
        let client2 = ClobClient::new(
            "https://clob.example.com",
            137,
            Some(bare_key),
            SignatureType::Eoa,
            None,
        )
        .unwrap();
        assert_eq!(client.address(), client2.address());
    }

    #[test]
    fn test_read_only_client_has_no_l2() {
        let client =
            ClobClient::new("https://clob.example.com", 137, None, SignatureType::Eoa, None)
                .unwrap();
        assert!(client.address().is_none());
        assert!(!client.has_creds());
        assert!(matches!(client.l1_headers(0), Err(ClobError::AuthMissingL1)));
    }

    #[test]
    fn test_l2_headers_require_creds() {
        let client = test_client();
        assert!(matches!(
            client.l2_headers("GET", "/data/orders", ""),
            Err(ClobError::AuthMissingL2)
        ));

        client.set_creds(ApiCreds {
            api_key: "key".into(),
            api_secret: base64::Engine::encode(
                &base64::engine::general_purpose::URL_SAFE,
                b"0123456789abcdef0123456789abcdef",
            ),
            api_passphrase: "pass".into(),
        });
        assert!(client.has_creds());
        let headers = client.l2_headers("GET", "/data/orders", "").unwrap();
        let names: Vec<&str> = headers.iter().map(|(k, _)| k.as_str()).collect();
        assert!(names.contains(&HEADER_POLY_API_KEY));
        assert!(names.contains(&HEADER_POLY_SIGNATURE));
        assert!(names.contains(&HEADER_POLY_PASSPHRASE));
    }

    #[test]
    fn test_incomplete_creds_do_not_count() {
        let client = test_client();
        client.set_creds(ApiCreds {
            api_key: "key".into(),
            api_secret: String::new(),
            api_passphrase: String::new(),
        });
        assert!(!client.has_creds());
    }

    #[test]
    fn test_balance_allowance_query() {
        let client = test_client();
        let q = client.balance_allowance_query(&BalanceAllowanceParams::collateral());
        assert_eq!(q, "?signature_type=0&asset_type=COLLATERAL");

        let q = client.balance_allowance_query(&BalanceAllowanceParams {
            asset_type: "CONDITIONAL".into(),
            token_id: Some("123".into()),
            signature_type: Some(2),
        });
        assert_eq!(q, "?signature_type=2&asset_type=CONDITIONAL&token_id=123");
    }

    #[test]
    fn test_stringify_field() {
        let v = serde_json::json!({"minimum_tick_size": 0.01});
        assert_eq!(stringify_field(&v, "minimum_tick_size"), "0.01");
        let v = serde_json::json!({"minimum_tick_size": "0.001"});
        assert_eq!(stringify_field(&v, "minimum_tick_size"), "0.001");
        assert_eq!(stringify_field(&v, "missing"), "");
    }

    #[test]
    fn test_order_args_default_shape() {
        let args = OrderArgs::new("123", OrderSide::Buy, dec!(0.49), dec!(20.41));
        assert_eq!(args.fee_rate_bps, 0);
        assert_eq!(args.expiration, 0);
        assert!(args.taker.is_none());
    }

    #[test]
    fn test_urlencode_cursor() {
        assert_eq!(urlencode("MA=="), "MA%3D%3D");
        assert_eq!(urlencode("LTE="), "LTE%3D");
    }
}
