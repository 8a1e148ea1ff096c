//! Trait seams between the supervisor and the outside world.
//!
//! The supervisor only ever talks to these traits; the concrete clients from
//! `updown-market` implement them, and the integration tests drive full ticks
//! against in-memory mocks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use updown_common::{Market, OrderSide, TickSize};
use updown_market::clob::{BalanceAllowanceParams, OpenOrderParams, OrderType};
use updown_market::{ChainClient, ChainError, ClobClient, ClobError};
use updown_market::{DataApiClient, DataApiError, Discovery, UserPosition};

/// Best bid/ask of one token's book.
#[derive(Debug, Clone, Copy, Default)]
pub struct BookTop {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
}

/// Remote view of one order, as reported by the exchange.
#[derive(Debug, Clone)]
pub struct RemoteOrder {
    /// Raw status string (`LIVE`, `MATCHED`, `CANCELLED`, ...).
    pub status: String,
    pub size_matched: Decimal,
    pub original_size: Decimal,
}

/// One live order from the exchange's open-order listing.
#[derive(Debug, Clone)]
pub struct OpenOrderInfo {
    pub id: String,
    pub condition_id: String,
    pub token_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
}

/// Inputs for one order submission (GTC limit order).
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub token_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
}

/// Result of an order submission.
///
/// `Unconfirmed` covers the signed-but-not-visible window: the payload was
/// signed and transmitted, but the HTTP response failed, so the order may or
/// may not rest on the book. Post-submission verification settles it.
#[derive(Debug, Clone)]
pub enum OrderPlacement {
    Accepted { order_id: String },
    Unconfirmed { order_id: String, error: String },
}

impl OrderPlacement {
    pub fn order_id(&self) -> &str {
        match self {
            OrderPlacement::Accepted { order_id } => order_id,
            OrderPlacement::Unconfirmed { order_id, .. } => order_id,
        }
    }
}

/// Market discovery.
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Upcoming markets sorted by start time. Never fails as a whole.
    async fn discover(&self, now: DateTime<Utc>) -> Vec<Market>;
}

/// The CLOB operations the supervisor depends on.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Wallet address of the signing key, if one is configured.
    fn wallet_address(&self) -> Option<String>;

    /// Whether both auth layers are available for order submission.
    fn can_trade(&self) -> bool;

    /// Derive or create L2 credentials. Failing leaves the exchange in
    /// read-only mode; callers log and continue.
    async fn ensure_auth(&self) -> Result<(), ClobError>;

    async fn book_top(&self, token_id: &str) -> Result<BookTop, ClobError>;

    async fn tick_size(&self, token_id: &str) -> Result<TickSize, ClobError>;

    /// Sign and post a GTC order.
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderPlacement, ClobError>;

    async fn order_status(&self, order_id: &str) -> Result<RemoteOrder, ClobError>;

    /// Open orders, optionally filtered to one market.
    async fn open_orders(&self, condition_id: Option<&str>) -> Result<Vec<OpenOrderInfo>, ClobError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), ClobError>;

    /// Refresh the exchange-side collateral allowance cache. Best-effort.
    async fn update_balance_allowance(&self) -> Result<(), ClobError>;
}

/// The on-chain operations the supervisor depends on.
#[async_trait]
pub trait ChainApi: Send + Sync {
    fn wallet_address(&self) -> String;

    async fn usdc_balance(&self) -> Result<Decimal, ChainError>;

    /// Outcome-token balance in whole share units.
    async fn outcome_balance(&self, token_id: &str) -> Result<Decimal, ChainError>;

    /// Burn `units` matched share pairs back into collateral; returns the
    /// transaction hash, which may not be mined yet.
    async fn merge_positions(&self, condition_id: &str, units: Decimal) -> Result<String, ChainError>;

    async fn redeem_positions(&self, condition_id: &str) -> Result<String, ChainError>;
}

/// The Data API positions listing (advisory input to the redemption sweep).
#[async_trait]
pub trait PositionsApi: Send + Sync {
    async fn positions(&self, wallet: &str) -> Result<Vec<UserPosition>, DataApiError>;
}

// ----------------------------------------------------------------------
// Concrete implementations
// ----------------------------------------------------------------------

#[async_trait]
impl MarketSource for Discovery {
    async fn discover(&self, now: DateTime<Utc>) -> Vec<Market> {
        Discovery::discover(self, now).await
    }
}

#[async_trait]
impl ExchangeApi for ClobClient {
    fn wallet_address(&self) -> Option<String> {
        self.address().map(|a| format!("{a}"))
    }

    fn can_trade(&self) -> bool {
        self.address().is_some() && self.has_creds()
    }

    async fn ensure_auth(&self) -> Result<(), ClobError> {
        let creds = self.create_or_derive_api_creds(0).await?;
        if !creds.is_complete() {
            return Err(ClobError::AuthMissingL2);
        }
        self.set_creds(creds);
        Ok(())
    }

    async fn book_top(&self, token_id: &str) -> Result<BookTop, ClobError> {
        let book = self.get_order_book(token_id).await?;
        Ok(BookTop {
            best_bid: book.best_bid(),
            best_ask: book.best_ask(),
        })
    }

    async fn tick_size(&self, token_id: &str) -> Result<TickSize, ClobError> {
        self.get_tick_size(token_id).await
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderPlacement, ClobError> {
        let args = updown_market::OrderArgs::new(
            request.token_id.clone(),
            request.side,
            request.price,
            request.size,
        );
        let signed = self.create_order(&args).await?;
        if !self.has_creds() {
            // Never transmitted; not an "unconfirmed" order.
            return Err(ClobError::AuthMissingL2);
        }
        let salt_id = signed.salt.to_string();
        match self.post_order(&signed, OrderType::Gtc).await {
            Ok(response) => {
                let order_id = response
                    .order_id
                    .filter(|id| !id.is_empty())
                    .unwrap_or(salt_id);
                Ok(OrderPlacement::Accepted { order_id })
            }
            Err(ClobError::AuthMissingL2) => Err(ClobError::AuthMissingL2),
            Err(e) => Ok(OrderPlacement::Unconfirmed {
                order_id: salt_id,
                error: format!("API error (will verify): {e}"),
            }),
        }
    }

    async fn order_status(&self, order_id: &str) -> Result<RemoteOrder, ClobError> {
        let details = self.get_order(order_id).await?;
        Ok(RemoteOrder {
            status: details.status_upper(),
            size_matched: details.size_matched_decimal(),
            original_size: details.original_size_decimal(),
        })
    }

    async fn open_orders(&self, condition_id: Option<&str>) -> Result<Vec<OpenOrderInfo>, ClobError> {
        let params = OpenOrderParams {
            market: condition_id.map(str::to_string),
            asset_id: None,
        };
        let orders = self.get_orders(&params).await?;
        Ok(orders
            .into_iter()
            .map(|o| OpenOrderInfo {
                side: if o.is_sell() { OrderSide::Sell } else { OrderSide::Buy },
                price: o.price_decimal(),
                size: o.original_size_decimal(),
                id: o.id,
                condition_id: o.market,
                token_id: o.asset_id,
            })
            .collect())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), ClobError> {
        self.cancel(order_id).await
    }

    async fn update_balance_allowance(&self) -> Result<(), ClobError> {
        self.update_balance_allowance(&BalanceAllowanceParams::collateral())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChainApi for ChainClient {
    fn wallet_address(&self) -> String {
        format!("{}", self.address())
    }

    async fn usdc_balance(&self) -> Result<Decimal, ChainError> {
        ChainClient::usdc_balance(self).await
    }

    async fn outcome_balance(&self, token_id: &str) -> Result<Decimal, ChainError> {
        self.erc1155_balance_of(token_id).await
    }

    async fn merge_positions(&self, condition_id: &str, units: Decimal) -> Result<String, ChainError> {
        let hash = ChainClient::merge_positions(self, condition_id, units).await?;
        Ok(format!("{hash}"))
    }

    async fn redeem_positions(&self, condition_id: &str) -> Result<String, ChainError> {
        let hash = ChainClient::redeem_positions(self, condition_id).await?;
        Ok(format!("{hash}"))
    }
}

#[async_trait]
impl PositionsApi for DataApiClient {
    async fn positions(&self, wallet: &str) -> Result<Vec<UserPosition>, DataApiError> {
        DataApiClient::positions(self, wallet).await
    }
}
