//! Exchange order construction: amount rounding and EIP-712 signing.
//!
//! Maker/taker amounts follow the reference order utils: BUY makes USDC and
//! takes shares, SELL makes shares and takes USDC, both scaled to 6 token
//! decimals. Amount precision is bounded per tick size; overlong products are
//! rounded up at `amount_dp + 4` first, then truncated.

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::json;

use updown_common::{price::round_away, OrderSide, TickSize};

use crate::auth::{sign_typed_data, AuthError};

const EXCHANGE_DOMAIN_NAME: &str = "Polymarket CTF Exchange";
const EXCHANGE_DOMAIN_VERSION: &str = "1";

/// Numeric side encoding used by the exchange contract.
pub const SIDE_BUY: u8 = 0;
pub const SIDE_SELL: u8 = 1;

/// Maker/taker amounts for one order, in 6-decimal token units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderAmounts {
    pub side: u8,
    pub maker_amount: u64,
    pub taker_amount: u64,
}

/// Compute maker/taker amounts for a priced order.
///
/// `price` must already be on the tick grid; `size` is rounded down to two
/// decimal places before the product is formed.
pub fn build_amounts(side: OrderSide, size: Decimal, price: Decimal, tick: TickSize) -> OrderAmounts {
    let price_dp = tick.price_decimals();
    let amount_dp = tick.amount_decimals();
    let raw_price = round_away(price, price_dp);

    let (shares, usd) = {
        let shares = size.round_dp_with_strategy(2, RoundingStrategy::ToZero);
        let usd = bound_amount(shares * raw_price, amount_dp);
        (shares, usd)
    };

    match side {
        OrderSide::Buy => OrderAmounts {
            side: SIDE_BUY,
            maker_amount: to_token_decimals(usd),
            taker_amount: to_token_decimals(shares),
        },
        OrderSide::Sell => OrderAmounts {
            side: SIDE_SELL,
            maker_amount: to_token_decimals(shares),
            taker_amount: to_token_decimals(usd),
        },
    }
}

/// Clamp an amount product to the per-tick precision budget.
fn bound_amount(amount: Decimal, amount_dp: u32) -> Decimal {
    if decimal_places(amount) <= amount_dp {
        return amount;
    }
    let up = amount.round_dp_with_strategy(amount_dp + 4, RoundingStrategy::AwayFromZero);
    if decimal_places(up) <= amount_dp {
        up
    } else {
        up.round_dp_with_strategy(amount_dp, RoundingStrategy::ToZero)
    }
}

fn decimal_places(value: Decimal) -> u32 {
    value.normalize().scale()
}

/// Scale a decimal amount to 6 token decimals, rounding to the nearest unit.
pub fn to_token_decimals(value: Decimal) -> u64 {
    let scaled = round_away(value * dec!(1_000_000), 0);
    if scaled.is_sign_negative() {
        return 0;
    }
    scaled.try_into().unwrap_or(0)
}

/// A 32-bit random salt, matching the reference client's range.
pub fn generate_salt() -> u64 {
    rand::thread_rng().gen::<u32>() as u64
}

/// All fields of an exchange order prior to signing.
#[derive(Debug, Clone)]
pub struct UnsignedOrder {
    pub salt: u64,
    pub maker: Address,
    pub signer: Address,
    pub taker: Address,
    pub token_id: String,
    pub maker_amount: u64,
    pub taker_amount: u64,
    pub expiration: u64,
    pub nonce: u64,
    pub fee_rate_bps: u32,
    pub side: u8,
    pub signature_type: u8,
}

/// A signed exchange order in the wire layout expected by `POST /order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedOrder {
    pub salt: u64,
    pub maker: String,
    pub signer: String,
    pub taker: String,
    #[serde(rename = "tokenId")]
    pub token_id: String,
    #[serde(rename = "makerAmount")]
    pub maker_amount: String,
    #[serde(rename = "takerAmount")]
    pub taker_amount: String,
    pub expiration: String,
    pub nonce: String,
    #[serde(rename = "feeRateBps")]
    pub fee_rate_bps: String,
    pub side: String,
    #[serde(rename = "signatureType")]
    pub signature_type: u8,
    pub signature: String,
}

impl SignedOrder {
    /// Body of `POST /order`, owned by the L2 api key.
    pub fn post_body(&self, owner: &str, order_type: &str) -> serde_json::Value {
        json!({
            "order": self,
            "owner": owner,
            "orderType": order_type,
        })
    }
}

/// The EIP-712 payload for an exchange order.
fn order_typed_data(chain_id: u64, exchange: Address, order: &UnsignedOrder) -> serde_json::Value {
    json!({
        "types": {
            "EIP712Domain": [
                {"name": "name", "type": "string"},
                {"name": "version", "type": "string"},
                {"name": "chainId", "type": "uint256"},
                {"name": "verifyingContract", "type": "address"},
            ],
            "Order": [
                {"name": "salt", "type": "uint256"},
                {"name": "maker", "type": "address"},
                {"name": "signer", "type": "address"},
                {"name": "taker", "type": "address"},
                {"name": "tokenId", "type": "uint256"},
                {"name": "makerAmount", "type": "uint256"},
                {"name": "takerAmount", "type": "uint256"},
                {"name": "expiration", "type": "uint256"},
                {"name": "nonce", "type": "uint256"},
                {"name": "feeRateBps", "type": "uint256"},
                {"name": "side", "type": "uint8"},
                {"name": "signatureType", "type": "uint8"},
            ],
        },
        "primaryType": "Order",
        "domain": {
            "name": EXCHANGE_DOMAIN_NAME,
            "version": EXCHANGE_DOMAIN_VERSION,
            "chainId": chain_id,
            "verifyingContract": format!("{exchange}"),
        },
        "message": {
            "salt": order.salt.to_string(),
            "maker": format!("{}", order.maker),
            "signer": format!("{}", order.signer),
            "taker": format!("{}", order.taker),
            "tokenId": order.token_id.clone(),
            "makerAmount": order.maker_amount.to_string(),
            "takerAmount": order.taker_amount.to_string(),
            "expiration": order.expiration.to_string(),
            "nonce": order.nonce.to_string(),
            "feeRateBps": order.fee_rate_bps.to_string(),
            "side": order.side,
            "signatureType": order.signature_type,
        },
    })
}

/// The digest a signer commits to for this order.
pub fn order_signing_hash(
    chain_id: u64,
    exchange: Address,
    order: &UnsignedOrder,
) -> Result<B256, AuthError> {
    let typed: alloy::dyn_abi::eip712::TypedData =
        serde_json::from_value(order_typed_data(chain_id, exchange, order))
            .map_err(|e| AuthError::Hashing(e.to_string()))?;
    typed
        .eip712_signing_hash()
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Sign an order against the exchange contract's EIP-712 domain.
pub fn sign_order(
    signer: &PrivateKeySigner,
    chain_id: u64,
    exchange: Address,
    order: &UnsignedOrder,
) -> Result<SignedOrder, AuthError> {
    let signature = sign_typed_data(signer, order_typed_data(chain_id, exchange, order))?;
    Ok(SignedOrder {
        salt: order.salt,
        maker: format!("{}", order.maker),
        signer: format!("{}", order.signer),
        taker: format!("{}", order.taker),
        token_id: order.token_id.clone(),
        maker_amount: order.maker_amount.to_string(),
        taker_amount: order.taker_amount.to_string(),
        expiration: order.expiration.to_string(),
        nonce: order.nonce.to_string(),
        fee_rate_bps: order.fee_rate_bps.to_string(),
        side: if order.side == SIDE_SELL { "SELL".into() } else { "BUY".into() },
        signature_type: order.signature_type,
        signature,
    })
}
