//! CLOB authentication primitives.
//!
//! Two layers, matching the exchange's model:
//! - L1: an EIP-712 `ClobAuth` attestation signed with the wallet key, used
//!   to create or derive API credentials.
//! - L2: an HMAC-SHA256 signature over `timestamp + method + path + body`
//!   keyed with the (URL-safe base64) API secret, sent on every
//!   authenticated request.

use alloy::dyn_abi::eip712::TypedData;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const CLOB_AUTH_DOMAIN: &str = "ClobAuthDomain";
const CLOB_AUTH_VERSION: &str = "1";
const CLOB_AUTH_MESSAGE: &str = "This message attests that I control the given wallet";

/// Header names for CLOB authentication.
pub const HEADER_POLY_ADDRESS: &str = "POLY_ADDRESS";
pub const HEADER_POLY_SIGNATURE: &str = "POLY_SIGNATURE";
pub const HEADER_POLY_TIMESTAMP: &str = "POLY_TIMESTAMP";
pub const HEADER_POLY_NONCE: &str = "POLY_NONCE";
pub const HEADER_POLY_API_KEY: &str = "POLY_API_KEY";
pub const HEADER_POLY_PASSPHRASE: &str = "POLY_PASSPHRASE";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid API secret: {0}")]
    BadSecret(String),

    #[error("EIP-712 hashing failed: {0}")]
    Hashing(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Build the L2 HMAC signature for one request.
///
/// The secret is URL-safe base64; the result is URL-safe base64 as well.
/// Single quotes in the body are normalised to double quotes to match the
/// reference client's canonicalisation.
pub fn hmac_signature(
    secret: &str,
    timestamp: i64,
    method: &str,
    request_path: &str,
    body: &str,
) -> Result<String, AuthError> {
    let key = URL_SAFE
        .decode(secret)
        .map_err(|e| AuthError::BadSecret(e.to_string()))?;

    let mut message = format!("{timestamp}{method}{request_path}");
    if !body.is_empty() {
        message.push_str(&body.replace('\'', "\""));
    }

    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| AuthError::BadSecret(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
}

/// Sign the L1 `ClobAuth` attestation used by the api-key endpoints.
pub fn sign_clob_auth(
    signer: &PrivateKeySigner,
    chain_id: u64,
    timestamp: i64,
    nonce: u64,
) -> Result<String, AuthError> {
    let payload = json!({
        "types": {
            "EIP712Domain": [
                {"name": "name", "type": "string"},
                {"name": "version", "type": "string"},
                {"name": "chainId", "type": "uint256"},
            ],
            "ClobAuth": [
                {"name": "address", "type": "address"},
                {"name": "timestamp", "type": "string"},
                {"name": "nonce", "type": "uint256"},
                {"name": "message", "type": "string"},
            ],
        },
        "primaryType": "ClobAuth",
        "domain": {
            "name": CLOB_AUTH_DOMAIN,
            "version": CLOB_AUTH_VERSION,
            "chainId": chain_id,
        },
        "message": {
            "address": format!("{}", signer.address()),
            "timestamp": timestamp.to_string(),
            "nonce": nonce,
            "message": CLOB_AUTH_MESSAGE,
        },
    });

    sign_typed_data(signer, payload)
}

/// Hash and sign an EIP-712 payload, returning the 65-byte signature as
/// 0x-prefixed hex with `v` in `{27, 28}`.
pub fn sign_typed_data(
    signer: &PrivateKeySigner,
    payload: serde_json::Value,
) -> Result<String, AuthError> {
    let typed: TypedData =
        serde_json::from_value(payload).map_err(|e| AuthError::Hashing(e.to_string()))?;
    let hash = typed
        .eip712_signing_hash()
        .map_err(|e| AuthError::Hashing(e.to_string()))?;
    let signature = signer
        .sign_hash_sync(&hash)
        .map_err(|e| AuthError::Signing(e.to_string()))?;
    Ok(format!("0x{signature}"))
}
