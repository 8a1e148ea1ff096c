//! Polygon chain client.
//!
//! Reads balances and approvals, and submits the two CTF write paths the bot
//! needs: `mergePositions` (burn equal UP/DOWN shares back into collateral)
//! and `redeemPositions` (claim a resolved market's winning shares).
//!
//! Writes are sent with a timeout and the receipt wait is best-effort: an
//! unmined transaction still returns its hash and the caller proceeds.

use std::time::Duration;

use alloy::consensus::TxReceipt;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::Filter;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::SolEvent;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use updown_common::price::{raw_6dp_from_units, units_from_raw_6dp};

use crate::contracts::{contract_config, CTF_ADDRESS};

/// Timeout for read-only RPC calls.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for submitting a transaction to the RPC.
const TX_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for waiting on a transaction confirmation.
const TX_CONFIRM_TIMEOUT: Duration = Duration::from_secs(120);

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
    }

    #[sol(rpc)]
    interface IConditionalTokens {
        event TransferSingle(
            address indexed operator,
            address indexed from,
            address indexed to,
            uint256 id,
            uint256 value
        );

        function balanceOf(address account, uint256 id) external view returns (uint256);
        function isApprovedForAll(address account, address operator) external view returns (bool);
        function setApprovalForAll(address operator, bool approved) external;
        function mergePositions(
            address collateralToken,
            bytes32 parentCollectionId,
            bytes32 conditionId,
            uint256[] partition,
            uint256 amount
        ) external;
        function redeemPositions(
            address collateralToken,
            bytes32 parentCollectionId,
            bytes32 conditionId,
            uint256[] indexSets
        ) external;
    }
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("invalid condition id: {0}")]
    InvalidConditionId(String),

    #[error("invalid token id: {0}")]
    InvalidTokenId(String),

    #[error("RPC connection failed: {0}")]
    Connect(String),

    #[error("RPC call failed: {0}")]
    Rpc(String),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("transaction not found: {0}")]
    TxNotFound(String),

    #[error("unsupported chain id: {0}")]
    UnsupportedChain(u64),
}

/// A decoded CTF `TransferSingle` event.
#[derive(Debug, Clone)]
pub struct TokenTransfer {
    pub token_id: String,
    /// Amount in whole share units (6-decimal scale collapsed).
    pub amount: Decimal,
    pub from: Address,
    pub to: Address,
    pub block_number: Option<u64>,
}

/// Polygon JSON-RPC client bound to one wallet key.
pub struct ChainClient {
    rpc_url: String,
    chain_id: u64,
    signer: PrivateKeySigner,
}

impl ChainClient {
    pub fn new(rpc_url: impl Into<String>, private_key: &str, chain_id: u64) -> Result<Self, ChainError> {
        let normalized = format!("0x{}", private_key.trim().trim_start_matches("0x"));
        let signer: PrivateKeySigner = normalized
            .parse()
            .map_err(|e| ChainError::InvalidKey(format!("{e}")))?;
        Ok(Self {
            rpc_url: rpc_url.into(),
            chain_id,
            signer,
        })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn provider(&self) -> Result<impl Provider + Clone, ChainError> {
        ProviderBuilder::new()
            .wallet(self.signer.clone())
            .connect(&self.rpc_url)
            .await
            .map_err(|e| ChainError::Connect(e.to_string()))
    }

    fn collateral(&self) -> Result<Address, ChainError> {
        contract_config(self.chain_id, false)
            .map(|c| c.collateral)
            .map_err(|e| ChainError::UnsupportedChain(e.0))
    }

    fn conditional_tokens(&self) -> Result<Address, ChainError> {
        contract_config(self.chain_id, false)
            .map(|c| c.conditional_tokens)
            .map_err(|e| ChainError::UnsupportedChain(e.0))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// USDC.e balance of the wallet, in whole USDC.
    pub async fn usdc_balance(&self) -> Result<Decimal, ChainError> {
        self.erc20_balance(self.collateral()?).await
    }

    /// Balance of an arbitrary 6-decimal ERC-20 token.
    pub async fn erc20_balance(&self, token: Address) -> Result<Decimal, ChainError> {
        let provider = self.provider().await?;
        let erc20 = IERC20::new(token, provider);
        let raw = timeout(READ_TIMEOUT, erc20.balanceOf(self.address()).call())
            .await
            .map_err(|_| ChainError::Timeout("ERC-20 balance"))?
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(u256_units_6dp(raw))
    }

    /// Native token (POL) balance, in whole units.
    pub async fn native_balance(&self) -> Result<Decimal, ChainError> {
        let provider = self.provider().await?;
        let raw = timeout(READ_TIMEOUT, provider.get_balance(self.address()))
            .await
            .map_err(|_| ChainError::Timeout("native balance"))?
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        let clamped: u128 = raw.try_into().unwrap_or(u128::MAX);
        Ok(updown_common::price::units_from_raw(
            clamped.min(i128::MAX as u128) as i128,
            18,
        ))
    }

    /// ERC-1155 balance of an outcome token, in whole share units.
    pub async fn erc1155_balance_of(&self, token_id: &str) -> Result<Decimal, ChainError> {
        let id = parse_token_id(token_id)?;
        let provider = self.provider().await?;
        let ctf = IConditionalTokens::new(self.conditional_tokens()?, provider);
        let raw = timeout(READ_TIMEOUT, ctf.balanceOf(self.address(), id).call())
            .await
            .map_err(|_| ChainError::Timeout("ERC-1155 balance"))?
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(u256_units_6dp(raw))
    }

    pub async fn erc20_allowance(&self, token: Address, spender: Address) -> Result<U256, ChainError> {
        let provider = self.provider().await?;
        let erc20 = IERC20::new(token, provider);
        timeout(READ_TIMEOUT, erc20.allowance(self.address(), spender).call())
            .await
            .map_err(|_| ChainError::Timeout("ERC-20 allowance"))?
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    pub async fn erc1155_is_approved_for_all(&self, operator: Address) -> Result<bool, ChainError> {
        let provider = self.provider().await?;
        let ctf = IConditionalTokens::new(self.conditional_tokens()?, provider);
        timeout(
            READ_TIMEOUT,
            ctf.isApprovedForAll(self.address(), operator).call(),
        )
        .await
        .map_err(|_| ChainError::Timeout("ERC-1155 approval"))?
        .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Approve a spender for `amount` whole USDC.
    pub async fn approve_usdc(&self, spender: Address, amount: Decimal) -> Result<B256, ChainError> {
        let provider = self.provider().await?;
        let erc20 = IERC20::new(self.collateral()?, provider);
        let raw = U256::from(raw_6dp_from_units(amount).max(0) as u128);
        let pending = timeout(TX_SEND_TIMEOUT, erc20.approve(spender, raw).send())
            .await
            .map_err(|_| ChainError::Timeout("USDC approve send"))?
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(self.settle("USDC approve", pending).await)
    }

    pub async fn set_ctf_approval_for_all(
        &self,
        operator: Address,
        approved: bool,
    ) -> Result<B256, ChainError> {
        let provider = self.provider().await?;
        let ctf = IConditionalTokens::new(self.conditional_tokens()?, provider);
        let pending = timeout(
            TX_SEND_TIMEOUT,
            ctf.setApprovalForAll(operator, approved).send(),
        )
        .await
        .map_err(|_| ChainError::Timeout("CTF approval send"))?
        .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(self.settle("CTF approval", pending).await)
    }

    /// Burn `units` of matching UP and DOWN shares back into collateral.
    pub async fn merge_positions(
        &self,
        condition_id: &str,
        units: Decimal,
    ) -> Result<B256, ChainError> {
        let cid = parse_condition_id(condition_id)?;
        let amount = U256::from(raw_6dp_from_units(units).max(0) as u128);
        let provider = self.provider().await?;
        let ctf = IConditionalTokens::new(self.conditional_tokens()?, provider);
        let call = ctf.mergePositions(
            self.collateral()?,
            B256::ZERO,
            cid,
            vec![U256::from(1), U256::from(2)],
            amount,
        );
        let pending = timeout(TX_SEND_TIMEOUT, call.send())
            .await
            .map_err(|_| ChainError::Timeout("mergePositions send"))?
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(self.settle("mergePositions", pending).await)
    }

    /// Exchange a resolved market's winning shares for collateral.
    pub async fn redeem_positions(&self, condition_id: &str) -> Result<B256, ChainError> {
        let cid = parse_condition_id(condition_id)?;
        let provider = self.provider().await?;
        let ctf = IConditionalTokens::new(self.conditional_tokens()?, provider);
        let call = ctf.redeemPositions(
            self.collateral()?,
            B256::ZERO,
            cid,
            vec![U256::from(1), U256::from(2)],
        );
        let pending = timeout(TX_SEND_TIMEOUT, call.send())
            .await
            .map_err(|_| ChainError::Timeout("redeemPositions send"))?
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(self.settle("redeemPositions", pending).await)
    }

    /// Wait for a confirmation, tolerating unmined transactions: the hash is
    /// returned either way.
    async fn settle<N: alloy::network::Network>(
        &self,
        label: &'static str,
        pending: alloy::providers::PendingTransactionBuilder<N>,
    ) -> B256 {
        let hash = *pending.tx_hash();
        match timeout(TX_CONFIRM_TIMEOUT, pending.watch()).await {
            Ok(Ok(confirmed)) => {
                debug!(tx = %confirmed, "{label} confirmed");
                confirmed
            }
            Ok(Err(e)) => {
                warn!(tx = %hash, error = %e, "{label} confirmation failed; proceeding with hash");
                hash
            }
            Err(_) => {
                warn!(tx = %hash, "{label} confirmation timed out; proceeding with hash");
                hash
            }
        }
    }

    // ------------------------------------------------------------------
    // Receipt / log inspection
    // ------------------------------------------------------------------

    /// Decode the CTF `TransferSingle` events in one transaction receipt.
    pub async fn ctf_transfers_in_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Vec<TokenTransfer>, ChainError> {
        let hash: B256 = tx_hash
            .trim()
            .parse()
            .map_err(|_| ChainError::TxNotFound(tx_hash.to_string()))?;
        let provider = self.provider().await?;
        let receipt = timeout(READ_TIMEOUT, provider.get_transaction_receipt(hash))
            .await
            .map_err(|_| ChainError::Timeout("transaction receipt"))?
            .map_err(|e| ChainError::Rpc(e.to_string()))?
            .ok_or_else(|| ChainError::TxNotFound(tx_hash.to_string()))?;

        let ctf = self.conditional_tokens()?;
        let block = receipt.block_number;
        let transfers = receipt
            .inner
            .logs()
            .iter()
            .filter(|log| log.inner.address == ctf)
            .filter_map(|log| decode_transfer_single(&log.inner, block))
            .collect();
        Ok(transfers)
    }

    /// Scan the last `blocks` blocks for CTF transfers into this wallet.
    pub async fn recent_ctf_transfers_to_wallet(
        &self,
        blocks: u64,
    ) -> Result<Vec<TokenTransfer>, ChainError> {
        let provider = self.provider().await?;
        let latest = timeout(READ_TIMEOUT, provider.get_block_number())
            .await
            .map_err(|_| ChainError::Timeout("block number"))?
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        let from = latest.saturating_sub(blocks);

        let recipient = B256::left_padding_from(self.address().as_slice());
        let filter = Filter::new()
            .address(self.conditional_tokens()?)
            .event_signature(IConditionalTokens::TransferSingle::SIGNATURE_HASH)
            .topic3(recipient)
            .from_block(from)
            .to_block(latest);
        let logs = timeout(READ_TIMEOUT, provider.get_logs(&filter))
            .await
            .map_err(|_| ChainError::Timeout("log scan"))?
            .map_err(|e| ChainError::Rpc(e.to_string()))?;

        Ok(logs
            .iter()
            .filter_map(|log| decode_transfer_single(&log.inner, log.block_number))
            .collect())
    }
}

/// Manual `TransferSingle` decode: three indexed addresses in the topics,
/// `id` and `value` packed in the data.
fn decode_transfer_single(
    log: &alloy::primitives::Log,
    block_number: Option<u64>,
) -> Option<TokenTransfer> {
    let topics = log.data.topics();
    if topics.len() != 4 || topics[0] != IConditionalTokens::TransferSingle::SIGNATURE_HASH {
        return None;
    }
    let data: &[u8] = log.data.data.as_ref();
    if data.len() < 64 {
        return None;
    }
    let id = U256::from_be_slice(&data[0..32]);
    let value = U256::from_be_slice(&data[32..64]);
    Some(TokenTransfer {
        token_id: id.to_string(),
        amount: u256_units_6dp(value),
        from: Address::from_slice(&topics[2][12..]),
        to: Address::from_slice(&topics[3][12..]),
        block_number,
    })
}

/// Parse a 0x-prefixed 32-byte condition id.
pub fn parse_condition_id(hex_id: &str) -> Result<B256, ChainError> {
    let stripped = hex_id.trim().trim_start_matches("0x");
    if stripped.len() != 64 {
        return Err(ChainError::InvalidConditionId(hex_id.to_string()));
    }
    let bytes = hex::decode(stripped)
        .map_err(|_| ChainError::InvalidConditionId(hex_id.to_string()))?;
    Ok(B256::from_slice(&bytes))
}

/// Parse a decimal token id into a uint256.
pub fn parse_token_id(token_id: &str) -> Result<U256, ChainError> {
    let trimmed = token_id.trim();
    if trimmed.is_empty() {
        return Err(ChainError::InvalidTokenId(token_id.to_string()));
    }
    U256::from_str_radix(trimmed, 10).map_err(|_| ChainError::InvalidTokenId(token_id.to_string()))
}

fn u256_units_6dp(raw: U256) -> Decimal {
    let clamped: u128 = raw.try_into().unwrap_or(u128::MAX);
    units_from_raw_6dp(clamped.min(i128::MAX as u128) as i128)
}
