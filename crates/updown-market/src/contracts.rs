//! Polymarket contract addresses per chain.

use alloy::primitives::{address, Address};
use thiserror::Error;

/// USDC.e collateral token on Polygon mainnet.
pub const USDC_E_ADDRESS: Address = address!("0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174");

/// Native (Circle) USDC on Polygon mainnet, used only for balance diagnostics.
pub const USDC_NATIVE_ADDRESS: Address = address!("0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359");

/// Conditional Tokens Framework (ERC-1155) on Polygon mainnet.
pub const CTF_ADDRESS: Address = address!("0x4D97DCd97eC945f40cF65F87097ACe5EA0476045");

#[derive(Debug, Error)]
#[error("unsupported chain id: {0}")]
pub struct UnsupportedChain(pub u64);

/// Exchange-side contract set for one chain / risk flavor.
#[derive(Debug, Clone, Copy)]
pub struct ContractConfig {
    pub exchange: Address,
    pub collateral: Address,
    pub conditional_tokens: Address,
}

/// Resolve the contract set for a chain. `neg_risk` selects the neg-risk
/// exchange used by multi-outcome events.
pub fn contract_config(chain_id: u64, neg_risk: bool) -> Result<ContractConfig, UnsupportedChain> {
    match (chain_id, neg_risk) {
        (137, false) => Ok(ContractConfig {
            exchange: address!("0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E"),
            collateral: USDC_E_ADDRESS,
            conditional_tokens: CTF_ADDRESS,
        }),
        (137, true) => Ok(ContractConfig {
            exchange: address!("0xC5d563A36AE78145C45a50134d48A1215220f80a"),
            collateral: USDC_E_ADDRESS,
            conditional_tokens: CTF_ADDRESS,
        }),
        (80002, false) => Ok(ContractConfig {
            exchange: address!("0xdFE02Eb6733538f8Ea35D585af8DE5958AD99E40"),
            collateral: address!("0x9c4e1703476e875070ee25b56a58b008cfb8fa78"),
            conditional_tokens: address!("0x69308FB512518e39F9b16112fA8d994F4e2Bf8bB"),
        }),
        (80002, true) => Ok(ContractConfig {
            exchange: address!("0xd91E80cF2E7be2e162c6513ceD06f1dD0dA35296"),
            collateral: address!("0x9c4e1703476e875070ee25b56a58b008cfb8fa78"),
            conditional_tokens: address!("0x69308FB512518e39F9b16112fA8d994F4e2Bf8bB"),
        }),
        _ => Err(UnsupportedChain(chain_id)),
    }
}

/// Spenders that need USDC allowance + CTF approval for trading.
pub fn allowance_spenders() -> [(&'static str, Address); 3] {
    [
        (
            "CTF Exchange",
            address!("0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E"),
        ),
        (
            "Neg Risk CTF Exchange",
            address!("0xC5d563A36AE78145C45a50134d48A1215220f80a"),
        ),
        (
            "Neg Risk Adapter",
            address!("0xd91E80cF2E7be2e162c6513ceD06f1dD0dA35296"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygon_configs() {
        let regular = contract_config(137, false).unwrap();
        let neg_risk = contract_config(137, true).unwrap();
        assert_ne!(regular.exchange, neg_risk.exchange);
        assert_eq!(regular.collateral, USDC_E_ADDRESS);
        assert_eq!(regular.conditional_tokens, neg_risk.conditional_tokens);
    }

    #[test]
    fn test_unknown_chain() {
        assert!(contract_config(1, false).is_err());
    }
}
