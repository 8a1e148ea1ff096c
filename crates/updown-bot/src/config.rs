//! Configuration, loaded once from the environment (`.env` supported).
//!
//! Every knob has a default except the signing key; validation failures are
//! fatal at startup.

use std::collections::HashMap;
use std::env;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

/// Which strategy authors opening orders for a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderMode {
    /// Quote both sides of both outcomes around the spread.
    Liquidity,
    /// Buy both outcomes at the ask, then trade the book imbalance.
    Split,
    /// Fixed-price test orders on both outcomes.
    #[default]
    Test,
}

impl OrderMode {
    /// Parse the configuration string; unknown values fall back to test mode.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "liquidity" => OrderMode::Liquidity,
            "split" => OrderMode::Split,
            _ => OrderMode::Test,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderMode::Liquidity => "liquidity",
            OrderMode::Split => "split",
            OrderMode::Test => "test",
        }
    }
}

/// Exit behavior attached to a named strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyConfig {
    /// Seconds after market start at which the exit runs.
    pub exit_timeout_seconds: i64,
    /// Cancel still-open orders at exit.
    pub cancel_unfilled: bool,
    /// Merge and market-sell leftover balances at exit.
    pub market_sell_filled: bool,
    pub enabled: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PRIVATE_KEY is required in the environment or .env file")]
    MissingPrivateKey,

    #[error("{0} must be positive")]
    NonPositive(&'static str),
}

/// Immutable runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // Signing identity
    pub private_key: String,
    pub chain_id: u64,
    pub signature_type: String,
    pub funder_address: Option<String>,

    // Trading parameters
    pub order_size_usd: Decimal,
    pub spread_offset: Decimal,
    pub check_interval_seconds: u64,
    pub order_placement_min_minutes: i64,
    pub order_placement_max_minutes: i64,
    pub redeem_check_interval_seconds: u64,
    pub min_sell_price: Decimal,
    pub market_sell_discount: Decimal,
    pub strategy_name: String,
    pub order_mode: OrderMode,

    // Endpoints
    pub gamma_api_base_url: String,
    pub clob_api_url: String,
    pub data_api_base_url: String,
    pub rpc_url: String,

    // Dashboard + logging
    pub dashboard_host: String,
    pub dashboard_port: u16,
    pub log_level: String,
    pub log_file: String,

    pub strategies: HashMap<String, StrategyConfig>,
}

impl Config {
    /// Load from the process environment. Call `dotenvy::dotenv()` first if
    /// `.env` support is wanted.
    pub fn from_env() -> Result<Self, ConfigError> {
        let cfg = Self {
            private_key: env::var("PRIVATE_KEY").unwrap_or_default(),
            chain_id: env_u64("CHAIN_ID", 137),
            signature_type: env_or("SIGNATURE_TYPE", "EOA"),
            funder_address: env::var("FUNDER_ADDRESS").ok().filter(|s| !s.trim().is_empty()),

            order_size_usd: env_decimal("ORDER_SIZE_USD", dec!(10)),
            spread_offset: env_decimal("SPREAD_OFFSET", dec!(0.01)),
            check_interval_seconds: env_u64("CHECK_INTERVAL_SECONDS", 60),
            order_placement_min_minutes: env_i64("ORDER_PLACEMENT_MIN_MINUTES", 10),
            order_placement_max_minutes: env_i64("ORDER_PLACEMENT_MAX_MINUTES", 20),
            redeem_check_interval_seconds: env_u64("REDEEM_CHECK_INTERVAL_SECONDS", 60),
            min_sell_price: env_decimal("MIN_SELL_PRICE", dec!(0.10)),
            market_sell_discount: env_decimal("MARKET_SELL_DISCOUNT", dec!(0.02)),
            strategy_name: env_or("STRATEGY_NAME", "quick_exit_7_5min"),
            order_mode: OrderMode::parse(&env_or("ORDER_MODE", "test")),

            gamma_api_base_url: env_or("GAMMA_API_BASE_URL", "https://gamma-api.polymarket.com"),
            clob_api_url: env_or("CLOB_API_URL", "https://clob.polymarket.com"),
            data_api_base_url: env_or("DATA_API_BASE_URL", "https://data-api.polymarket.com"),
            rpc_url: env_or("RPC_URL", "https://polygon-rpc.com"),

            dashboard_host: env_or("DASHBOARD_HOST", "0.0.0.0"),
            dashboard_port: env_u64("DASHBOARD_PORT", 8000) as u16,
            log_level: env_or("LOG_LEVEL", "INFO"),
            log_file: env_or("LOG_FILE", "bot.log"),

            strategies: builtin_strategies(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.private_key.trim().is_empty() {
            return Err(ConfigError::MissingPrivateKey);
        }
        if self.order_size_usd <= Decimal::ZERO {
            return Err(ConfigError::NonPositive("ORDER_SIZE_USD"));
        }
        if self.spread_offset <= Decimal::ZERO {
            return Err(ConfigError::NonPositive("SPREAD_OFFSET"));
        }
        Ok(())
    }

    /// The exit parameters of the configured strategy, if defined.
    pub fn active_strategy(&self) -> Option<&StrategyConfig> {
        self.strategies.get(&self.strategy_name)
    }

    /// Minimum USDC needed to fund one placement batch.
    pub fn min_balance_needed(&self) -> Decimal {
        self.order_size_usd * dec!(2)
    }
}

fn builtin_strategies() -> HashMap<String, StrategyConfig> {
    let mut strategies = HashMap::new();
    strategies.insert(
        "quick_exit_7_5min".to_string(),
        StrategyConfig {
            exit_timeout_seconds: env_i64("STRATEGY_EXIT_TIMEOUT_SECONDS", 450),
            cancel_unfilled: env_bool("STRATEGY_CANCEL_UNFILLED", true),
            market_sell_filled: env_bool("STRATEGY_MARKET_SELL_FILLED", true),
            enabled: env_bool("STRATEGY_ENABLED", true),
        },
    );
    strategies
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).ok().filter(|v| !v.trim().is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn env_decimal(key: &str, default: Decimal) -> Decimal {
    env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}
