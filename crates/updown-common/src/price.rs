//! Tick-size and price-grid arithmetic.
//!
//! Valid CLOB prices live on the tick grid inside `[tick, 1 - tick]`. All
//! prices are snapped before an order is built so tick validation in the
//! exchange client never rejects a strategy price.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Minimum price increment for an outcome token.
///
/// The CLOB reports one of four tick sizes; anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TickSize {
    #[serde(rename = "0.1")]
    Tenth,
    #[default]
    #[serde(rename = "0.01")]
    Hundredth,
    #[serde(rename = "0.001")]
    Thousandth,
    #[serde(rename = "0.0001")]
    TenThousandth,
}

impl TickSize {
    /// Parse the tick size string reported by the CLOB API.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "0.1" => Some(TickSize::Tenth),
            "0.01" => Some(TickSize::Hundredth),
            "0.001" => Some(TickSize::Thousandth),
            "0.0001" => Some(TickSize::TenThousandth),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Decimal {
        match self {
            TickSize::Tenth => dec!(0.1),
            TickSize::Hundredth => dec!(0.01),
            TickSize::Thousandth => dec!(0.001),
            TickSize::TenThousandth => dec!(0.0001),
        }
    }

    /// Decimal places a price on this grid needs.
    pub fn price_decimals(&self) -> u32 {
        match self {
            TickSize::Tenth => 1,
            TickSize::Hundredth => 2,
            TickSize::Thousandth => 3,
            TickSize::TenThousandth => 4,
        }
    }

    /// Decimal places allowed for the maker/taker amount product.
    pub fn amount_decimals(&self) -> u32 {
        match self {
            TickSize::Tenth => 3,
            TickSize::Hundredth => 4,
            TickSize::Thousandth => 5,
            TickSize::TenThousandth => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TickSize::Tenth => "0.1",
            TickSize::Hundredth => "0.01",
            TickSize::Thousandth => "0.001",
            TickSize::TenThousandth => "0.0001",
        }
    }

    /// Whether `price` is on this grid and inside `[tick, 1 - tick]`.
    pub fn price_valid(&self, price: Decimal) -> bool {
        let tick = self.as_decimal();
        if price < tick || price > Decimal::ONE - tick {
            return false;
        }
        (price / tick).fract().is_zero()
    }
}

impl std::fmt::Display for TickSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Round half-away-from-zero to `dp` decimal places.
pub fn round_away(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Snap a price to the tick grid, clamped to the valid `[tick, 1 - tick]`
/// range. Idempotent: snapping a snapped price is a no-op.
pub fn snap_to_tick(price: Decimal, tick: TickSize) -> Decimal {
    let t = tick.as_decimal();
    let steps = round_away(price / t, 0);
    let snapped = steps * t;
    snapped.clamp(t, Decimal::ONE - t)
}

/// Shares purchasable for `usd` at `price`, rounded to 2 decimal places.
/// Returns zero for non-positive prices.
pub fn shares_for_usd(usd: Decimal, price: Decimal) -> Decimal {
    if price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    round_away(usd / price, 2)
}

/// Largest mantissa a `Decimal` can carry (96 bits).
const MAX_DECIMAL_MANTISSA: i128 = 79_228_162_514_264_337_593_543_950_335;

/// Convert a raw on-chain integer amount into whole units at `scale`
/// decimals. Values beyond `Decimal`'s 96-bit mantissa saturate.
pub fn units_from_raw(raw: i128, scale: u32) -> Decimal {
    Decimal::from_i128_with_scale(raw.clamp(0, MAX_DECIMAL_MANTISSA), scale)
}

/// Convert a raw 6-decimal on-chain amount into whole units.
pub fn units_from_raw_6dp(raw: i128) -> Decimal {
    units_from_raw(raw, 6)
}

/// Convert whole units into a raw 6-decimal on-chain amount (truncating).
pub fn raw_6dp_from_units(units: Decimal) -> i128 {
    let scaled = (units * dec!(1_000_000)).trunc();
    scaled.try_into().unwrap_or(0)
}
