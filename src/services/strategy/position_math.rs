// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

//! Concentrated-liquidity arithmetic in floating point. The exact
//! fixed-point math lives in the pool contracts; this facade only sizes
//! swaps and mint parameters, and the 1% balance buffer plus slippage
//! minimums absorb the rounding difference.

use alloy::primitives::U256;

pub fn u256_to_f64(v: U256) -> f64 {
    v.to_string().parse().unwrap_or(f64::INFINITY)
}

pub fn f64_to_u256(v: f64) -> U256 {
    if !v.is_finite() || v <= 0.0 {
        return U256::ZERO;
    }
    U256::from(v as u128)
}

pub fn from_raw(raw: U256, decimals: u8) -> f64 {
    u256_to_f64(raw) / 10f64.powi(decimals as i32)
}

pub fn to_raw(human: f64, decimals: u8) -> U256 {
    f64_to_u256(human * 10f64.powi(decimals as i32))
}

/// sqrt(1.0001^tick): square root of the raw token1/token0 price.
pub fn sqrt_ratio_at_tick(tick: i32) -> f64 {
    1.0001f64.powf(tick as f64 / 2.0)
}

pub fn sqrt_ratio_from_x96(sqrt_price_x96: U256) -> f64 {
    u256_to_f64(sqrt_price_x96) / 2f64.powi(96)
}

/// Raw token amounts forming `liquidity` over [sqrt_a, sqrt_b] when the
/// pool trades at sqrt_p.
pub fn amounts_for_liquidity(sqrt_p: f64, sqrt_a: f64, sqrt_b: f64, liquidity: f64) -> (f64, f64) {
    let (sqrt_a, sqrt_b) = if sqrt_a <= sqrt_b {
        (sqrt_a, sqrt_b)
    } else {
        (sqrt_b, sqrt_a)
    };
    if sqrt_p <= sqrt_a {
        (liquidity * (sqrt_b - sqrt_a) / (sqrt_a * sqrt_b), 0.0)
    } else if sqrt_p >= sqrt_b {
        (0.0, liquidity * (sqrt_b - sqrt_a))
    } else {
        (
            liquidity * (sqrt_b - sqrt_p) / (sqrt_p * sqrt_b),
            liquidity * (sqrt_p - sqrt_a),
        )
    }
}

/// Largest liquidity mintable from the given raw amounts over [sqrt_a, sqrt_b].
pub fn liquidity_for_amounts(
    sqrt_p: f64,
    sqrt_a: f64,
    sqrt_b: f64,
    amount0: f64,
    amount1: f64,
) -> f64 {
    let (sqrt_a, sqrt_b) = if sqrt_a <= sqrt_b {
        (sqrt_a, sqrt_b)
    } else {
        (sqrt_b, sqrt_a)
    };
    if sqrt_p <= sqrt_a {
        amount0 * sqrt_a * sqrt_b / (sqrt_b - sqrt_a)
    } else if sqrt_p >= sqrt_b {
        amount1 / (sqrt_b - sqrt_a)
    } else {
        let l0 = amount0 * sqrt_p * sqrt_b / (sqrt_b - sqrt_p);
        let l1 = amount1 / (sqrt_p - sqrt_a);
        l0.min(l1)
    }
}

/// Raw amounts a unit of liquidity would consume for the range at spot:
/// the ideal mint ratio. amount0 == 0 means the range is entirely below
/// spot (token1-only), amount1 == 0 entirely above (token0-only).
pub fn ideal_mint_amounts(sqrt_p: f64, tick_lower: i32, tick_upper: i32) -> (f64, f64) {
    let sqrt_a = sqrt_ratio_at_tick(tick_lower);
    let sqrt_b = sqrt_ratio_at_tick(tick_upper);
    // Unit scaled up so both sides stay well inside f64 precision.
    amounts_for_liquidity(sqrt_p, sqrt_a, sqrt_b, 1e18)
}

/// Target token0 holding in human units for minting into
/// [tick_lower, tick_upper] at spot: `target0 = V / (price0 + ratio)` where
/// `V = bal1 + bal0 * price0` and `ratio` is the range's ideal token1 per
/// token0. A token1-only range targets zero token0; a token0-only range
/// targets the whole portfolio.
pub fn target_token0_holding(
    bal0: f64,
    bal1: f64,
    price0: f64,
    sqrt_p: f64,
    tick_lower: i32,
    tick_upper: i32,
    decimals0: u8,
    decimals1: u8,
) -> f64 {
    let (ideal0_raw, ideal1_raw) = ideal_mint_amounts(sqrt_p, tick_lower, tick_upper);
    let total_value = bal1 + bal0 * price0;
    if ideal0_raw == 0.0 {
        0.0
    } else if ideal1_raw == 0.0 {
        total_value / price0
    } else {
        let ratio = (ideal1_raw / 10f64.powi(decimals1 as i32))
            / (ideal0_raw / 10f64.powi(decimals0 as i32));
        total_value / (price0 + ratio)
    }
}

/// Mint parameters sized from raw wallet amounts with a slippage tolerance
/// applied to the minimums.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MintAmounts {
    pub amount0_desired: U256,
    pub amount1_desired: U256,
    pub amount0_min: U256,
    pub amount1_min: U256,
}

pub fn mint_amounts(
    sqrt_p: f64,
    tick_lower: i32,
    tick_upper: i32,
    available0: f64,
    available1: f64,
    slippage_bps: u64,
) -> MintAmounts {
    let sqrt_a = sqrt_ratio_at_tick(tick_lower);
    let sqrt_b = sqrt_ratio_at_tick(tick_upper);
    let liquidity = liquidity_for_amounts(sqrt_p, sqrt_a, sqrt_b, available0, available1);
    let (amount0, amount1) = amounts_for_liquidity(sqrt_p, sqrt_a, sqrt_b, liquidity);
    let keep = 1.0 - slippage_bps as f64 / 10_000.0;
    MintAmounts {
        amount0_desired: f64_to_u256(amount0),
        amount1_desired: f64_to_u256(amount1),
        amount0_min: f64_to_u256(amount0 * keep),
        amount1_min: f64_to_u256(amount1 * keep),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_round_trip_through_liquidity() {
        let p = sqrt_ratio_at_tick(-197_000);
        let a = sqrt_ratio_at_tick(-197_400);
        let b = sqrt_ratio_at_tick(-196_600);
        let l = liquidity_for_amounts(p, a, b, 1e18, 2.5e9);
        let (a0, a1) = amounts_for_liquidity(p, a, b, l);
        // The limiting side is consumed exactly, the other not exceeded.
        assert!(a0 <= 1e18 * (1.0 + 1e-9));
        assert!(a1 <= 2.5e9 * (1.0 + 1e-9));
        assert!((a0 - 1e18).abs() / 1e18 < 1e-6 || (a1 - 2.5e9).abs() / 2.5e9 < 1e-6);
    }

    #[test]
    fn range_below_spot_is_token1_only() {
        let (a0, a1) = ideal_mint_amounts(sqrt_ratio_at_tick(0), -2000, -1000);
        assert_eq!(a0, 0.0);
        assert!(a1 > 0.0);
    }

    #[test]
    fn range_above_spot_is_token0_only() {
        let (a0, a1) = ideal_mint_amounts(sqrt_ratio_at_tick(0), 1000, 2000);
        assert!(a0 > 0.0);
        assert_eq!(a1, 0.0);
    }

    #[test]
    fn centered_range_holds_both_tokens() {
        let (a0, a1) = ideal_mint_amounts(sqrt_ratio_at_tick(0), -1000, 1000);
        assert!(a0 > 0.0 && a1 > 0.0);
        // At tick 0 with a symmetric range the value split is even:
        // amount1 / amount0 equals the raw price (1.0).
        assert!((a1 / a0 - 1.0).abs() < 1e-3);
    }

    #[test]
    fn mint_minimums_respect_slippage_tolerance() {
        let p = sqrt_ratio_at_tick(0);
        let m = mint_amounts(p, -1000, 1000, 1e18, 1e18, 50);
        let desired0 = u256_to_f64(m.amount0_desired);
        let min0 = u256_to_f64(m.amount0_min);
        assert!(min0 <= desired0 * 0.995 + 1.0);
        assert!(min0 >= desired0 * 0.994);
    }

    #[test]
    fn raw_conversions_shift_by_decimals() {
        assert_eq!(to_raw(1.5, 6), U256::from(1_500_000u64));
        let back = from_raw(U256::from(1_500_000u64), 6);
        assert!((back - 1.5).abs() < 1e-12);
    }

    #[test]
    fn negative_and_non_finite_amounts_clamp_to_zero() {
        assert_eq!(f64_to_u256(-1.0), U256::ZERO);
        assert_eq!(f64_to_u256(f64::NAN), U256::ZERO);
    }
}
