// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// One side of the pool pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRef {
    pub address: Address,
    pub decimals: u8,
    pub symbol: String,
}

/// Immutable sample of pool state. Never cached across the post-swap sync
/// sleep; re-sampled immediately before mint.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub liquidity: u128,
    pub tick_spacing: i32,
    pub token0: TokenRef,
    pub token1: TokenRef,
}

impl PoolSnapshot {
    /// Human-scaled price of token0 denominated in token1.
    pub fn price_token0_in_token1(&self) -> f64 {
        let q96 = 2f64.powi(96);
        let sqrt_price: f64 = self
            .sqrt_price_x96
            .to_string()
            .parse()
            .unwrap_or(f64::INFINITY);
        let raw = (sqrt_price / q96).powi(2);
        raw * 10f64.powi(self.token0.decimals as i32 - self.token1.decimals as i32)
    }

    /// WETH price in USD regardless of which side of the pair WETH sits on.
    pub fn price_usd_per_weth(&self) -> f64 {
        if self.token0.symbol == "WETH" {
            self.price_token0_in_token1()
        } else {
            let p = self.price_token0_in_token1();
            if p > 0.0 { 1.0 / p } else { 0.0 }
        }
    }
}

/// On-disk record of the active position. `"0"` means no position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedState {
    #[serde(rename = "tokenId")]
    pub token_id: String,
    #[serde(rename = "lastCheck")]
    pub last_check: i64,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            token_id: "0".to_string(),
            last_check: 0,
        }
    }
}

impl PersistedState {
    pub fn has_position(&self) -> bool {
        self.token_id != "0"
    }
}

/// The on-chain position as read from the position manager.
#[derive(Debug, Clone, Copy)]
pub struct PositionInfo {
    pub token_id: U256,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
    pub tokens_owed0: u128,
    pub tokens_owed1: u128,
}

impl PositionInfo {
    pub fn width(&self) -> i32 {
        self.tick_upper - self.tick_lower
    }

    pub fn center(&self) -> i32 {
        (self.tick_lower + self.tick_upper) / 2
    }
}

/// Transient plan for a new range, derived deterministically from
/// (current tick, spacing, ATR, price, RSI).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangePlan {
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub skew: f64,
    pub width_ticks: i32,
}

/// Block-time valuation of everything the wallet controls, in USD terms.
/// Pending fees come from a static collect call, not the stale tokensOwed
/// fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct EquitySnapshot {
    pub wallet_weth: f64,
    pub wallet_usdc: f64,
    pub position_weth: f64,
    pub position_usdc: f64,
    pub pending_fees_weth: f64,
    pub pending_fees_usdc: f64,
    pub price_usd_per_weth: f64,
    pub total_usd: f64,
}

/// SAFE is latched for the process lifetime; exit requires an operator
/// restart after manual remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Normal,
    Safe,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(sqrt_price_x96: U256, dec0: u8, dec1: u8, sym0: &str, sym1: &str) -> PoolSnapshot {
        PoolSnapshot {
            sqrt_price_x96,
            tick: 0,
            liquidity: 0,
            tick_spacing: 10,
            token0: TokenRef {
                address: Address::ZERO,
                decimals: dec0,
                symbol: sym0.into(),
            },
            token1: TokenRef {
                address: Address::ZERO,
                decimals: dec1,
                symbol: sym1.into(),
            },
        }
    }

    #[test]
    fn price_at_unit_sqrt_ratio_is_decimal_shift() {
        // sqrtPriceX96 == 2^96 means raw price 1.0; WETH(18)/USDC(6) shifts by 1e12.
        let snap = snapshot(U256::from(1u128) << 96, 18, 6, "WETH", "USDC");
        let price = snap.price_token0_in_token1();
        assert!((price - 1e12).abs() / 1e12 < 1e-9);
    }

    #[test]
    fn weth_price_inverts_when_weth_is_token1() {
        let snap = snapshot(U256::from(1u128) << 96, 6, 18, "USDC", "WETH");
        // raw price 1.0, decimal shift 10^(6-18) = 1e-12, so WETH/USD = 1e12.
        let price = snap.price_usd_per_weth();
        assert!((price - 1e12).abs() / 1e12 < 1e-9);
    }

    #[test]
    fn default_state_has_no_position() {
        let state = PersistedState::default();
        assert_eq!(state.token_id, "0");
        assert!(!state.has_position());
    }
}
