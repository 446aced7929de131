// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use alloy::primitives::{Address, address};

// =============================================================================
// TICK DOMAIN
// =============================================================================

pub const MIN_TICK: i32 = -887_272;
pub const MAX_TICK: i32 = 887_272;

// =============================================================================
// STRATEGY CONSTANTS
// =============================================================================

/// TWAP manipulation gate: observation window and max |spot - twap| in ticks.
pub const TWAP_WINDOW_SECS: u32 = 300;
pub const TWAP_MAX_DEVIATION_TICKS: i32 = 200;

/// Range width model: width = clamp(floor(vol% * 100 * factor), floor, ceiling).
/// The floor prevents over-trading in quiet markets, the ceiling prevents
/// absurd idle ranges in violent ones.
pub const ATR_SAFETY_FACTOR: f64 = 4.0;
pub const WIDTH_FLOOR_TICKS: i32 = 200;
pub const WIDTH_CEILING_TICKS: i32 = 4000;

/// RSI bands for range skew. Above the upper band the range sits mostly
/// below spot (skew 0.3), below the lower band mostly above (skew 0.7).
pub const RSI_UPPER_BAND: f64 = 75.0;
pub const RSI_LOWER_BAND: f64 = 25.0;
pub const SKEW_OVERBOUGHT: f64 = 0.3;
pub const SKEW_NEUTRAL: f64 = 0.5;
pub const SKEW_OVERSOLD: f64 = 0.7;

/// Hysteresis buffer: factor = clamp(base + vol_fraction * scaling, min, max),
/// applied to the position width.
pub const BASE_BUFFER_FACTOR: f64 = 0.3;
pub const ATR_BUFFER_SCALING: f64 = 10.0;
pub const BUFFER_FACTOR_MIN: f64 = 0.1;
pub const BUFFER_FACTOR_MAX: f64 = 0.8;

pub const CIRCUIT_BREAKER_DEVIATION_FACTOR: f64 = 3.0;

/// Per-side dust thresholds below which a rebalancing swap is skipped.
pub const REBALANCE_THRESHOLD_USDC: f64 = 1.0;
pub const REBALANCE_THRESHOLD_WETH: f64 = 0.0005;

pub const SLIPPAGE_TOLERANCE_BPS: u64 = 50;

/// Mint uses 99% of wallet balances to absorb precision loss and RPC lag.
pub const BALANCE_SAFETY_FACTOR: f64 = 0.99;

pub const RSI_PERIOD: usize = 14;
pub const ATR_PERIOD: usize = 14;
pub const DEFAULT_ANALYTICS_INTERVAL: &str = "15m";

// =============================================================================
// TIMING
// =============================================================================

pub const MIN_LOOP_INTERVAL_MS: u64 = 3_000;
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const ROTATION_DEBOUNCE_SECS: u64 = 2;
pub const POST_SWAP_SYNC_SECS: u64 = 2;
pub const TX_DEADLINE_SECS: u64 = 120;
pub const CONFIRMATION_TIMEOUT_MS: u64 = 60_000;
pub const ATR_CACHE_SECS: u64 = 300;
pub const MARKET_DATA_TIMEOUT_SECS: u64 = 5;
pub const SAFE_MODE_LOG_EVERY_BLOCKS: u64 = 100;

pub const DEFAULT_HARD_STOP_LOSS_USD: f64 = 250.0;

// =============================================================================
// NETWORK ADDRESS TABLES
// =============================================================================

/// Contract surface of one deployment. Pool token ordering is sampled from
/// the chain, never assumed: WETH sorts below USDC on Arbitrum One but not
/// on Arbitrum Sepolia.
#[derive(Debug, Clone, Copy)]
pub struct NetworkProfile {
    pub name: &'static str,
    pub chain_id: u64,
    pub pool: Address,
    pub position_manager: Address,
    pub swap_router: Address,
    pub quoter: Address,
    pub weth: Address,
    pub usdc: Address,
    pub pool_fee: u32,
}

/// Arbitrum One, USDC/WETH 0.05%.
pub const MAINNET_PROFILE: NetworkProfile = NetworkProfile {
    name: "MAINNET",
    chain_id: 42161,
    pool: address!("C6962004f452bE9203591991D15f6b388e09E8D0"),
    position_manager: address!("C36442b4a4522E871399CD717aBDD847Ab11FE88"),
    swap_router: address!("E592427A0AEce92De3Edee1F18E0157C05861564"),
    quoter: address!("b27308f9F90D607463bb33eA1BeBb41C27CE5AB6"),
    weth: address!("82aF49447D8a07e3bd95BD0d56f35241523fBab1"),
    usdc: address!("af88d065e77c8cC2239327C5EDb3A432268e5831"),
    pool_fee: 500,
};

/// Arbitrum Sepolia.
pub const TESTNET_PROFILE: NetworkProfile = NetworkProfile {
    name: "TESTNET",
    chain_id: 421614,
    pool: address!("0d4F1fF895D12c34994D6B65FaBBeEFDc1a9fb39"),
    position_manager: address!("6b2937Bde17889EDCf8fbD8dE31C3C2a70Bc4d65"),
    swap_router: address!("101F443B4d1b059569D643917553c771E1b9663E"),
    quoter: address!("2779a0CC1c3e0E44D2542EC3e79e3864Ae93Ef0B"),
    weth: address!("980B62Da83eFf3D4576C647993b0c1D7faf17c73"),
    usdc: address!("75faf114eafb1BDbe2F0316DF893fd58CE46AA4d"),
    pool_fee: 500,
};

pub fn profile_for(network: &str) -> NetworkProfile {
    match network.trim().to_uppercase().as_str() {
        "MAINNET" => MAINNET_PROFILE,
        _ => TESTNET_PROFILE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_selection_defaults_to_testnet() {
        assert_eq!(profile_for("MAINNET").chain_id, 42161);
        assert_eq!(profile_for("mainnet").chain_id, 42161);
        assert_eq!(profile_for("GOERLI").chain_id, 421614);
        assert_eq!(profile_for("").chain_id, 421614);
    }

    #[test]
    fn pool_token_ordering_differs_across_networks() {
        // The strategy must read token0/token1 from the pool; the sort
        // order flips between the two deployments.
        assert!(MAINNET_PROFILE.weth < MAINNET_PROFILE.usdc);
        assert!(TESTNET_PROFILE.usdc < TESTNET_PROFILE.weth);
    }
}
