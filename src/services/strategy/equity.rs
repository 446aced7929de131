// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::error::AppError;
use crate::domain::types::{EquitySnapshot, PoolSnapshot, PositionInfo};
use crate::services::strategy::actions::ActionExecutor;
use crate::services::strategy::position_math::{
    amounts_for_liquidity, from_raw, sqrt_ratio_at_tick, sqrt_ratio_from_x96,
};

/// Split a (token0, token1) pair into (weth, usdc) in human units.
fn to_weth_usdc(pool: &PoolSnapshot, amount0: f64, amount1: f64) -> (f64, f64) {
    if pool.token0.symbol == "WETH" {
        (amount0, amount1)
    } else {
        (amount1, amount0)
    }
}

/// Value everything the wallet controls at the current pool price:
/// wallet balances, principal implied by the position at the current tick,
/// and fees claimable via a static collect.
pub async fn compute_equity(
    actions: &ActionExecutor,
    pool: &PoolSnapshot,
    position: Option<&PositionInfo>,
) -> Result<EquitySnapshot, AppError> {
    let (bal0, bal1) = actions.wallet_balances().await?;
    let (wallet_weth, wallet_usdc) = to_weth_usdc(pool, bal0, bal1);

    let (mut position_weth, mut position_usdc) = (0.0, 0.0);
    let (mut pending_fees_weth, mut pending_fees_usdc) = (0.0, 0.0);

    if let Some(pos) = position {
        if pos.liquidity > 0 {
            let (principal0_raw, principal1_raw) = amounts_for_liquidity(
                sqrt_ratio_from_x96(pool.sqrt_price_x96),
                sqrt_ratio_at_tick(pos.tick_lower),
                sqrt_ratio_at_tick(pos.tick_upper),
                pos.liquidity as f64,
            );
            let principal0 = principal0_raw / 10f64.powi(pool.token0.decimals as i32);
            let principal1 = principal1_raw / 10f64.powi(pool.token1.decimals as i32);
            (position_weth, position_usdc) = to_weth_usdc(pool, principal0, principal1);
        }

        let (fees0_raw, fees1_raw) = actions.pending_fees(pos.token_id).await?;
        let fees0 = from_raw(fees0_raw, pool.token0.decimals);
        let fees1 = from_raw(fees1_raw, pool.token1.decimals);
        (pending_fees_weth, pending_fees_usdc) = to_weth_usdc(pool, fees0, fees1);
    }

    let price_usd_per_weth = pool.price_usd_per_weth();
    let total_usd = wallet_usdc
        + position_usdc
        + pending_fees_usdc
        + (wallet_weth + position_weth + pending_fees_weth) * price_usd_per_weth;

    Ok(EquitySnapshot {
        wallet_weth,
        wallet_usdc,
        position_weth,
        position_usdc,
        pending_fees_weth,
        pending_fees_usdc,
        price_usd_per_weth,
        total_usd,
    })
}
