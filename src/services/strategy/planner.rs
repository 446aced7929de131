// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

//! Deterministic planning arithmetic: range geometry from volatility and
//! momentum, TWAP from observation cumulatives, hysteresis buffer sizing.

use crate::domain::constants::{
    ATR_BUFFER_SCALING, ATR_SAFETY_FACTOR, BASE_BUFFER_FACTOR, BUFFER_FACTOR_MAX,
    BUFFER_FACTOR_MIN, MAX_TICK, MIN_TICK, RSI_LOWER_BAND, RSI_UPPER_BAND, SKEW_NEUTRAL,
    SKEW_OVERBOUGHT, SKEW_OVERSOLD, WIDTH_CEILING_TICKS, WIDTH_FLOOR_TICKS,
};
use crate::domain::types::RangePlan;

/// Largest spacing-aligned tick <= `tick`.
pub fn floor_to_spacing(tick: i32, spacing: i32) -> i32 {
    tick.div_euclid(spacing) * spacing
}

/// Average tick over the observation window, rounded toward negative
/// infinity so negative cumulative deltas do not bias upward.
pub fn twap_tick(cumulative_start: i64, cumulative_end: i64, window_secs: u32) -> i32 {
    (cumulative_end - cumulative_start).div_euclid(window_secs as i64) as i32
}

/// Overbought markets get more room below spot (skew 0.3), oversold more
/// room above (0.7): the skewed side is the one the agent expects price to
/// traverse.
pub fn skew_from_rsi(rsi: f64) -> f64 {
    if rsi > RSI_UPPER_BAND {
        SKEW_OVERBOUGHT
    } else if rsi < RSI_LOWER_BAND {
        SKEW_OVERSOLD
    } else {
        SKEW_NEUTRAL
    }
}

/// Hysteresis buffer as a fraction of position width, scaled by realized
/// volatility.
pub fn buffer_factor(atr_usd: f64, price_usd: f64) -> f64 {
    let vol_fraction = if price_usd > 0.0 { atr_usd / price_usd } else { 0.0 };
    (BASE_BUFFER_FACTOR + vol_fraction * ATR_BUFFER_SCALING)
        .clamp(BUFFER_FACTOR_MIN, BUFFER_FACTOR_MAX)
}

/// Derive the new range for the current market. Width comes from ATR-based
/// volatility (clamped so quiet markets do not over-trade and violent ones
/// do not produce idle ranges), skew from RSI, and both ends are floor-
/// aligned to the pool's tick spacing.
pub fn compute_range_plan(
    current_tick: i32,
    tick_spacing: i32,
    atr_usd: f64,
    price_usd: f64,
    rsi: f64,
) -> RangePlan {
    let vol_percent = if price_usd > 0.0 {
        atr_usd / price_usd * 100.0
    } else {
        0.0
    };
    let dynamic_width = (vol_percent * 100.0 * ATR_SAFETY_FACTOR).floor() as i32;
    let width_ticks = dynamic_width.clamp(WIDTH_FLOOR_TICKS, WIDTH_CEILING_TICKS);

    let skew = skew_from_rsi(rsi);
    let total_span = (width_ticks * 2) as f64;
    let upper_diff = (total_span * skew).floor() as i32;
    let lower_diff = (total_span * (1.0 - skew)).floor() as i32;

    let min_aligned = MIN_TICK.div_euclid(tick_spacing) * tick_spacing + tick_spacing;
    let max_aligned = floor_to_spacing(MAX_TICK, tick_spacing);

    let mut tick_lower =
        floor_to_spacing(current_tick - lower_diff, tick_spacing).clamp(min_aligned, max_aligned);
    let mut tick_upper =
        floor_to_spacing(current_tick + upper_diff, tick_spacing).clamp(min_aligned, max_aligned);

    // A collapsed range (possible after alignment near the clamps) is
    // widened rather than rejected.
    if tick_lower >= tick_upper {
        if tick_upper + tick_spacing <= max_aligned {
            tick_upper += tick_spacing;
        } else {
            tick_lower -= tick_spacing;
        }
    }

    RangePlan {
        tick_lower,
        tick_upper,
        skew,
        width_ticks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_alignment_rounds_toward_negative_infinity() {
        assert_eq!(floor_to_spacing(105, 10), 100);
        assert_eq!(floor_to_spacing(-105, 10), -110);
        assert_eq!(floor_to_spacing(-100, 10), -100);
    }

    #[test]
    fn twap_floors_negative_deltas() {
        // -301 / 300 must floor to -2, not truncate to -1.
        assert_eq!(twap_tick(0, -301, 300), -2);
        assert_eq!(twap_tick(0, 301, 300), 1);
        assert_eq!(twap_tick(1000, 1000, 300), 0);
    }

    #[test]
    fn skew_bands_are_deterministic() {
        assert_eq!(skew_from_rsi(80.0), 0.3);
        assert_eq!(skew_from_rsi(75.0), 0.5);
        assert_eq!(skew_from_rsi(50.0), 0.5);
        assert_eq!(skew_from_rsi(25.0), 0.5);
        assert_eq!(skew_from_rsi(20.0), 0.7);
    }

    #[test]
    fn buffer_factor_clamps_both_ends() {
        assert_eq!(buffer_factor(0.0, 2500.0), 0.3);
        // Extreme volatility saturates at 0.8.
        assert_eq!(buffer_factor(2500.0, 2500.0), 0.8);
        // 0.2% volatility: 0.3 + 0.002 * 10 = 0.32.
        let f = buffer_factor(5.0, 2500.0);
        assert!((f - 0.32).abs() < 1e-12);
    }

    #[test]
    fn cold_start_scenario_produces_symmetric_400_tick_range() {
        // ATR 25 USD at price 2500 USD, RSI 50: vol 1%, width 400, skew 0.5.
        let plan = compute_range_plan(-197_003, 10, 25.0, 2500.0, 50.0);
        assert_eq!(plan.width_ticks, 400);
        assert_eq!(plan.skew, 0.5);
        assert_eq!(plan.tick_lower, floor_to_spacing(-197_003 - 400, 10));
        assert_eq!(plan.tick_upper, floor_to_spacing(-197_003 + 400, 10));
    }

    #[test]
    fn quiet_market_hits_width_floor() {
        let plan = compute_range_plan(0, 10, 0.5, 2500.0, 50.0);
        assert_eq!(plan.width_ticks, 200);
    }

    #[test]
    fn violent_market_hits_width_ceiling() {
        let plan = compute_range_plan(0, 10, 500.0, 2500.0, 50.0);
        assert_eq!(plan.width_ticks, 4000);
    }

    #[test]
    fn overbought_skew_leaves_more_room_below() {
        let plan = compute_range_plan(0, 10, 25.0, 2500.0, 80.0);
        let below = -plan.tick_lower;
        let above = plan.tick_upper;
        assert!(below > above, "below {below} above {above}");
    }

    #[test]
    fn plans_are_valid_across_the_tick_domain() {
        for spacing in [1, 10, 60, 200] {
            for tick in [-887_000, -197_003, -1, 0, 1, 42_137, 886_900] {
                for rsi in [10.0, 50.0, 90.0] {
                    let plan = compute_range_plan(tick, spacing, 25.0, 2500.0, rsi);
                    assert!(plan.tick_lower < plan.tick_upper);
                    assert!(plan.tick_lower >= MIN_TICK && plan.tick_upper <= MAX_TICK);
                    assert_eq!(plan.tick_lower % spacing, 0);
                    assert_eq!(plan.tick_upper % spacing, 0);
                }
            }
        }
    }
}
