//! The concrete decision scenarios the control loop must get right,
//! expressed against the pure planning and sizing arithmetic.

use oxidity_ranger::domain::constants::{
    CIRCUIT_BREAKER_DEVIATION_FACTOR, TWAP_MAX_DEVIATION_TICKS,
};
use oxidity_ranger::services::strategy::planner::{
    buffer_factor, compute_range_plan, floor_to_spacing, twap_tick,
};
use oxidity_ranger::services::strategy::position_math::{
    sqrt_ratio_at_tick, target_token0_holding,
};

/// Cold start: 2,000 USDC, ATR 25 USD at 2,500 USD, RSI 50. The plan is a
/// symmetric 400-tick half-width and the swap converts about half of the
/// stable balance.
#[test]
fn cold_start_plans_symmetric_range_and_half_swap() {
    // WETH(18)/USDC(6) pool trading near 2,481 USD.
    let tick = -198_080;
    let plan = compute_range_plan(tick, 10, 25.0, 2500.0, 50.0);
    assert_eq!(plan.width_ticks, 400);
    assert_eq!(plan.skew, 0.5);
    assert_eq!(plan.tick_lower, floor_to_spacing(tick - 400, 10));
    assert_eq!(plan.tick_upper, floor_to_spacing(tick + 400, 10));

    let sqrt_p = sqrt_ratio_at_tick(tick);
    let price0 = 1.0001f64.powi(tick) * 1e12;
    let target0 = target_token0_holding(
        0.0,
        2000.0,
        price0,
        sqrt_p,
        plan.tick_lower,
        plan.tick_upper,
        18,
        6,
    );
    let target0_value = target0 * price0;
    // Symmetric range at spot wants an even value split.
    assert!(
        (target0_value - 1000.0).abs() < 25.0,
        "target0 value {target0_value}"
    );
}

/// In-range hold: [-100, +100] around tick 0, low volatility, spot +90.
#[test]
fn in_range_tick_inside_buffer_holds() {
    let (tick_lower, tick_upper) = (-100, 100);
    let width = tick_upper - tick_lower;
    let factor = buffer_factor(5.0, 2500.0);
    assert!((factor - 0.32).abs() < 1e-12);
    let buffer = (f64::from(width) * factor).floor() as i32;

    let current = 90;
    let out = current < tick_lower - buffer || current > tick_upper + buffer;
    assert!(!out);
}

/// Hysteresis: same position but spot +500 clears the buffered band.
#[test]
fn far_outside_buffer_triggers_rebalance() {
    let (tick_lower, tick_upper) = (-100, 100);
    let width = tick_upper - tick_lower;
    let buffer = (f64::from(width) * buffer_factor(5.0, 2500.0)).floor() as i32;

    let current = 500;
    let out = current < tick_lower - buffer || current > tick_upper + buffer;
    assert!(out);
}

/// TWAP gate: spot at 0 while the 300s average sits at 300.
#[test]
fn twap_deviation_beyond_200_ticks_is_a_violation() {
    let current_tick = 0;
    let twap = twap_tick(0, 300 * 300, 300);
    assert_eq!(twap, 300);
    assert!((current_tick - twap).abs() > TWAP_MAX_DEVIATION_TICKS);

    // And a benign drift passes.
    let close_twap = twap_tick(0, 150 * 300, 300);
    assert!((current_tick - close_twap).abs() <= TWAP_MAX_DEVIATION_TICKS);
}

/// Circuit breaker: width 200, factor 3 => threshold 600; distance 700 trips.
#[test]
fn circuit_breaker_threshold_is_width_times_factor() {
    let width = 200;
    let threshold = f64::from(width) * CIRCUIT_BREAKER_DEVIATION_FACTOR;
    assert!(f64::from(700) > threshold);
    assert!(f64::from(599) <= threshold);
}

/// Single-sided ranges route the whole portfolio to one token.
#[test]
fn single_sided_ranges_target_all_or_nothing() {
    let tick = 0;
    let sqrt_p = sqrt_ratio_at_tick(tick);

    // Range entirely below spot: token1 only.
    let t0 = target_token0_holding(1.0, 1000.0, 1000.0, sqrt_p, -3000, -1000, 18, 6);
    assert_eq!(t0, 0.0);

    // Range entirely above spot: token0 only.
    let t0 = target_token0_holding(1.0, 1000.0, 1000.0, sqrt_p, 1000, 3000, 18, 6);
    let total_value = 1000.0 + 1.0 * 1000.0;
    assert!((t0 - total_value / 1000.0).abs() < 1e-9);
}
