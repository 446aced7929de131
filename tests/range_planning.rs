use oxidity_ranger::domain::constants::{MAX_TICK, MIN_TICK};
use oxidity_ranger::services::strategy::planner::{
    buffer_factor, compute_range_plan, floor_to_spacing, skew_from_rsi, twap_tick,
};

#[test]
fn every_plan_is_aligned_ordered_and_in_domain() {
    let spacings = [1, 10, 60, 200];
    let ticks = [
        MIN_TICK + 500,
        -500_000,
        -198_080,
        -42,
        0,
        42,
        198_080,
        500_000,
        MAX_TICK - 500,
    ];
    let atrs = [0.01, 1.0, 25.0, 400.0, 10_000.0];
    let rsis = [0.0, 24.9, 25.0, 50.0, 75.0, 75.1, 100.0];

    for spacing in spacings {
        for tick in ticks {
            for atr in atrs {
                for rsi in rsis {
                    let plan = compute_range_plan(tick, spacing, atr, 2500.0, rsi);
                    assert!(
                        plan.tick_lower < plan.tick_upper,
                        "collapsed range for tick={tick} spacing={spacing} atr={atr} rsi={rsi}: {plan:?}"
                    );
                    assert!(plan.tick_lower >= MIN_TICK, "{plan:?}");
                    assert!(plan.tick_upper <= MAX_TICK, "{plan:?}");
                    assert_eq!(plan.tick_lower % spacing, 0, "{plan:?}");
                    assert_eq!(plan.tick_upper % spacing, 0, "{plan:?}");
                    assert!((200..=4000).contains(&plan.width_ticks), "{plan:?}");
                }
            }
        }
    }
}

#[test]
fn width_grows_with_volatility_between_clamps() {
    let w = |atr: f64| compute_range_plan(0, 10, atr, 2500.0, 50.0).width_ticks;
    assert!(w(10.0) <= w(20.0));
    assert!(w(20.0) <= w(40.0));
    // Inside the clamp band the growth is strict.
    assert!(w(15.0) < w(24.0));
}

#[test]
fn skew_shapes_the_range_around_spot() {
    let neutral = compute_range_plan(0, 1, 25.0, 2500.0, 50.0);
    assert_eq!(-neutral.tick_lower, neutral.tick_upper);

    let overbought = compute_range_plan(0, 1, 25.0, 2500.0, 90.0);
    assert!(-overbought.tick_lower > overbought.tick_upper);

    let oversold = compute_range_plan(0, 1, 25.0, 2500.0, 10.0);
    assert!(-oversold.tick_lower < oversold.tick_upper);
}

#[test]
fn skew_band_edges_are_exclusive() {
    assert_eq!(skew_from_rsi(75.0), 0.5);
    assert_eq!(skew_from_rsi(75.000001), 0.3);
    assert_eq!(skew_from_rsi(25.0), 0.5);
    assert_eq!(skew_from_rsi(24.999999), 0.7);
}

#[test]
fn buffer_factor_never_leaves_its_clamp() {
    for atr in [0.0, 1.0, 100.0, 10_000.0] {
        for price in [1.0, 2500.0, 100_000.0] {
            let f = buffer_factor(atr, price);
            assert!((0.1..=0.8).contains(&f), "factor {f} for atr={atr} price={price}");
        }
    }
}

#[test]
fn twap_matches_floored_average() {
    // 300s of sitting exactly at tick -198080.
    let c0 = -1_000_000_i64;
    let c1 = c0 + (-198_080_i64 * 300);
    assert_eq!(twap_tick(c0, c1, 300), -198_080);
}

#[test]
fn alignment_is_idempotent() {
    for spacing in [1, 10, 60, 200] {
        for tick in [-1000, -1, 0, 1, 999] {
            let once = floor_to_spacing(tick, spacing);
            assert_eq!(floor_to_spacing(once, spacing), once);
        }
    }
}
