// ABOUTME: Property tests for traffic split resolution.
// ABOUTME: Accepted splits always total exactly 100; everything else is rejected unchanged.

use fleetflip::traffic::{
    InvalidSplitError, TOTAL_WEIGHT, TrafficSplit, WeightedColor, resolve,
};
use fleetflip::types::Color;
use proptest::prelude::*;

fn color() -> impl Strategy<Value = Color> {
    prop_oneof![Just(Color::Blue), Just(Color::Green)]
}

proptest! {
    #[test]
    fn two_color_splits_resolve_iff_they_sum_to_total(
        active in color(),
        a in 0u32..=200,
        b in 0u32..=200,
    ) {
        let split = TrafficSplit::canary(active, a, b);
        match resolve(active, &split) {
            Ok(resolved) => {
                prop_assert_eq!(a + b, TOTAL_WEIGHT);
                prop_assert_eq!(resolved, split);
            }
            Err(e) => {
                prop_assert_ne!(a + b, TOTAL_WEIGHT);
                prop_assert_eq!(e, InvalidSplitError::WeightSum { sum: u64::from(a + b) });
            }
        }
    }

    #[test]
    fn resolved_weights_cover_both_colors(active in color(), standby in 0u32..=100) {
        let split = TrafficSplit::canary(active, TOTAL_WEIGHT - standby, standby);
        let resolved = resolve(active, &split).unwrap();
        let total = resolved.weight_of(Color::Blue, active) + resolved.weight_of(Color::Green, active);
        prop_assert_eq!(total, TOTAL_WEIGHT);
        prop_assert_eq!(resolved.weight_of(active.other(), active), standby);
    }

    #[test]
    fn display_parses_back(active in color(), standby in 0u32..=100) {
        let split = TrafficSplit::canary(active, TOTAL_WEIGHT - standby, standby);
        let parsed: TrafficSplit = split.to_string().parse().unwrap();
        prop_assert_eq!(parsed, split);
    }

    #[test]
    fn huge_weights_do_not_overflow(w in (u32::MAX - 10)..=u32::MAX) {
        let split = TrafficSplit::canary(Color::Blue, w, w);
        prop_assert_eq!(
            resolve(Color::Blue, &split),
            Err(InvalidSplitError::WeightSum { sum: u64::from(w) * 2 })
        );
    }
}

#[test]
fn empty_split_is_all_to_active() {
    for active in Color::ALL {
        let resolved = resolve(active, &TrafficSplit::empty()).unwrap();
        assert_eq!(resolved.entries(), &[WeightedColor::new(active, TOTAL_WEIGHT)]);
    }
}

#[test]
fn single_color_at_full_weight_is_accepted() {
    let split = TrafficSplit::new(vec![WeightedColor::new(Color::Green, 100)]);
    assert_eq!(resolve(Color::Blue, &split).unwrap(), split);
}

#[test]
fn malformed_entries_are_reported() {
    assert_eq!(
        "blue:90".parse::<TrafficSplit>(),
        Err(InvalidSplitError::Malformed("blue:90".to_string()))
    );
    assert_eq!(
        "blue=ninety".parse::<TrafficSplit>(),
        Err(InvalidSplitError::Malformed("blue=ninety".to_string()))
    );
}
