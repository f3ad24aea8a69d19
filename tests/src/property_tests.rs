//! Property tests: clock arithmetic and gesture invariants over random input

use key_core::hal::mock::MockClock;
use key_core::test_utils::*;
use key_core::{clk_diff, CheckResult, KeySrc, KeyTimeConfig, KeyType};
use proptest::prelude::*;

const IOS: [u16; 3] = [5, 6, 7];

fn engine(clock: &MockClock) -> TestEngine<'_> {
    let mut engine = test_engine(clock);
    engine.set_time_cfg(KeyTimeConfig {
        long_time: 1500,
        vlong_time: 4000,
        vvlong_time: 8000,
        repeat_start_time: 1000,
        repeat_rate: 500,
        multi_tap_interval: 200,
        debounce_time: 20,
    });
    for (i, io) in IOS.iter().enumerate() {
        engine.register(i as u8, KeySrc::Io, *io).unwrap();
    }
    engine
}

proptest! {
    #[test]
    fn prop_clk_diff_survives_wrap(start in any::<u32>(), elapsed in any::<u32>()) {
        prop_assert_eq!(clk_diff(start.wrapping_add(elapsed), start), elapsed);
    }

    #[test]
    fn prop_duplicate_presses_ignored(repeats in 1usize..10, gap in 1u32..400) {
        let clock = MockClock::new();
        let mut engine = engine(&clock);

        engine.pressed(IOS[2], 0);
        for _ in 0..repeats {
            clock.advance(gap);
            engine.pressed(IOS[2], 0);
        }

        prop_assert_eq!(engine.press_time(IOS[2]), Some(0));
        prop_assert_eq!(engine.sink().count_of(KeyType::Press), 1);
    }

    #[test]
    fn prop_taps_resolve_to_count(
        start in any::<u32>(),
        taps in prop::collection::vec((10u32..1400, 10u32..190), 1..=6),
    ) {
        let clock = MockClock::starting_at(start);
        let mut engine = engine(&clock);

        let mut steps = Vec::new();
        let mut t = 0;
        for (hold, gap) in taps.iter() {
            steps.push(ScriptStep::press(t, IOS[0]));
            t += hold;
            steps.push(ScriptStep::release(t, IOS[0]));
            t += gap;
        }
        replay(&mut engine, &steps, 10, 400);

        let types = engine.sink().single_types();
        let expected = KeyType::from_tap_count(taps.len() as u32).unwrap();
        prop_assert_eq!(types.iter().filter(|t| t.is_multi_tap()).count(), 1);
        prop_assert_eq!(types.last(), Some(&expected));
        prop_assert_eq!(types.iter().filter(|t| **t == KeyType::Short).count(), taps.len());
    }

    #[test]
    fn prop_escalations_in_order_once(hold in 0u32..12_000) {
        let clock = MockClock::new();
        let mut engine = engine(&clock);

        replay(&mut engine, &[ScriptStep::press(0, IOS[1]), ScriptStep::release(hold, IOS[1])], 50, 400);

        let fired: Vec<KeyType> = engine
            .sink()
            .single_types()
            .into_iter()
            .filter(|t| t.is_escalation())
            .collect();
        let tiers = [KeyType::Long, KeyType::VeryLong, KeyType::VeryVeryLong];
        prop_assert!(fired.len() <= 3);
        prop_assert_eq!(&fired[..], &tiers[..fired.len()]);

        let released = engine.time_cfg().classify_release(hold);
        prop_assert_eq!(engine.sink().count_of(released), 1);
    }

    #[test]
    fn prop_random_edges_settle(
        edges in prop::collection::vec((0usize..3, any::<bool>(), 0u32..3000), 0..40),
    ) {
        let clock = MockClock::new();
        let mut engine = engine(&clock);

        for (key, press, wait) in edges {
            if press {
                engine.pressed(IOS[key], 0);
            } else {
                engine.released(IOS[key]);
            }
            tick_for(&mut engine, wait, 100);
        }
        for io in IOS {
            engine.released(io);
        }

        prop_assert!(engine.all_key_released());
        prop_assert!(tick_until_idle(&mut engine, 100, 1000).is_some());
        prop_assert_eq!(engine.check_type(), CheckResult::Done);

        // every event names registered keys only
        for event in engine.sink().events() {
            prop_assert!(!event.is_empty());
            for info in event.keys() {
                prop_assert!((info.key_id as usize) < IOS.len());
            }
        }
    }
}
