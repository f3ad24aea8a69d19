//! Single-key gesture tests: taps, holds, repeats

use key_core::hal::mock::MockClock;
use key_core::test_utils::*;
use key_core::{CheckResult, KeySrc, KeyTimeConfig, KeyType};
use rstest::rstest;

const IO: u16 = 5;
const KEY: u8 = 1;

fn timing() -> KeyTimeConfig {
    KeyTimeConfig {
        long_time: 1500,
        vlong_time: 4000,
        vvlong_time: 8000,
        repeat_start_time: 30_000,
        repeat_rate: 500,
        multi_tap_interval: 200,
        debounce_time: 20,
    }
}

fn engine(clock: &MockClock) -> TestEngine<'_> {
    let mut engine = test_engine(clock);
    engine.set_time_cfg(timing());
    engine.register(KEY, KeySrc::Io, IO).unwrap();
    engine
}

#[rstest]
#[case(1, KeyType::Single)]
#[case(2, KeyType::Double)]
#[case(3, KeyType::Triple)]
#[case(4, KeyType::Quadruple)]
#[case(5, KeyType::Quintuple)]
#[case(6, KeyType::Sextuple)]
fn test_multi_tap_counts(#[case] taps: u32, #[case] expected: KeyType) {
    let clock = MockClock::new();
    let mut engine = engine(&clock);

    let mut steps = Vec::new();
    for i in 0..taps {
        steps.push(ScriptStep::press(i * 150, IO));
        steps.push(ScriptStep::release(i * 150 + 60, IO));
    }
    replay(&mut engine, &steps, 50, 400);

    let types = engine.sink().types_for(KEY, KeySrc::Io);
    assert_eq!(types.iter().filter(|t| **t == KeyType::Short).count(), taps as usize);
    assert_eq!(types.iter().filter(|t| t.is_multi_tap()).count(), 1);
    assert_eq!(types.last(), Some(&expected));
    println!("  ✅ {} taps -> {}", taps, expected.name());
}

#[rstest]
#[case(100, &[], KeyType::Short)]
#[case(1600, &[KeyType::Long], KeyType::LongRelease)]
#[case(4500, &[KeyType::Long, KeyType::VeryLong], KeyType::VeryLongRelease)]
#[case(
    9000,
    &[KeyType::Long, KeyType::VeryLong, KeyType::VeryVeryLong],
    KeyType::VeryVeryLongRelease
)]
fn test_hold_classification(
    #[case] hold_ms: u32,
    #[case] escalations: &[KeyType],
    #[case] release: KeyType,
) {
    let clock = MockClock::new();
    let mut engine = engine(&clock);

    replay(&mut engine, &[ScriptStep::press(0, IO), ScriptStep::release(hold_ms, IO)], 100, 400);

    let types = engine.sink().single_types();
    let fired: Vec<KeyType> = types.iter().copied().filter(|t| t.is_escalation()).collect();
    assert_eq!(fired, escalations);

    let release_at = types.iter().position(|t| *t == KeyType::Release).unwrap();
    assert_eq!(types[release_at + 1], release);

    // only a short press feeds multi-tap
    let expect_single = release == KeyType::Short;
    assert_eq!(types.contains(&KeyType::Single), expect_single);
}

#[test]
fn test_earbud_single_tap_scenario() {
    println!("🎧 Testing single tap on io 5...");
    let clock = MockClock::new();
    let mut engine = engine(&clock);

    engine.pressed(IO, 0);
    clock.set(100);
    engine.released(IO);
    clock.set(300);
    assert_eq!(engine.check_type(), CheckResult::Done);

    assert_eq!(
        engine.sink().single_types(),
        [KeyType::Press, KeyType::Release, KeyType::Short, KeyType::Single]
    );
    for event in engine.sink().events() {
        assert_eq!(event.keys()[0].key_id, KEY);
        assert_eq!(event.keys()[0].key_src, KeySrc::Io);
    }
    println!("  ✅ PRESS, RELEASE, SHORT, SINGLE");
}

#[test]
fn test_repeat_rate() {
    let clock = MockClock::new();
    let mut engine = engine(&clock);
    engine.set_time_cfg(KeyTimeConfig {
        repeat_start_time: 600,
        repeat_rate: 200,
        ..timing()
    });

    engine.pressed(IO, 0);
    // armed at 700, then every 200 ms up to 1500
    tick_for(&mut engine, 1500, 100);
    assert_eq!(engine.sink().count_of(KeyType::Repeat), 4);
    assert_eq!(engine.sink().count_of(KeyType::Long), 1);
}

#[test]
fn test_late_press_report() {
    let clock = MockClock::new();
    let mut engine = engine(&clock);

    // press seen 500 ms late after wake-up
    replay(
        &mut engine,
        &[
            ScriptStep { at: 600, edge: Edge::PressLate(IO, 500) },
            ScriptStep::release(1800, IO),
        ],
        100,
        400,
    );

    assert_eq!(engine.sink().count_of(KeyType::Long), 1);
    assert_eq!(engine.sink().count_of(KeyType::LongRelease), 1);
}

#[test]
fn test_multi_tap_window_bound() {
    let clock = MockClock::new();
    let mut engine = engine(&clock);

    // second tap lands after the window closed: two singles
    replay(
        &mut engine,
        &[
            ScriptStep::press(0, IO),
            ScriptStep::release(50, IO),
            ScriptStep::press(400, IO),
            ScriptStep::release(450, IO),
        ],
        50,
        400,
    );

    assert_eq!(engine.sink().count_of(KeyType::Single), 2);
    assert_eq!(engine.sink().count_of(KeyType::Double), 0);
}
