//! Chorded (combined) key tests across three keys

use key_core::hal::mock::MockClock;
use key_core::test_utils::*;
use key_core::{CombinedState, KeySrc, KeyTimeConfig, KeyType};

const A: (u8, KeySrc, u16) = (1, KeySrc::Io, 5);
const B: (u8, KeySrc, u16) = (2, KeySrc::Touch, 3);
const C: (u8, KeySrc, u16) = (0, KeySrc::External, 9);

fn engine(clock: &MockClock) -> TestEngine<'_> {
    let mut engine = test_engine(clock);
    engine.set_time_cfg(KeyTimeConfig {
        repeat_start_time: 30_000,
        multi_tap_interval: 200,
        ..KeyTimeConfig::default()
    });
    for (id, src, io) in [A, B, C] {
        engine.register(id, src, io).unwrap();
    }
    engine
}

#[test]
fn test_three_key_chord() {
    println!("🎹 Testing three key chord...");
    let clock = MockClock::new();
    let mut engine = engine(&clock);

    replay(
        &mut engine,
        &[
            ScriptStep::press(0, A.2),
            ScriptStep::press(30, B.2),
            ScriptStep::press(60, C.2),
            ScriptStep::release(200, B.2),
            ScriptStep::release(250, A.2),
            ScriptStep::release(300, C.2),
        ],
        50,
        600,
    );

    let chords = engine.sink().combined();
    assert_eq!(chords.len(), 1);
    assert_eq!(chords[0].len(), 3);
    assert_eq!(chords[0].key_type(), Some(KeyType::Short));
    for (id, src, _) in [A, B, C] {
        assert!(chords[0].contains(id, src));
    }

    // C joined an open chord, so its PRESS was never reported
    assert_eq!(engine.sink().types_for(B.0, B.1), [KeyType::Press]);
    assert_eq!(
        engine.sink().types_for(A.0, A.1),
        [KeyType::Press, KeyType::Release, KeyType::Short]
    );
    assert_eq!(engine.sink().types_for(C.0, C.1), [KeyType::Release, KeyType::Short]);
    assert_eq!(engine.sink().count_of(KeyType::Single), 0);
    assert_eq!(engine.combined_state(), CombinedState::Init);
    println!("  ✅ one combined SHORT for three keys");
}

#[test]
fn test_chord_escalates_to_vvlong() {
    let clock = MockClock::new();
    let mut engine = engine(&clock);

    replay(
        &mut engine,
        &[
            ScriptStep::press(0, A.2),
            ScriptStep::press(100, B.2),
            ScriptStep::release(9200, A.2),
            ScriptStep::release(9300, B.2),
        ],
        100,
        500,
    );

    let chord_types: Vec<KeyType> = engine
        .sink()
        .combined()
        .iter()
        .filter_map(|e| e.key_type())
        .collect();
    assert_eq!(chord_types, [KeyType::Long, KeyType::VeryLong, KeyType::VeryVeryLong]);

    // VeryVeryLongRelease closes the chord without an event
    assert_eq!(
        engine.sink().types_for(B.0, B.1),
        [KeyType::Press, KeyType::Release, KeyType::VeryVeryLongRelease]
    );
    assert_eq!(engine.sink().types_for(A.0, A.1), [KeyType::Press]);
}

#[test]
fn test_chord_swallows_open_tap_window() {
    let clock = MockClock::new();
    let mut engine = engine(&clock);

    replay(
        &mut engine,
        &[
            ScriptStep::press(0, A.2),
            ScriptStep::release(50, A.2),
            ScriptStep::press(100, B.2),
            ScriptStep::press(120, C.2),
            ScriptStep::release(300, B.2),
            ScriptStep::release(320, C.2),
        ],
        50,
        600,
    );

    let chords = engine.sink().combined();
    assert_eq!(chords.len(), 1);
    assert!(!chords[0].contains(A.0, A.1));
    assert_eq!(chords[0].len(), 2);
    assert!(!engine.sink().types_for(A.0, A.1).contains(&KeyType::Single));
}

#[test]
fn test_single_keys_resume_after_chord() {
    let clock = MockClock::new();
    let mut engine = engine(&clock);

    replay(
        &mut engine,
        &[
            ScriptStep::press(0, A.2),
            ScriptStep::press(20, B.2),
            ScriptStep::release(100, A.2),
            ScriptStep::release(150, B.2),
            // everything idle by now
            ScriptStep::press(1000, C.2),
            ScriptStep::release(1080, C.2),
        ],
        50,
        400,
    );

    assert_eq!(engine.sink().combined().len(), 1);
    assert_eq!(
        engine.sink().types_for(C.0, C.1),
        [KeyType::Press, KeyType::Release, KeyType::Short, KeyType::Single]
    );
}

#[test]
fn test_chord_during_shutdown_is_silent() {
    let clock = MockClock::new();
    let mut engine = engine(&clock);
    engine.deinit();

    replay(
        &mut engine,
        &[
            ScriptStep::press(0, A.2),
            ScriptStep::press(20, B.2),
            ScriptStep::release(1700, A.2),
            ScriptStep::release(1750, B.2),
        ],
        100,
        400,
    );

    assert!(engine.sink().events().is_empty());
    assert!(engine.all_key_released());
    assert_eq!(engine.combined_state(), CombinedState::Init);
}
