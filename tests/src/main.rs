// Gesture replay demo: feeds scripted edges through the engine and prints what comes out

use key_core::hal::mock::MockClock;
use key_core::test_utils::*;
use key_core::{KeyEvent, KeySrc, KeyTimeConfig};

fn main() {
    println!("🎧 TWS Key Engine Gesture Replay");
    println!();

    demo(
        "Single tap",
        &[ScriptStep::press(0, 5), ScriptStep::release(90, 5)],
    );
    demo(
        "Triple tap",
        &[
            ScriptStep::press(0, 5),
            ScriptStep::release(80, 5),
            ScriptStep::press(180, 5),
            ScriptStep::release(260, 5),
            ScriptStep::press(360, 5),
            ScriptStep::release(440, 5),
        ],
    );
    demo(
        "Long hold",
        &[ScriptStep::press(0, 5), ScriptStep::release(4500, 5)],
    );
    demo(
        "Two-key chord",
        &[
            ScriptStep::press(0, 5),
            ScriptStep::press(40, 6),
            ScriptStep::release(200, 5),
            ScriptStep::release(260, 6),
        ],
    );

    println!("✅ Replay finished");
    println!();
    println!("📝 Run the test suite with: cargo test");
}

fn demo(title: &str, steps: &[ScriptStep]) {
    println!("▶ {}", title);

    let clock = MockClock::new();
    let mut engine = test_engine(&clock);
    engine.set_time_cfg(KeyTimeConfig {
        repeat_start_time: 30_000,
        multi_tap_interval: 200,
        ..KeyTimeConfig::default()
    });
    for (key_id, io) in [(0u8, 5u16), (1, 6)] {
        if let Err(e) = engine.register(key_id, KeySrc::Io, io) {
            println!("  ❌ register key {}: {}", key_id, e);
            return;
        }
    }

    replay(&mut engine, steps, 50, 400);

    for event in engine.sink().events() {
        println!("  {}", describe(event));
    }
    println!();
}

fn describe(event: &KeyEvent) -> String {
    let kind = event.key_type().map(|t| t.name()).unwrap_or("?");
    let keys: Vec<String> = event
        .keys()
        .iter()
        .map(|k| format!("{}/{:?}", k.key_id, k.key_src))
        .collect();
    if event.is_combined() {
        format!("🎹 {} [{}]", kind, keys.join(" + "))
    } else {
        format!("🔘 {} [{}]", kind, keys.join(""))
    }
}
