//! Async tests for the embassy key task, using the std time driver

use std::sync::{Arc, Mutex};
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use key_core::hal::mock::MockResources;
use key_core::sensor::DebounceIoBackend;
use key_core::task::{key_task, key_task_step, post_from_isr, KeyChannel};
use key_core::{
    EmbassyClock, KeyConfig, KeyEvent, KeyIdConfig, KeySensor, KeySrc, KeyThresholdConfig,
    KeyTimeConfig, KeyType, SensorMsg, SoftTimer,
};

type Events = Arc<Mutex<Vec<KeyEvent>>>;

fn sensor(
    events: &Events,
) -> KeySensor<EmbassyClock, impl FnMut(&KeyEvent), DebounceIoBackend<SoftTimer, MockResources>> {
    let events = events.clone();
    let sink = move |e: &KeyEvent| events.lock().unwrap().push(e.clone());
    let backend = DebounceIoBackend::new(
        SoftTimer::new(),
        MockResources::new(&[(0, KeySrc::Io, 4)]),
        None,
    );
    let mut sensor = KeySensor::new(EmbassyClock, sink, backend);
    sensor
        .open(&KeyConfig {
            id: KeyIdConfig::from_pairs(&[(0, KeySrc::Io)]).unwrap(),
            time: KeyTimeConfig { multi_tap_interval: 200, ..KeyTimeConfig::default() },
            thres: KeyThresholdConfig::default(),
        })
        .unwrap();
    sensor
}

fn types(events: &Events) -> Vec<KeyType> {
    events.lock().unwrap().iter().filter_map(|e| e.key_type()).collect()
}

/// Test a tap resolved by the task's own tick
#[tokio::test]
async fn test_task_step_ticks_until_done() {
    println!("🕒 Testing key task tick scheduling...");
    let events = Events::default();
    let mut sensor = sensor(&events);
    let channel = KeyChannel::<CriticalSectionRawMutex, 8>::new();
    let mut next_tick = None;

    assert!(post_from_isr(&channel, SensorMsg::Pressed(4)));
    key_task_step(&mut sensor, &channel, &mut next_tick).await;
    assert_eq!(sensor.tick_period_ms(), Some(100));

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(post_from_isr(&channel, SensorMsg::Released(4)));
    key_task_step(&mut sensor, &channel, &mut next_tick).await;

    let mut steps = 0;
    while sensor.tick_period_ms().is_some() && steps < 20 {
        key_task_step(&mut sensor, &channel, &mut next_tick).await;
        steps += 1;
    }

    assert!(sensor.tick_period_ms().is_none());
    assert_eq!(
        types(&events),
        [KeyType::Press, KeyType::Release, KeyType::Short, KeyType::Single]
    );
    println!("  ✅ single tap resolved after {} ticks", steps);
}

/// Test channel overflow from an interrupt handler
#[tokio::test]
async fn test_post_from_isr_overflow() {
    let channel: Channel<CriticalSectionRawMutex, SensorMsg, 2> = Channel::new();

    assert!(post_from_isr(&channel, SensorMsg::Pressed(1)));
    assert!(post_from_isr(&channel, SensorMsg::Released(1)));
    assert!(!post_from_isr(&channel, SensorMsg::CheckEvent));

    assert_eq!(channel.receive().await, SensorMsg::Pressed(1));
    assert!(post_from_isr(&channel, SensorMsg::CheckEvent));
}

/// Test the endless task loop under a timeout
#[tokio::test]
async fn test_key_task_loop() {
    let events = Events::default();
    let sensor = sensor(&events);
    let channel = KeyChannel::<CriticalSectionRawMutex, 8>::new();

    post_from_isr(&channel, SensorMsg::Pressed(4));
    post_from_isr(&channel, SensorMsg::Released(4));

    let result = tokio::time::timeout(Duration::from_millis(700), key_task(sensor, &channel)).await;
    assert!(result.is_err());
    assert_eq!(types(&events).last(), Some(&KeyType::Single));
}
