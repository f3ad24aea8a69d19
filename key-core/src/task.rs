//! Embassy integration: the serialized key processing task

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant, Timer};

use crate::engine::KeyEventSink;
use crate::hal::Clock;
use crate::sensor::{KeyBackend, KeySensor, SensorMsg};

/// Channel interrupt handlers post key messages into
pub type KeyChannel<M, const N: usize> = Channel<M, SensorMsg, N>;

/// Wait for the next message or tick deadline and process it.
///
/// `next_tick` carries the tick deadline between calls so a burst of
/// edges does not push the classifier tick back.
pub async fn key_task_step<M, const N: usize, C, S, B>(
    sensor: &mut KeySensor<C, S, B>,
    channel: &KeyChannel<M, N>,
    next_tick: &mut Option<Instant>,
) where
    M: RawMutex,
    C: Clock,
    S: KeyEventSink,
    B: KeyBackend,
{
    let period = sensor.tick_period_ms().map(|ms| Duration::from_millis(ms.into()));
    match (period, *next_tick) {
        (None, _) => *next_tick = None,
        (Some(p), None) => *next_tick = Some(Instant::now() + p),
        (Some(_), Some(_)) => {}
    }

    let msg = match (*next_tick, period) {
        (Some(deadline), Some(p)) => match select(channel.receive(), Timer::at(deadline)).await {
            Either::First(msg) => msg,
            Either::Second(()) => {
                *next_tick = Some(deadline + p);
                SensorMsg::CheckEvent
            }
        },
        _ => channel.receive().await,
    };

    sensor.process(msg);
}

/// Key processing loop; never returns
pub async fn key_task<M, const N: usize, C, S, B>(
    mut sensor: KeySensor<C, S, B>,
    channel: &KeyChannel<M, N>,
) -> !
where
    M: RawMutex,
    C: Clock,
    S: KeyEventSink,
    B: KeyBackend,
{
    info!("key task started");
    let mut next_tick = None;
    loop {
        key_task_step(&mut sensor, channel, &mut next_tick).await;
    }
}

/// Non-blocking post for interrupt handlers. Returns false when the
/// channel is full and the message was dropped.
pub fn post_from_isr<M: RawMutex, const N: usize>(channel: &KeyChannel<M, N>, msg: SensorMsg) -> bool {
    match channel.try_send(msg) {
        Ok(()) => true,
        Err(_) => {
            warn!("key channel full, {} dropped", msg);
            false
        }
    }
}
