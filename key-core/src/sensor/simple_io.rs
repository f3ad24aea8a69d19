//! Polled GPIO back-end for boards without a debounce controller

use embedded_hal::digital::InputPin;
use heapless::Vec;

use super::{KeyBackend, SensorMsg};
use crate::engine::{KeyEngine, KeyEventSink};
use crate::hal::{Clock, HalError};
use crate::types::{KeyConfig, KeySrc, MAX_KEY_NUM};

/// Pin sampling period
pub const POLL_PERIOD_MS: u32 = 10;

struct PolledKey<P> {
    key_id: u8,
    io_id: u16,
    pin: P,
    active_low: bool,
    /// Debounced level, true when pressed
    stable: bool,
    /// Consecutive samples disagreeing with `stable`
    count: u8,
    registered: bool,
}

/// Samples input pins on every tick and debounces them in software
pub struct SimpleIoBackend<P> {
    keys: Vec<PolledKey<P>, MAX_KEY_NUM>,
    samples: u8,
    polling: bool,
}

impl<P: InputPin> SimpleIoBackend<P> {
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            samples: 1,
            polling: false,
        }
    }

    /// Attach a pin for a logical IO key. `active_low` for pull-up wiring.
    pub fn add_pin(&mut self, key_id: u8, io_id: u16, pin: P, active_low: bool) -> Result<(), HalError> {
        self.keys
            .push(PolledKey {
                key_id,
                io_id,
                pin,
                active_low,
                stable: false,
                count: 0,
                registered: false,
            })
            .map_err(|_| HalError::InvalidConfig)
    }

    /// Stable samples required before an edge is reported
    pub fn samples(&self) -> u8 {
        self.samples
    }

    fn sample(key: &mut PolledKey<P>) -> Result<bool, HalError> {
        let high = key.pin.is_high().map_err(|_| HalError::GpioError)?;
        Ok(high != key.active_low)
    }

    fn poll<C: Clock, S: KeyEventSink>(&mut self, engine: &mut KeyEngine<C, S>) {
        let samples = self.samples;
        for key in self.keys.iter_mut().filter(|k| k.registered) {
            let level = match Self::sample(key) {
                Ok(level) => level,
                Err(e) => {
                    error!("read io {} failed: {}", key.io_id, e);
                    continue;
                }
            };

            if level == key.stable {
                key.count = 0;
                continue;
            }
            key.count += 1;
            if key.count < samples {
                continue;
            }

            key.count = 0;
            key.stable = level;
            if level {
                engine.pressed(key.io_id, 0);
            } else {
                engine.released(key.io_id);
            }
        }
        engine.check_type();
    }
}

impl<P: InputPin> Default for SimpleIoBackend<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: InputPin> KeyBackend for SimpleIoBackend<P> {
    fn open<C: Clock, S: KeyEventSink>(
        &mut self,
        engine: &mut KeyEngine<C, S>,
        config: &KeyConfig,
    ) -> Result<(), HalError> {
        self.samples = (config.time.debounce_time / POLL_PERIOD_MS).clamp(1, u8::MAX as u32) as u8;

        for key in config.id.with_src(KeySrc::Io) {
            let Some(polled) = self.keys.iter_mut().find(|k| k.key_id == key.id) else {
                info!("no pin attached for key {}", key.id);
                continue;
            };
            if engine.register(key.id, KeySrc::Io, polled.io_id).is_ok() {
                polled.registered = true;
            }
        }

        info!("simple io: {} samples of {} ms", self.samples, POLL_PERIOD_MS);
        self.polling = true;
        Ok(())
    }

    fn handle<C: Clock, S: KeyEventSink>(&mut self, engine: &mut KeyEngine<C, S>, msg: SensorMsg) {
        match msg {
            SensorMsg::CheckEvent => {
                if self.polling {
                    self.poll(engine);
                }
            }
            SensorMsg::InitPressed(io) | SensorMsg::Pressed(io) => engine.pressed(io, 0),
            SensorMsg::Released(io) => engine.released(io),
            SensorMsg::SetEnabled(_) => {}
        }
    }

    fn deinit<C: Clock, S: KeyEventSink>(&mut self, _engine: &mut KeyEngine<C, S>, wakeup_enable: bool) {
        info!("simple io deinit, wakeup {}", wakeup_enable);
        self.polling = false;
    }

    fn tick_period_ms(&self) -> Option<u32> {
        self.polling.then_some(POLL_PERIOD_MS)
    }
}
