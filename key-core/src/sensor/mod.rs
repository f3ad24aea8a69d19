//! Key sensor back-ends and the facade that owns the engine
//!
//! Interrupt handlers and timers never touch the engine. They post a
//! [`SensorMsg`] which the processing context hands to [`KeySensor::process`].

use heapless::spsc::{Consumer, Queue};

use crate::engine::{KeyEngine, KeyEventSink};
use crate::hal::{Clock, HalError};
use crate::types::{KeyConfig, KeySrc};

pub mod debounce_io;
pub mod ext_touch;
pub mod simple_io;
pub mod touch;

pub use debounce_io::DebounceIoBackend;
pub use ext_touch::ExtTouchBackend;
pub use simple_io::SimpleIoBackend;
pub use touch::{TouchBackend, TouchInfo, TouchIsrStats};

/// Back-dating applied to a press that woke the SoC, covering boot latency
pub const WAKE_TIME_OFFSET_MS: u32 = 500;

/// Classifier tick period used by the interrupt-driven back-ends
pub const CHECK_PERIOD_MS: u32 = 100;

/// Message posted into the serialized key processing context
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorMsg {
    /// Key found held while the driver started up
    InitPressed(u16),
    Pressed(u16),
    Released(u16),
    /// Tick timer expired
    CheckEvent,
    /// Enable or disable key input
    SetEnabled(bool),
}

/// Queue depth for ISR hand-off
pub const MSG_QUEUE_LEN: usize = 8;

/// Single-producer queue an interrupt handler fills
pub type MsgQueue = Queue<SensorMsg, MSG_QUEUE_LEN>;

/// Hardware-specific edge source feeding a [`KeyEngine`]
pub trait KeyBackend {
    /// Register the back-end's keys with the engine and arm the hardware
    fn open<C: Clock, S: KeyEventSink>(
        &mut self,
        engine: &mut KeyEngine<C, S>,
        config: &KeyConfig,
    ) -> Result<(), HalError>;

    /// Handle one message in the processing context
    fn handle<C: Clock, S: KeyEventSink>(&mut self, engine: &mut KeyEngine<C, S>, msg: SensorMsg);

    /// Shut down for power-off. With `wakeup_enable` the channels stay
    /// armed as wake sources.
    fn deinit<C: Clock, S: KeyEventSink>(&mut self, engine: &mut KeyEngine<C, S>, wakeup_enable: bool);

    /// Enable or disable key input. Back-ends without a gate accept and ignore it.
    fn set_enabled<C: Clock, S: KeyEventSink>(
        &mut self,
        _engine: &mut KeyEngine<C, S>,
        _enable: bool,
    ) -> Result<(), HalError> {
        Ok(())
    }

    /// Period the processing context should post `CheckEvent` at, if any
    fn tick_period_ms(&self) -> Option<u32>;
}

/// Engine plus the back-end driving it
pub struct KeySensor<C, S, B> {
    engine: KeyEngine<C, S>,
    backend: B,
}

impl<C, S, B> KeySensor<C, S, B>
where
    C: Clock,
    S: KeyEventSink,
    B: KeyBackend,
{
    pub fn new(clock: C, sink: S, backend: B) -> Self {
        Self {
            engine: KeyEngine::new(clock, sink),
            backend,
        }
    }

    /// Apply the timing configuration, then open the back-end
    pub fn open(&mut self, config: &KeyConfig) -> Result<(), HalError> {
        self.engine.set_time_cfg(config.time);
        self.backend.open(&mut self.engine, config)
    }

    pub fn process(&mut self, msg: SensorMsg) {
        trace!("key sensor msg {}", msg);
        match msg {
            SensorMsg::SetEnabled(enable) => {
                if let Err(e) = self.backend.set_enabled(&mut self.engine, enable) {
                    warn!("set enabled {} failed: {}", enable, e);
                }
            }
            msg => self.backend.handle(&mut self.engine, msg),
        }
    }

    /// Process everything queued by interrupt handlers. Returns the
    /// number of messages handled.
    pub fn drain<const N: usize>(&mut self, consumer: &mut Consumer<'_, SensorMsg, N>) -> usize {
        let mut handled = 0;
        while let Some(msg) = consumer.dequeue() {
            self.process(msg);
            handled += 1;
        }
        handled
    }

    /// Engine goes quiet, then the back-end shuts down
    pub fn deinit(&mut self, wakeup_enable: bool) {
        self.engine.deinit();
        self.backend.deinit(&mut self.engine, wakeup_enable);
    }

    pub fn set_enabled(&mut self, enable: bool) -> Result<(), HalError> {
        self.backend.set_enabled(&mut self.engine, enable)
    }

    pub fn all_key_released(&self) -> bool {
        self.engine.all_key_released()
    }

    pub fn is_key_pressed(&self, key_id: u8, key_src: KeySrc) -> bool {
        self.engine.is_key_pressed(key_id, key_src)
    }

    pub fn tick_period_ms(&self) -> Option<u32> {
        self.backend.tick_period_ms()
    }

    pub fn engine(&self) -> &KeyEngine<C, S> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut KeyEngine<C, S> {
        &mut self.engine
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

/// Back-date for the first press after boot: only a wake caused by the
/// back-end's own source was a key press
pub(crate) fn first_press_offset(
    first: &mut bool,
    woke_by: Option<crate::hal::WakeSource>,
    own_source: crate::hal::WakeSource,
) -> u32 {
    if !core::mem::replace(first, false) {
        return 0;
    }
    if woke_by == Some(own_source) {
        info!("first press after wake-up by {}", own_source);
        WAKE_TIME_OFFSET_MS
    } else {
        0
    }
}
