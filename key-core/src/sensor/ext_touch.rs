//! Back-end for an external touch or force sensing IC
//!
//! The IC drives a single output line into the debounce controller, so
//! edges arrive like debounced GPIO edges but the key is registered
//! under [`KeySrc::External`] and input can be gated off at runtime.

use super::{first_press_offset, KeyBackend, SensorMsg, CHECK_PERIOD_MS, WAKE_TIME_OFFSET_MS};
use crate::engine::{KeyEngine, KeyEventSink};
use crate::hal::{Clock, HalError, KeyResources, TickTimer, WakeSource};
use crate::types::{CheckResult, KeyConfig, KeySrc};

pub struct ExtTouchBackend<T, R> {
    timer: T,
    resources: R,
    woke_by: Option<WakeSource>,
    first_intr: bool,
    shutdown: bool,
    enabled: bool,
    io: Option<u16>,
}

impl<T, R> ExtTouchBackend<T, R>
where
    T: TickTimer,
    R: KeyResources,
{
    pub fn new(timer: T, resources: R, woke_by: Option<WakeSource>) -> Self {
        Self {
            timer,
            resources,
            woke_by,
            first_intr: true,
            shutdown: false,
            enabled: true,
            io: None,
        }
    }

    /// Output line of the IC once opened
    pub fn io(&self) -> Option<u16> {
        self.io
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn resources(&self) -> &R {
        &self.resources
    }

    fn start_timer(&mut self) {
        if !self.timer.is_active() {
            self.timer.start(CHECK_PERIOD_MS);
            info!("start ext touch timer");
        }
    }
}

impl<T, R> KeyBackend for ExtTouchBackend<T, R>
where
    T: TickTimer,
    R: KeyResources,
{
    /// Binds the first external key in the configuration. The IC has a
    /// single output line, so further external keys are ignored.
    fn open<C: Clock, S: KeyEventSink>(
        &mut self,
        engine: &mut KeyEngine<C, S>,
        config: &KeyConfig,
    ) -> Result<(), HalError> {
        let key = match config.id.with_src(KeySrc::External).next() {
            Some(key) => key,
            None => {
                info!("no external touch key configured");
                return Ok(());
            }
        };
        let io = match self.resources.lookup(key.id, KeySrc::External) {
            Some(io) => io,
            None => {
                error!("no ext touch output for key {}", key.id);
                return Err(HalError::NotInitialized);
            }
        };
        info!("ext touch: key {} io {}", key.id, io);

        engine
            .register(key.id, KeySrc::External, io)
            .map_err(|_| HalError::InvalidConfig)?;
        self.resources.enable(io, KeySrc::External, config.time.debounce_time)?;
        self.io = Some(io);
        Ok(())
    }

    fn handle<C: Clock, S: KeyEventSink>(&mut self, engine: &mut KeyEngine<C, S>, msg: SensorMsg) {
        match msg {
            SensorMsg::InitPressed(io) => {
                engine.pressed(io, WAKE_TIME_OFFSET_MS);
                self.start_timer();
            }
            SensorMsg::Pressed(io) => {
                if self.shutdown || !self.enabled {
                    return;
                }
                let offset = first_press_offset(&mut self.first_intr, self.woke_by, WakeSource::Debounce);
                engine.pressed(io, offset);
                self.start_timer();
            }
            SensorMsg::Released(io) => {
                if self.enabled {
                    engine.released(io);
                }
            }
            SensorMsg::CheckEvent => {
                if self.shutdown {
                    return;
                }
                if engine.check_type() == CheckResult::Done && self.timer.is_active() {
                    self.timer.stop();
                    info!("stop ext touch timer");
                }
            }
            SensorMsg::SetEnabled(_) => {}
        }
    }

    fn deinit<C: Clock, S: KeyEventSink>(&mut self, _engine: &mut KeyEngine<C, S>, wakeup_enable: bool) {
        info!("ext touch deinit, wakeup {}", wakeup_enable);
        self.shutdown = true;
        self.timer.stop();

        if !wakeup_enable {
            if let Some(io) = self.io {
                if let Err(e) = self.resources.disable(io, KeySrc::External) {
                    error!("disable ext touch io {} failed: {}", io, e);
                }
            }
        }
    }

    /// Disabling releases a held key and drops edges until re-enabled
    fn set_enabled<C: Clock, S: KeyEventSink>(
        &mut self,
        engine: &mut KeyEngine<C, S>,
        enable: bool,
    ) -> Result<(), HalError> {
        info!("ext touch enabled {}", enable);
        if !enable {
            if let Some(io) = self.io {
                engine.released(io);
            }
        }
        self.enabled = enable;
        Ok(())
    }

    fn tick_period_ms(&self) -> Option<u32> {
        self.timer.period_ms()
    }
}
