//! Back-end for GPIO keys behind the hardware debounce controller

use heapless::Vec;

use super::{first_press_offset, KeyBackend, SensorMsg, CHECK_PERIOD_MS, WAKE_TIME_OFFSET_MS};
use crate::engine::{KeyEngine, KeyEventSink};
use crate::hal::{Clock, HalError, KeyResources, TickTimer, WakeSource};
use crate::types::{CheckResult, KeyConfig, KeySrc, MAX_KEY_NUM};

/// Debounced GPIO key driver.
///
/// The debounce controller reports clean edges, so this back-end only
/// manages the tick timer and the wake-up back-dating.
pub struct DebounceIoBackend<T, R> {
    timer: T,
    resources: R,
    woke_by: Option<WakeSource>,
    first_intr: bool,
    shutdown: bool,
    ios: Vec<u16, MAX_KEY_NUM>,
}

impl<T, R> DebounceIoBackend<T, R>
where
    T: TickTimer,
    R: KeyResources,
{
    /// `woke_by` is the wake source when booting from sleep, `None` on a cold boot
    pub fn new(timer: T, resources: R, woke_by: Option<WakeSource>) -> Self {
        Self {
            timer,
            resources,
            woke_by,
            first_intr: true,
            shutdown: false,
            ios: Vec::new(),
        }
    }

    /// GPIOs armed by `open`
    pub fn ios(&self) -> &[u16] {
        &self.ios
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn resources(&self) -> &R {
        &self.resources
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    fn start_timer(&mut self) {
        // other keys may still be mid-gesture with the timer running
        if !self.timer.is_active() {
            self.timer.start(CHECK_PERIOD_MS);
            info!("start debounce io timer");
        }
    }
}

impl<T, R> KeyBackend for DebounceIoBackend<T, R>
where
    T: TickTimer,
    R: KeyResources,
{
    fn open<C: Clock, S: KeyEventSink>(
        &mut self,
        engine: &mut KeyEngine<C, S>,
        config: &KeyConfig,
    ) -> Result<(), HalError> {
        for key in config.id.with_src(KeySrc::Io) {
            let io = match self.resources.lookup(key.id, KeySrc::Io) {
                Some(io) => io,
                None => {
                    info!("no gpio fitted for key {}", key.id);
                    continue;
                }
            };
            info!("debounce: key {} io {}", key.id, io);

            if engine.register(key.id, KeySrc::Io, io).is_err() {
                continue;
            }
            self.resources.enable(io, KeySrc::Io, config.time.debounce_time)?;
            if !self.ios.contains(&io) && self.ios.push(io).is_err() {
                debug_assert!(false, "debounce io table overflow");
            }
        }
        Ok(())
    }

    fn handle<C: Clock, S: KeyEventSink>(&mut self, engine: &mut KeyEngine<C, S>, msg: SensorMsg) {
        match msg {
            SensorMsg::InitPressed(io) => {
                engine.pressed(io, WAKE_TIME_OFFSET_MS);
                self.start_timer();
            }
            SensorMsg::Pressed(io) => {
                if self.shutdown {
                    return;
                }
                let offset = first_press_offset(&mut self.first_intr, self.woke_by, WakeSource::Debounce);
                engine.pressed(io, offset);
                self.start_timer();
            }
            SensorMsg::Released(io) => engine.released(io),
            SensorMsg::CheckEvent => {
                if self.shutdown {
                    return;
                }
                if engine.check_type() == CheckResult::Done && self.timer.is_active() {
                    self.timer.stop();
                    info!("stop debounce io timer");
                }
            }
            SensorMsg::SetEnabled(_) => {}
        }
    }

    fn deinit<C: Clock, S: KeyEventSink>(&mut self, _engine: &mut KeyEngine<C, S>, wakeup_enable: bool) {
        info!("debounce io deinit, wakeup {}", wakeup_enable);
        self.shutdown = true;
        self.timer.stop();

        if !wakeup_enable {
            for &io in self.ios.iter() {
                if let Err(e) = self.resources.disable(io, KeySrc::Io) {
                    error!("disable io {} failed: {}", io, e);
                }
            }
        }
    }

    fn tick_period_ms(&self) -> Option<u32> {
        self.timer.period_ms()
    }
}
