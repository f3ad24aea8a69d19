//! Back-end for the on-chip capacitive touch key controller

use heapless::Vec;
use portable_atomic::{AtomicU16, Ordering};

use super::{first_press_offset, KeyBackend, SensorMsg, CHECK_PERIOD_MS, WAKE_TIME_OFFSET_MS};
use crate::engine::{KeyEngine, KeyEventSink};
use crate::hal::{Clock, HalError, KeyResources, TickTimer, TouchPad, WakeSource};
use crate::types::{CheckResult, KeyConfig, KeySrc};

/// Pads the controller can scan
pub const MAX_PAD_NUM: usize = 2;
/// Hold time after which a pad without a release interrupt is released
pub const TOUCH_MAX_HOLD_MS: u32 = 12_000;
pub const TOUCH_MAX_THRES: u16 = 2047;
pub const TOUCH_MAX_TRIG_TIMES: u8 = 14;
pub const DEFAULT_CLIMB_THRES: u16 = 960;
pub const DEFAULT_FALL_THRES: u16 = 512;
pub const DEFAULT_CLIMB_TRIG_TIMES: u8 = 3;
pub const DEFAULT_FALL_TRIG_TIMES: u8 = 4;

/// Thresholds above this encode a reference voltage selector
const THRES_VREF_DIVISOR: u32 = 10_000;

const SELF_RELEASE_TICKS: u16 = (TOUCH_MAX_HOLD_MS / CHECK_PERIOD_MS) as u16;

/// Edge counters bumped from the touch interrupt handler
pub struct TouchIsrStats {
    climb: AtomicU16,
    fall: AtomicU16,
}

impl TouchIsrStats {
    pub const fn new() -> Self {
        Self {
            climb: AtomicU16::new(0),
            fall: AtomicU16::new(0),
        }
    }

    /// Count a press interrupt
    pub fn record_climb(&self) {
        self.climb.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a release interrupt
    pub fn record_fall(&self) {
        self.fall.fetch_add(1, Ordering::Relaxed);
    }

    /// Read and reset both counters
    pub fn take(&self) -> (u16, u16) {
        (self.climb.swap(0, Ordering::Relaxed), self.fall.swap(0, Ordering::Relaxed))
    }
}

impl Default for TouchIsrStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Diagnostic snapshot of the touch back-end
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TouchInfo {
    pub enabled: bool,
    pub pads: u8,
    pub climb_thres: u16,
    pub fall_thres: u16,
    pub climb_intr_times: u16,
    pub fall_intr_times: u16,
}

#[derive(Copy, Clone, Debug)]
struct PadSlot {
    pad: u16,
    key_id: u8,
}

/// Touch key driver.
///
/// The controller sometimes misses the release interrupt on a slow
/// lift-off, so a pad held for [`TOUCH_MAX_HOLD_MS`] without any release
/// is released and re-baselined by the back-end itself.
pub struct TouchBackend<T, P, R> {
    timer: T,
    touch: P,
    resources: R,
    woke_by: Option<WakeSource>,
    first_intr: bool,
    shutdown: bool,
    enabled: bool,
    release_check_ticks: u16,
    climb_thres: u16,
    fall_thres: u16,
    climb_trig_times: u8,
    fall_trig_times: u8,
    pads: Vec<PadSlot, MAX_PAD_NUM>,
}

impl<T, P, R> TouchBackend<T, P, R>
where
    T: TickTimer,
    P: TouchPad,
    R: KeyResources,
{
    pub fn new(timer: T, touch: P, resources: R, woke_by: Option<WakeSource>) -> Self {
        Self {
            timer,
            touch,
            resources,
            woke_by,
            first_intr: true,
            shutdown: false,
            enabled: true,
            release_check_ticks: 0,
            climb_thres: 0,
            fall_thres: 0,
            climb_trig_times: 0,
            fall_trig_times: 0,
            pads: Vec::new(),
        }
    }

    pub fn pads(&self) -> impl Iterator<Item = u16> + '_ {
        self.pads.iter().map(|p| p.pad)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Configured (climb, fall) thresholds
    pub fn thresholds(&self) -> (u16, u16) {
        (self.climb_thres, self.fall_thres)
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn touch(&self) -> &P {
        &self.touch
    }

    pub fn resources(&self) -> &R {
        &self.resources
    }

    fn is_configured(&self) -> bool {
        self.climb_thres != 0 && self.fall_thres != 0
    }

    fn start_timer(&mut self) {
        if !self.timer.is_active() {
            self.timer.start(CHECK_PERIOD_MS);
            info!("start touch timer");
        }
    }

    fn release<C: Clock, S: KeyEventSink>(&mut self, engine: &mut KeyEngine<C, S>, pad: u16) {
        self.release_check_ticks = 0;
        engine.released(pad);
    }

    /// Release every held pad and re-baseline it
    fn release_held_pads<C: Clock, S: KeyEventSink>(&mut self, engine: &mut KeyEngine<C, S>) {
        for i in 0..self.pads.len() {
            let PadSlot { pad, key_id } = self.pads[i];
            if !engine.is_key_pressed(key_id, KeySrc::Touch) {
                continue;
            }
            info!("self release pad {}", pad);
            self.release(engine, pad);
            if let Err(e) = self.touch.reset_pad(pad) {
                error!("reset pad {} failed: {}", pad, e);
            }
        }
    }

    fn self_release_check<C: Clock, S: KeyEventSink>(&mut self, engine: &mut KeyEngine<C, S>) {
        if self.release_check_ticks < SELF_RELEASE_TICKS {
            self.release_check_ticks += 1;
            return;
        }
        self.release_check_ticks = 0;
        self.release_held_pads(engine);
    }

    /// Raise the pad thresholds by the given increments over the values
    /// configured at open. Held pads are released and re-baselined first.
    pub fn adjust_thresholds<C: Clock, S: KeyEventSink>(
        &mut self,
        engine: &mut KeyEngine<C, S>,
        climb_inc: u16,
        fall_inc: u16,
    ) -> Result<(), HalError> {
        if !self.is_configured() {
            error!("touch thresholds not configured yet");
            return Err(HalError::NotInitialized);
        }

        let climb = self.climb_thres.saturating_add(climb_inc);
        let fall = self.fall_thres.saturating_add(fall_inc);
        if climb > TOUCH_MAX_THRES || fall > TOUCH_MAX_THRES {
            error!("touch thresholds {} / {} out of range", climb, fall);
            return Err(HalError::InvalidConfig);
        }

        for i in 0..self.pads.len() {
            let PadSlot { pad, key_id } = self.pads[i];
            info!("adjust pad {} thresholds climb {} fall {}", pad, climb, fall);
            if engine.is_key_pressed(key_id, KeySrc::Touch) {
                self.release(engine, pad);
            }
            if let Err(e) = self.touch.reset_pad(pad) {
                error!("reset pad {} failed: {}", pad, e);
            }
            if let Err(e) = self.touch.set_thresholds(pad, climb, fall) {
                error!("change pad {} thresholds failed: {}", pad, e);
            }
        }
        Ok(())
    }

    /// Change the trigger sample counts. Zero keeps the configured value.
    pub fn adjust_trig_times<C: Clock, S: KeyEventSink>(
        &mut self,
        engine: &mut KeyEngine<C, S>,
        climb: u8,
        fall: u8,
    ) -> Result<(), HalError> {
        if !self.is_configured() {
            error!("touch not configured yet");
            return Err(HalError::NotInitialized);
        }

        let climb = if climb != 0 { climb } else { self.climb_trig_times };
        let fall = if fall != 0 { fall } else { self.fall_trig_times };
        if climb > TOUCH_MAX_TRIG_TIMES || fall > TOUCH_MAX_TRIG_TIMES {
            error!("touch trig times {} / {} out of range", climb, fall);
            return Err(HalError::InvalidConfig);
        }
        info!("adjust trig times climb {} fall {}", climb, fall);

        for i in 0..self.pads.len() {
            let PadSlot { pad, key_id } = self.pads[i];
            if engine.is_key_pressed(key_id, KeySrc::Touch) {
                self.release(engine, pad);
            }
            if let Err(e) = self.touch.set_trig_times(pad, climb, fall) {
                error!("change pad {} trig times failed: {}", pad, e);
            }
        }
        Ok(())
    }

    /// Snapshot for the diagnostic dump; resets the ISR counters
    pub fn dump_info(&self, stats: &TouchIsrStats) -> TouchInfo {
        let (climb_intr_times, fall_intr_times) = stats.take();
        let info = TouchInfo {
            enabled: self.enabled,
            pads: self.pads.len() as u8,
            climb_thres: self.climb_thres,
            fall_thres: self.fall_thres,
            climb_intr_times,
            fall_intr_times,
        };
        info!("touch info {}", info);
        for p in self.pads.iter() {
            info!("touch pad {} key {}", p.pad, p.key_id);
        }
        info
    }
}

impl<T, P, R> KeyBackend for TouchBackend<T, P, R>
where
    T: TickTimer,
    P: TouchPad,
    R: KeyResources,
{
    fn open<C: Clock, S: KeyEventSink>(
        &mut self,
        engine: &mut KeyEngine<C, S>,
        config: &KeyConfig,
    ) -> Result<(), HalError> {
        for key in config.id.with_src(KeySrc::Touch) {
            if self.pads.is_full() {
                error!("touch key {} exceeds {} pads", key.id, MAX_PAD_NUM);
                continue;
            }
            let pad = match self.resources.lookup(key.id, KeySrc::Touch) {
                Some(pad) => pad,
                None => {
                    error!("no touch pad for key {}", key.id);
                    continue;
                }
            };
            // engine first, so an early interrupt finds its slot
            if engine.register(key.id, KeySrc::Touch, pad).is_err() {
                continue;
            }
            if self.pads.push(PadSlot { pad, key_id: key.id }).is_err() {
                debug_assert!(false, "touch pad table overflow");
            }
        }

        if self.pads.is_empty() {
            error!("no touch key configured");
            return Err(HalError::NotInitialized);
        }

        let climb = (config.thres.climb_thres % THRES_VREF_DIVISOR) as u16;
        let fall = (config.thres.fall_thres % THRES_VREF_DIVISOR) as u16;
        self.climb_thres = if climb == 0 { DEFAULT_CLIMB_THRES } else { climb };
        self.fall_thres = if fall == 0 { DEFAULT_FALL_THRES } else { fall };
        self.climb_trig_times = DEFAULT_CLIMB_TRIG_TIMES;
        self.fall_trig_times = DEFAULT_FALL_TRIG_TIMES;
        info!(
            "touch climb {} fall {} vref {}",
            self.climb_thres,
            self.fall_thres,
            config.thres.climb_thres / THRES_VREF_DIVISOR
        );

        for i in 0..self.pads.len() {
            let pad = self.pads[i].pad;
            self.touch.set_thresholds(pad, self.climb_thres, self.fall_thres)?;
            self.touch.set_trig_times(pad, self.climb_trig_times, self.fall_trig_times)?;
            self.resources.enable(pad, KeySrc::Touch, 0)?;
        }
        Ok(())
    }

    fn handle<C: Clock, S: KeyEventSink>(&mut self, engine: &mut KeyEngine<C, S>, msg: SensorMsg) {
        match msg {
            SensorMsg::InitPressed(pad) => {
                engine.pressed(pad, WAKE_TIME_OFFSET_MS);
                self.start_timer();
            }
            SensorMsg::Pressed(pad) => {
                if self.shutdown || !self.enabled {
                    return;
                }
                let offset = first_press_offset(&mut self.first_intr, self.woke_by, WakeSource::Touch);
                engine.pressed(pad, offset);
                self.start_timer();
            }
            SensorMsg::Released(pad) => self.release(engine, pad),
            SensorMsg::CheckEvent => {
                self.self_release_check(engine);

                if self.shutdown {
                    if engine.all_key_released() && self.timer.is_active() {
                        self.timer.stop();
                        info!("stop touch timer before shutdown");
                    }
                    return;
                }

                if engine.check_type() == CheckResult::Done && self.timer.is_active() {
                    self.timer.stop();
                    info!("stop touch timer");
                }
            }
            SensorMsg::SetEnabled(enable) => {
                if let Err(e) = self.set_enabled(engine, enable) {
                    warn!("touch enable {} rejected: {}", enable, e);
                }
            }
        }
    }

    fn deinit<C: Clock, S: KeyEventSink>(&mut self, _engine: &mut KeyEngine<C, S>, wakeup_enable: bool) {
        info!("touch deinit, wakeup {}", wakeup_enable);
        // timer keeps running until every key is up
        self.shutdown = true;

        if !wakeup_enable {
            for p in self.pads.iter() {
                if let Err(e) = self.resources.disable(p.pad, KeySrc::Touch) {
                    error!("close touch pad {} failed: {}", p.pad, e);
                }
            }
        }
    }

    fn set_enabled<C: Clock, S: KeyEventSink>(
        &mut self,
        engine: &mut KeyEngine<C, S>,
        enable: bool,
    ) -> Result<(), HalError> {
        if !self.is_configured() {
            error!("touch thresholds not configured yet");
            return Err(HalError::NotInitialized);
        }
        info!("touch set enabled {}", enable);
        self.enabled = enable;
        if !enable {
            self.release_held_pads(engine);
        }
        Ok(())
    }

    fn tick_period_ms(&self) -> Option<u32> {
        self.timer.period_ms()
    }
}
