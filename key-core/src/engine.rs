//! Key recognition engine: per-key timing state machine plus chord coordination

use heapless::Vec;
use crate::combined::{CombinedDetector, CombinedState};
use crate::hal::{clk_diff, Clock};
use crate::types::{
    CheckResult, KeyError, KeyEvent, KeySrc, KeyTimeConfig, KeyType, MAX_KEY_NUM,
};

/// Per-key state machine states
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyState {
    /// Idle, nothing pending
    Init,
    /// Down, hold escalation still running
    Press,
    /// Down after VeryVeryLong fired; only repeats remain
    WaitRelease,
    /// Up, waiting for the multi-tap window to close
    Release,
}

/// Receiver of classified key gestures
pub trait KeyEventSink {
    fn on_key_event(&mut self, event: &KeyEvent);
}

impl<F> KeyEventSink for F
where
    F: FnMut(&KeyEvent),
{
    fn on_key_event(&mut self, event: &KeyEvent) {
        self(event)
    }
}

/// Engine record for one registered physical key
#[derive(Copy, Clone, Debug)]
struct KeySlot {
    /// Hardware channel bound to this key (gpio id, touch pad id)
    io_id: u16,
    key_id: u8,
    key_src: KeySrc,
    state: KeyState,
    tap_count: u32,
    /// Last Repeat emission, set once repeating has armed
    repeat_time: Option<u32>,
    press_time: u32,
    release_time: Option<u32>,
    /// Next hold threshold that escalates
    hold_timeout: u32,
}

impl KeySlot {
    fn new(key_id: u8, key_src: KeySrc, io_id: u16) -> Self {
        Self {
            io_id,
            key_id,
            key_src,
            state: KeyState::Init,
            tap_count: 0,
            repeat_time: None,
            press_time: 0,
            release_time: None,
            hold_timeout: 0,
        }
    }
}

/// Key gesture engine.
///
/// All entry points must be called from one serialized context: the
/// back-end message loop. Interrupt handlers post messages instead of
/// calling in directly.
pub struct KeyEngine<C, S> {
    clock: C,
    sink: S,
    config: KeyTimeConfig,
    slots: Vec<KeySlot, MAX_KEY_NUM>,
    combined: CombinedDetector,
    shutdown: bool,
}

impl<C, S> KeyEngine<C, S>
where
    C: Clock,
    S: KeyEventSink,
{
    /// Create an engine delivering gestures to `sink`
    pub fn new(clock: C, sink: S) -> Self {
        Self {
            clock,
            sink,
            config: KeyTimeConfig::default(),
            slots: Vec::new(),
            combined: CombinedDetector::new(),
            shutdown: false,
        }
    }

    /// Install a new sink and resume event delivery
    pub fn init(&mut self, sink: S) {
        self.sink = sink;
        self.shutdown = false;
    }

    /// Go quiet for power-off: classification continues, delivery stops
    pub fn deinit(&mut self) {
        info!("key engine shutting down");
        self.shutdown = true;
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Replace the timing thresholds, used verbatim
    pub fn set_time_cfg(&mut self, config: KeyTimeConfig) {
        if config.validate().is_err() {
            error!(
                "unusual key timing: long {} vlong {} vvlong {} repeat {}",
                config.long_time, config.vlong_time, config.vvlong_time, config.repeat_rate
            );
        }
        self.config = config;
    }

    pub fn time_cfg(&self) -> &KeyTimeConfig {
        &self.config
    }

    /// Bind a hardware channel to a logical key.
    ///
    /// Re-registering the same (key_id, key_src) rebinds its io id.
    /// Returns the slot index.
    pub fn register(&mut self, key_id: u8, key_src: KeySrc, io_id: u16) -> Result<usize, KeyError> {
        let existing = self
            .slots
            .iter()
            .position(|s| s.key_id == key_id && s.key_src == key_src);

        if self
            .slots
            .iter()
            .enumerate()
            .any(|(i, s)| s.io_id == io_id && Some(i) != existing)
        {
            error!("io {} already bound to another key", io_id);
            return Err(KeyError::DuplicateIo);
        }

        let index = match existing {
            Some(index) => {
                self.slots[index].io_id = io_id;
                index
            }
            None => {
                self.slots
                    .push(KeySlot::new(key_id, key_src, io_id))
                    .map_err(|_| {
                        error!("cannot register key {}: all {} slots used", key_id, MAX_KEY_NUM);
                        KeyError::CapacityExceeded
                    })?;
                self.slots.len() - 1
            }
        };

        info!("key registered: id {} io {} slots {}", key_id, io_id, self.slots.len());
        Ok(index)
    }

    /// Number of registered keys
    pub fn registered(&self) -> usize {
        self.slots.len()
    }

    /// Press edge. `time_offset` back-dates the press by the known
    /// latency between the physical touch and this call.
    pub fn pressed(&mut self, io_id: u16, time_offset: u32) {
        if let Err(e) = self.try_press(io_id, time_offset) {
            warn!("press on io {} ignored: {}", io_id, e);
        }
    }

    /// Release edge
    pub fn released(&mut self, io_id: u16) {
        if let Err(e) = self.try_release(io_id) {
            warn!("release on io {} ignored: {}", io_id, e);
        }
    }

    fn try_press(&mut self, io_id: u16, time_offset: u32) -> Result<(), KeyError> {
        let ki = self.slot_index(io_id).ok_or(KeyError::UnknownIo)?;
        if self.combined.is_pressed(ki) {
            return Err(KeyError::AlreadyPressed);
        }

        let rtc_time = self.clock.now_ms();
        let now = rtc_time.wrapping_sub(time_offset);

        debug!(
            "pressed on {} id {} io {} mask {=u32:#x} offset {} cmb {}",
            rtc_time,
            self.slots[ki].key_id,
            io_id,
            self.combined.mask().bits(),
            time_offset,
            self.combined.state().name()
        );

        match self.combined.state() {
            CombinedState::Init => {
                self.send_key_type(KeyType::Press, ki);
                // another key already down: start the shared chord clock
                if self.combined.pressed_count() != 0 {
                    self.sync_press_time(now);
                    self.combined.set_state(CombinedState::Progressing);
                }
            }
            CombinedState::Progressing => self.sync_press_time(now),
            CombinedState::Done => {
                debug!("chord closed, press on io {} tracked as single key", io_id);
            }
        }

        self.combined.mark_pressed(ki);
        let long_time = self.config.long_time;
        let slot = &mut self.slots[ki];
        slot.press_time = now;
        slot.hold_timeout = long_time;
        slot.release_time = None;
        slot.state = KeyState::Press;
        Ok(())
    }

    fn try_release(&mut self, io_id: u16) -> Result<(), KeyError> {
        let now = self.clock.now_ms();
        let ki = self.slot_index(io_id).ok_or(KeyError::UnknownIo)?;
        if !self.combined.is_pressed(ki) {
            return Err(KeyError::NotPressed);
        }

        let hold_time = clk_diff(now, self.slots[ki].press_time);
        let key_type = self.config.classify_release(hold_time);

        debug!(
            "released on {} id {} io {} hold {} tap {}",
            now,
            self.slots[ki].key_id,
            io_id,
            hold_time,
            self.slots[ki].tap_count
        );

        match self.combined.state() {
            CombinedState::Init => {
                self.combined.mark_released(ki);
                self.send_key_type(KeyType::Release, ki);
                self.send_key_type(key_type, ki);
            }
            CombinedState::Progressing => {
                // the chord covers every key down at the moment of the first release
                self.combined.capture_pressed(key_type);
                self.combined.mark_released(ki);
                self.combined.set_state(CombinedState::Done);
                if key_type.is_combined_eligible() {
                    self.send_combined_type(key_type);
                }
            }
            CombinedState::Done => {
                self.combined.mark_released(ki);
                self.emit_single(KeyType::Release, ki);
                self.emit_single(key_type, ki);
            }
        }

        let slot = &mut self.slots[ki];
        // multi-tap only counts short presses
        if key_type == KeyType::Short {
            slot.tap_count += 1;
        }
        slot.release_time = Some(now);
        slot.repeat_time = None;
        slot.press_time = 0;
        slot.state = KeyState::Release;
        Ok(())
    }

    /// Classifier tick. Call every 50-100 ms while any key is mid-gesture;
    /// stop calling once it returns `CheckResult::Done`.
    pub fn check_type(&mut self) -> CheckResult {
        let now = self.clock.now_ms();
        let mut chord_escalated = false;

        if self.combined.state() == CombinedState::Progressing {
            self.combined.cache_mut().clear();
        }

        for ki in 0..self.slots.len() {
            match self.slots[ki].state {
                KeyState::Init => {}
                KeyState::Press | KeyState::WaitRelease => {
                    if self.slots[ki].state == KeyState::Press {
                        if let Some(key_type) = self.escalate(ki, now) {
                            debug!("key {} got {} on {}", self.slots[ki].key_id, key_type.name(), now);

                            if key_type == KeyType::VeryVeryLong {
                                self.slots[ki].state = KeyState::WaitRelease;
                            }
                            self.send_key_type(key_type, ki);
                            if self.combined.state() == CombinedState::Progressing {
                                self.combined.cache_mut().record(ki as u8, key_type);
                                chord_escalated = true;
                            }
                            // no multi-tap after tap + hold
                            self.slots[ki].tap_count = 0;
                        }
                    }
                    if let Some(key_type) = self.repeat(ki, now) {
                        self.send_key_type(key_type, ki);
                    }
                }
                KeyState::Release => self.resolve_multi_tap(ki, now),
            }
        }

        if chord_escalated {
            if let Some(key_type) = self.combined.cache().first_type() {
                info!(
                    "chord escalation: {} keys, pressed {}",
                    self.combined.cache().len(),
                    self.combined.pressed_count()
                );
                self.send_combined_type(key_type);
            }
        }

        if self.all_idle() {
            if self.combined.state() != CombinedState::Init {
                self.combined.reset();
            }
            CheckResult::Done
        } else {
            CheckResult::Progressing
        }
    }

    /// Returns true if the given key is currently down.
    /// Unregistered keys report false.
    pub fn is_key_pressed(&self, key_id: u8, key_src: KeySrc) -> bool {
        match self
            .slots
            .iter()
            .position(|s| s.key_id == key_id && s.key_src == key_src)
        {
            Some(ki) => self.combined.is_pressed(ki),
            None => {
                warn!("key {} src {} is not registered", key_id, key_src as u8);
                false
            }
        }
    }

    pub fn all_key_released(&self) -> bool {
        self.combined.mask().is_empty()
    }

    /// State of the slot bound to `io_id`
    pub fn key_state(&self, io_id: u16) -> Option<KeyState> {
        self.slot_index(io_id).map(|ki| self.slots[ki].state)
    }

    /// Accumulated taps of the slot bound to `io_id`
    pub fn tap_count(&self, io_id: u16) -> Option<u32> {
        self.slot_index(io_id).map(|ki| self.slots[ki].tap_count)
    }

    /// Press timestamp of the slot bound to `io_id` (0 when up)
    pub fn press_time(&self, io_id: u16) -> Option<u32> {
        self.slot_index(io_id).map(|ki| self.slots[ki].press_time)
    }

    /// Io id bound to a logical key
    pub fn io_id_of(&self, key_id: u8, key_src: KeySrc) -> Option<u16> {
        self.slots
            .iter()
            .find(|s| s.key_id == key_id && s.key_src == key_src)
            .map(|s| s.io_id)
    }

    pub fn combined_state(&self) -> CombinedState {
        self.combined.state()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn slot_index(&self, io_id: u16) -> Option<usize> {
        self.slots.iter().position(|s| s.io_id == io_id)
    }

    fn all_idle(&self) -> bool {
        self.slots.iter().all(|s| s.state == KeyState::Init)
    }

    /// Give every active key the same press baseline so chorded keys
    /// escalate on one clock
    fn sync_press_time(&mut self, now: u32) {
        let long_time = self.config.long_time;
        for slot in self.slots.iter_mut().filter(|s| s.state != KeyState::Init) {
            slot.press_time = now;
            slot.hold_timeout = long_time;
        }
    }

    fn escalate(&mut self, ki: usize, now: u32) -> Option<KeyType> {
        let cfg = self.config;
        let slot = &mut self.slots[ki];
        let hold_time = clk_diff(now, slot.press_time);

        if hold_time < slot.hold_timeout {
            return None;
        }

        if hold_time >= cfg.vvlong_time {
            Some(KeyType::VeryVeryLong)
        } else if hold_time >= cfg.vlong_time {
            slot.hold_timeout = cfg.vvlong_time;
            Some(KeyType::VeryLong)
        } else if hold_time >= cfg.long_time {
            slot.hold_timeout = cfg.vlong_time;
            Some(KeyType::Long)
        } else {
            None
        }
    }

    fn repeat(&mut self, ki: usize, now: u32) -> Option<KeyType> {
        let cfg = self.config;
        let slot = &mut self.slots[ki];
        let hold_time = clk_diff(now, slot.press_time);

        if hold_time <= cfg.repeat_start_time {
            return None;
        }

        match slot.repeat_time {
            None => {
                slot.repeat_time = Some(now);
                None
            }
            Some(last) if clk_diff(now, last) >= cfg.repeat_rate => {
                slot.repeat_time = Some(now);
                Some(KeyType::Repeat)
            }
            Some(_) => None,
        }
    }

    fn resolve_multi_tap(&mut self, ki: usize, now: u32) {
        let interval = self.config.multi_tap_interval;
        let slot = &mut self.slots[ki];
        let released_at = match slot.release_time {
            Some(t) => t,
            None => return,
        };
        let release_last = clk_diff(now, released_at);
        if release_last < interval {
            return;
        }

        let tap_count = slot.tap_count;
        info!(
            "multi-tap: key {} taps {} released {} interval {}",
            slot.key_id, tap_count, release_last, interval
        );

        slot.tap_count = 0;
        slot.release_time = None;
        slot.state = KeyState::Init;

        match KeyType::from_tap_count(tap_count) {
            Some(key_type) => {
                debug!("key {} got {} on {}", self.slots[ki].key_id, key_type.name(), now);
                self.send_key_type(key_type, ki);
            }
            None if tap_count > 0 => {
                warn!("{} taps on key {} have no gesture, dropped", tap_count, self.slots[ki].key_id);
            }
            None => {}
        }
    }

    /// Single-key delivery, held back while a chord is being tracked
    fn send_key_type(&mut self, key_type: KeyType, ki: usize) {
        if self.combined.state() != CombinedState::Init {
            trace!("{} on key {} suppressed by chord", key_type.name(), self.slots[ki].key_id);
            return;
        }
        self.emit_single(key_type, ki);
    }

    fn emit_single(&mut self, key_type: KeyType, ki: usize) {
        if self.shutdown {
            return;
        }
        let slot = &self.slots[ki];
        debug!("send key type {} id {} src {}", key_type.name(), slot.key_id, slot.key_src as u8);
        let event = KeyEvent::single(slot.key_id, slot.key_src, key_type);
        self.sink.on_key_event(&event);
    }

    /// Chord delivery covering every cached key.
    ///
    /// A tick escalation only caches keys still in `Press`. A chord member
    /// already parked in `WaitRelease` (held past very-very-long before the
    /// chord formed) never escalates again, so the event can carry a single
    /// key and then reads as a plain single-key event.
    fn send_combined_type(&mut self, key_type: KeyType) {
        if self.shutdown {
            return;
        }
        let slots = &self.slots;
        let event = KeyEvent::combined(
            key_type,
            self.combined
                .cache()
                .indices()
                .filter_map(|i| slots.get(usize::from(i)))
                .map(|s| (s.key_id, s.key_src)),
        );
        debug!("send combined key type {} keys {}", key_type.name(), event.len());
        self.sink.on_key_event(&event);
    }
}
