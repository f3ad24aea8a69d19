//! Test utilities for key engine functionality

use std::vec::Vec;

use crate::engine::{KeyEngine, KeyEventSink};
use crate::hal::mock::MockClock;
use crate::hal::Clock;
use crate::types::{CheckResult, KeyEvent, KeySrc, KeyType};

/// Sink that keeps every delivered event
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Vec<KeyEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[KeyEvent] {
        &self.events
    }

    /// Types of all single-key events, in delivery order
    pub fn single_types(&self) -> Vec<KeyType> {
        self.events
            .iter()
            .filter(|e| !e.is_combined())
            .filter_map(|e| e.key_type())
            .collect()
    }

    /// Types of single-key events reported for one key
    pub fn types_for(&self, key_id: u8, key_src: KeySrc) -> Vec<KeyType> {
        self.events
            .iter()
            .filter(|e| !e.is_combined() && e.contains(key_id, key_src))
            .filter_map(|e| e.key_type())
            .collect()
    }

    /// Chord events only
    pub fn combined(&self) -> Vec<&KeyEvent> {
        self.events.iter().filter(|e| e.is_combined()).collect()
    }

    pub fn count_of(&self, key_type: KeyType) -> usize {
        self.events
            .iter()
            .filter(|e| e.key_type() == Some(key_type))
            .count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn take(&mut self) -> Vec<KeyEvent> {
        core::mem::take(&mut self.events)
    }
}

impl KeyEventSink for RecordingSink {
    fn on_key_event(&mut self, event: &KeyEvent) {
        self.events.push(event.clone());
    }
}

/// Engine driven by a manual clock
pub type TestEngine<'a> = KeyEngine<&'a MockClock, RecordingSink>;

/// Create an engine on `clock` with a recording sink
pub fn test_engine(clock: &MockClock) -> TestEngine<'_> {
    KeyEngine::new(clock, RecordingSink::new())
}

/// Advance the clock in `period_ms` steps for `duration_ms`, ticking the
/// classifier after each step. Returns the last tick result.
pub fn tick_for<S: KeyEventSink>(
    engine: &mut KeyEngine<&MockClock, S>,
    duration_ms: u32,
    period_ms: u32,
) -> CheckResult {
    let mut result = CheckResult::Progressing;
    let mut elapsed = 0;
    while elapsed < duration_ms {
        let step = period_ms.min(duration_ms - elapsed);
        engine.clock().advance(step);
        elapsed += step;
        result = engine.check_type();
    }
    result
}

/// Tick until the engine reports idle. Returns the elapsed time, or
/// `None` if still busy after `limit_ms`.
pub fn tick_until_idle<S: KeyEventSink>(
    engine: &mut KeyEngine<&MockClock, S>,
    period_ms: u32,
    limit_ms: u32,
) -> Option<u32> {
    let mut elapsed = 0;
    while elapsed <= limit_ms {
        engine.clock().advance(period_ms);
        elapsed += period_ms;
        if engine.check_type() == CheckResult::Done {
            return Some(elapsed);
        }
    }
    None
}

/// Hardware edge in a scripted gesture
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Edge {
    Press(u16),
    /// Press reported late by the given latency
    PressLate(u16, u32),
    Release(u16),
}

/// Edge at an absolute time (ms from script start)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScriptStep {
    pub at: u32,
    pub edge: Edge,
}

impl ScriptStep {
    pub const fn press(at: u32, io_id: u16) -> Self {
        Self { at, edge: Edge::Press(io_id) }
    }

    pub const fn release(at: u32, io_id: u16) -> Self {
        Self { at, edge: Edge::Release(io_id) }
    }
}

/// Replay edges in time order with a classifier tick every `period_ms`,
/// then keep ticking for `tail_ms` after the last edge.
///
/// Ticks land on multiples of `period_ms` from the script start; edges
/// are applied before the tick sharing their timestamp.
pub fn replay<S: KeyEventSink>(
    engine: &mut KeyEngine<&MockClock, S>,
    steps: &[ScriptStep],
    period_ms: u32,
    tail_ms: u32,
) {
    let start = engine.clock().now_ms();
    let end = steps.iter().map(|s| s.at).max().unwrap_or(0) + tail_ms;
    let mut next = 0;
    let mut t = 0;

    while t <= end {
        while next < steps.len() && steps[next].at <= t {
            let step = steps[next];
            engine.clock().set(start.wrapping_add(step.at));
            match step.edge {
                Edge::Press(io) => engine.pressed(io, 0),
                Edge::PressLate(io, offset) => engine.pressed(io, offset),
                Edge::Release(io) => engine.released(io),
            }
            next += 1;
        }
        engine.clock().set(start.wrapping_add(t));
        if t > 0 {
            engine.check_type();
        }
        t += period_ms;
    }
}
