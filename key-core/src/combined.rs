//! Combined (chorded) key coordination shared by all slots

use heapless::Vec;
use crate::types::{KeyType, MAX_KEY_NUM};

/// Chord detection state
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CombinedState {
    /// No chord tracking in progress
    Init,
    /// Two or more keys are down together, chord still open
    Progressing,
    /// First release closed the chord; waiting for every key to go idle
    Done,
}

impl CombinedState {
    pub const fn name(&self) -> &'static str {
        match self {
            CombinedState::Init => "DECT_INIT",
            CombinedState::Progressing => "DECT_PROGRESSING",
            CombinedState::Done => "DECT_DONE",
        }
    }
}

/// Bitmap of pressed slot indices
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct KeyMask(u32);

impl KeyMask {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn set(&mut self, index: usize) {
        self.0 |= 1 << index;
    }

    pub fn clear(&mut self, index: usize) {
        self.0 &= !(1 << index);
    }

    pub const fn contains(&self, index: usize) -> bool {
        self.0 & (1 << index) != 0
    }

    pub const fn count(&self) -> u32 {
        self.0.count_ones()
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Set indices in ascending order
    pub fn indices(&self) -> Vec<u8, MAX_KEY_NUM> {
        let mut out = Vec::new();
        for i in 0..MAX_KEY_NUM {
            if self.contains(i) {
                let _ = out.push(i as u8);
            }
        }
        out
    }
}

/// Keys captured as members of the chord in flight, with their detected types
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct KeyCache {
    entries: Vec<(u8, KeyType), MAX_KEY_NUM>,
}

impl KeyCache {
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn record(&mut self, index: u8, key_type: KeyType) {
        if self.entries.push((index, key_type)).is_err() {
            debug_assert!(false, "key cache overflow");
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Type of the first captured key; a chord reports one type
    pub fn first_type(&self) -> Option<KeyType> {
        self.entries.first().map(|(_, t)| *t)
    }

    pub fn indices(&self) -> impl Iterator<Item = u8> + '_ {
        self.entries.iter().map(|(i, _)| *i)
    }
}

/// Cross-key coordinator deciding between single-key and chord gestures
#[derive(Clone, Debug)]
pub struct CombinedDetector {
    state: CombinedState,
    mask: KeyMask,
    cache: KeyCache,
}

impl CombinedDetector {
    pub const fn new() -> Self {
        Self {
            state: CombinedState::Init,
            mask: KeyMask::empty(),
            cache: KeyCache { entries: Vec::new() },
        }
    }

    pub fn state(&self) -> CombinedState {
        self.state
    }

    pub fn set_state(&mut self, state: CombinedState) {
        if state != self.state {
            info!("combined key {} -> {}", self.state.name(), state.name());
        }
        self.state = state;
    }

    pub fn mask(&self) -> KeyMask {
        self.mask
    }

    pub fn is_pressed(&self, index: usize) -> bool {
        self.mask.contains(index)
    }

    pub fn mark_pressed(&mut self, index: usize) {
        self.mask.set(index);
    }

    pub fn mark_released(&mut self, index: usize) {
        self.mask.clear(index);
    }

    pub fn pressed_count(&self) -> u32 {
        self.mask.count()
    }

    /// Replace the cache with every currently pressed key
    pub fn capture_pressed(&mut self, key_type: KeyType) {
        self.cache.clear();
        for index in self.mask.indices() {
            self.cache.record(index, key_type);
        }
    }

    pub fn cache(&self) -> &KeyCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut KeyCache {
        &mut self.cache
    }

    /// Back to idle once every slot has returned to INIT
    pub fn reset(&mut self) {
        self.set_state(CombinedState::Init);
        self.cache.clear();
    }
}

impl Default for CombinedDetector {
    fn default() -> Self {
        Self::new()
    }
}
