//! Core data types for key gesture recognition

use heapless::Vec;

/// Maximum number of physical keys the engine tracks
pub const MAX_KEY_NUM: usize = 3;

/// Input technology a key is sensed with
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Hash))]
#[repr(u8)]
pub enum KeySrc {
    /// GPIO key behind a debounce counter or plain input
    Io = 0,
    /// Capacitive touch pad
    Touch = 1,
    /// External sensor (force sensor, accelerometer click)
    External = 2,
}

impl KeySrc {
    /// Convert from the numeric source id used in configuration blobs
    pub const fn from_u8(value: u8) -> Option<KeySrc> {
        match value {
            0 => Some(KeySrc::Io),
            1 => Some(KeySrc::Touch),
            2 => Some(KeySrc::External),
            _ => None,
        }
    }
}

/// Gesture classification reported to the application
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Hash))]
pub enum KeyType {
    Single,
    Double,
    Triple,
    Quadruple,
    Quintuple,
    Sextuple,
    /// Released before `long_time`
    Short,
    /// Held past `long_time`
    Long,
    LongRelease,
    /// Held past `vlong_time`
    VeryLong,
    VeryLongRelease,
    /// Held past `vvlong_time`
    VeryVeryLong,
    VeryVeryLongRelease,
    /// Periodic event while held past `repeat_start_time`
    Repeat,
    /// Immediate press edge
    Press,
    /// Immediate release edge
    Release,
}

impl KeyType {
    /// Multi-tap gesture for an accumulated tap count.
    /// Counts outside 1..=6 have no gesture.
    pub const fn from_tap_count(count: u32) -> Option<KeyType> {
        match count {
            1 => Some(KeyType::Single),
            2 => Some(KeyType::Double),
            3 => Some(KeyType::Triple),
            4 => Some(KeyType::Quadruple),
            5 => Some(KeyType::Quintuple),
            6 => Some(KeyType::Sextuple),
            _ => None,
        }
    }

    /// Returns true if this type may close a chord as a combined event
    pub const fn is_combined_eligible(&self) -> bool {
        matches!(
            self,
            KeyType::Short | KeyType::Long | KeyType::VeryLong | KeyType::VeryVeryLong
        )
    }

    /// Returns true for Single..Sextuple
    pub const fn is_multi_tap(&self) -> bool {
        matches!(
            self,
            KeyType::Single
                | KeyType::Double
                | KeyType::Triple
                | KeyType::Quadruple
                | KeyType::Quintuple
                | KeyType::Sextuple
        )
    }

    /// Returns true for the three hold escalation tiers
    pub const fn is_escalation(&self) -> bool {
        matches!(self, KeyType::Long | KeyType::VeryLong | KeyType::VeryVeryLong)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            KeyType::Single => "SINGLE",
            KeyType::Double => "DOUBLE",
            KeyType::Triple => "TRIPLE",
            KeyType::Quadruple => "QUADRUPLE",
            KeyType::Quintuple => "QUINTUPLE",
            KeyType::Sextuple => "SEXTUPLE",
            KeyType::Short => "SHORT",
            KeyType::Long => "LONG",
            KeyType::LongRelease => "LONG_RELEASE",
            KeyType::VeryLong => "VLONG",
            KeyType::VeryLongRelease => "VLONG_RELEASE",
            KeyType::VeryVeryLong => "VVLONG",
            KeyType::VeryVeryLongRelease => "VVLONG_RELEASE",
            KeyType::Repeat => "REPEAT",
            KeyType::Press => "PRESS",
            KeyType::Release => "RELEASE",
        }
    }
}

/// One key's share of a reported gesture
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyInfo {
    pub key_id: u8,
    pub key_src: KeySrc,
    pub key_type: KeyType,
}

/// Gesture batch delivered to the application.
///
/// Single-key gestures carry one entry; chords carry one entry per
/// chorded key, all with the same type.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct KeyEvent {
    keys: Vec<KeyInfo, MAX_KEY_NUM>,
}

impl KeyEvent {
    /// Event for exactly one key
    pub fn single(key_id: u8, key_src: KeySrc, key_type: KeyType) -> Self {
        let mut keys = Vec::new();
        // capacity is at least one
        let _ = keys.push(KeyInfo { key_id, key_src, key_type });
        Self { keys }
    }

    /// Event spanning several keys sharing one gesture type.
    /// Entries beyond `MAX_KEY_NUM` are dropped.
    pub fn combined<I>(key_type: KeyType, keys: I) -> Self
    where
        I: IntoIterator<Item = (u8, KeySrc)>,
    {
        let mut out = Vec::new();
        for (key_id, key_src) in keys {
            if out.push(KeyInfo { key_id, key_src, key_type }).is_err() {
                break;
            }
        }
        Self { keys: out }
    }

    pub fn keys(&self) -> &[KeyInfo] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns true if this event reports a chord
    pub fn is_combined(&self) -> bool {
        self.keys.len() > 1
    }

    /// Gesture type shared by every entry
    pub fn key_type(&self) -> Option<KeyType> {
        self.keys.first().map(|k| k.key_type)
    }

    /// Returns true if the given key takes part in this event
    pub fn contains(&self, key_id: u8, key_src: KeySrc) -> bool {
        self.keys
            .iter()
            .any(|k| k.key_id == key_id && k.key_src == key_src)
    }
}

/// Gesture timing thresholds, all in milliseconds
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyTimeConfig {
    /// Hold time for Long
    pub long_time: u32,
    /// Hold time for VeryLong
    pub vlong_time: u32,
    /// Hold time for VeryVeryLong
    pub vvlong_time: u32,
    /// Hold time after which Repeat events start
    pub repeat_start_time: u32,
    /// Interval between Repeat events
    pub repeat_rate: u32,
    /// Maximum gap between two taps of one multi-tap gesture
    pub multi_tap_interval: u32,
    /// Electrical debounce time for back-ends that sample pins
    pub debounce_time: u32,
}

impl Default for KeyTimeConfig {
    fn default() -> Self {
        Self {
            long_time: 1500,
            vlong_time: 4000,
            vvlong_time: 8000,
            repeat_start_time: 1000,
            repeat_rate: 500,
            multi_tap_interval: 300,
            debounce_time: 20,
        }
    }
}

impl KeyTimeConfig {
    /// Check the thresholds are usable for classification
    pub fn validate(&self) -> Result<(), KeyError> {
        if self.long_time >= self.vlong_time || self.vlong_time >= self.vvlong_time {
            return Err(KeyError::InvalidConfig);
        }
        if self.repeat_rate == 0 {
            return Err(KeyError::InvalidConfig);
        }
        Ok(())
    }

    /// Release-time classification of a hold duration
    pub fn classify_release(&self, hold_time: u32) -> KeyType {
        if hold_time >= self.vvlong_time {
            KeyType::VeryVeryLongRelease
        } else if hold_time >= self.vlong_time {
            KeyType::VeryLongRelease
        } else if hold_time >= self.long_time {
            KeyType::LongRelease
        } else {
            KeyType::Short
        }
    }
}

/// Logical identity of one configured key
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyId {
    pub id: u8,
    pub src: KeySrc,
}

/// Set of keys the product is configured with
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct KeyIdConfig {
    keys: Vec<KeyId, MAX_KEY_NUM>,
}

impl KeyIdConfig {
    pub const fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Build from (id, src) pairs
    pub fn from_pairs(pairs: &[(u8, KeySrc)]) -> Result<Self, KeyError> {
        let mut cfg = Self::new();
        for &(id, src) in pairs {
            cfg.push(id, src)?;
        }
        Ok(cfg)
    }

    pub fn push(&mut self, id: u8, src: KeySrc) -> Result<(), KeyError> {
        self.keys
            .push(KeyId { id, src })
            .map_err(|_| KeyError::CapacityExceeded)
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyId> {
        self.keys.iter()
    }

    /// Keys sensed with the given technology
    pub fn with_src(&self, src: KeySrc) -> impl Iterator<Item = &KeyId> {
        self.keys.iter().filter(move |k| k.src == src)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Touch detection thresholds (sensor counts)
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyThresholdConfig {
    pub climb_thres: u32,
    pub fall_thres: u32,
}

/// Complete key configuration as loaded from product settings
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct KeyConfig {
    pub id: KeyIdConfig,
    pub time: KeyTimeConfig,
    pub thres: KeyThresholdConfig,
}

/// Result of a classifier tick
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CheckResult {
    /// At least one key is mid-gesture; keep ticking
    Progressing,
    /// Every key is idle; the tick timer can stop
    Done,
}

/// Key engine error types
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyError {
    /// No slot is registered for the io id
    UnknownIo,
    /// Press edge for a key already down
    AlreadyPressed,
    /// Release edge for a key not down
    NotPressed,
    /// All slots are in use
    CapacityExceeded,
    /// Io id already bound to another key
    DuplicateIo,
    /// Invalid configuration
    InvalidConfig,
}

#[cfg(feature = "std")]
impl core::fmt::Display for KeyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            KeyError::UnknownIo => write!(f, "io id is not registered"),
            KeyError::AlreadyPressed => write!(f, "key is already pressed"),
            KeyError::NotPressed => write!(f, "key is not pressed"),
            KeyError::CapacityExceeded => write!(f, "key capacity exceeded"),
            KeyError::DuplicateIo => write!(f, "io id bound to another key"),
            KeyError::InvalidConfig => write!(f, "invalid key configuration"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for KeyError {}
