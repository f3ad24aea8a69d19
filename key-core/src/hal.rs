//! Hardware Abstraction Layer for the key engine and its back-ends

use crate::types::KeySrc;

/// Period of the 32-bit millisecond clock (about 49.7 days)
pub const CLOCK_WRAP_MS: u64 = 1 << 32;

/// Monotonic millisecond clock that wraps at `u32::MAX`
pub trait Clock {
    fn now_ms(&self) -> u32;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}

/// Elapsed milliseconds from `prev` to `now`, surviving one counter rollover
#[inline]
pub const fn clk_diff(now: u32, prev: u32) -> u32 {
    if now >= prev {
        now - prev
    } else {
        // now has wrapped past u32::MAX
        (u32::MAX - prev) + now + 1
    }
}

/// Clock backed by the embassy time driver
#[cfg(feature = "embassy-time")]
#[derive(Copy, Clone, Debug, Default)]
pub struct EmbassyClock;

#[cfg(feature = "embassy-time")]
impl Clock for EmbassyClock {
    fn now_ms(&self) -> u32 {
        // truncation is the wrap
        embassy_time::Instant::now().as_millis() as u32
    }
}

/// Recurring timer that drives the classifier tick
pub trait TickTimer {
    /// Start (or restart) with the given period
    fn start(&mut self, period_ms: u32);

    fn stop(&mut self);

    /// Period while running, `None` when stopped
    fn period_ms(&self) -> Option<u32>;

    fn is_active(&self) -> bool {
        self.period_ms().is_some()
    }
}

/// Timer that only records whether it should be running.
///
/// Whatever owns the processing loop reads `period_ms()` and schedules
/// the tick itself.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SoftTimer {
    period: Option<u32>,
    starts: u32,
}

impl SoftTimer {
    pub const fn new() -> Self {
        Self { period: None, starts: 0 }
    }

    /// Number of stopped-to-running transitions
    pub fn start_count(&self) -> u32 {
        self.starts
    }
}

impl TickTimer for SoftTimer {
    fn start(&mut self, period_ms: u32) {
        if self.period.is_none() {
            self.starts += 1;
        }
        self.period = Some(period_ms);
    }

    fn stop(&mut self) {
        self.period = None;
    }

    fn period_ms(&self) -> Option<u32> {
        self.period
    }
}

/// Error types for HAL operations
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HalError {
    /// GPIO operation failed
    GpioError,
    /// Touch pad operation failed
    PadError,
    /// Invalid configuration
    InvalidConfig,
    /// Hardware not initialized
    NotInitialized,
}

#[cfg(any(test, feature = "std"))]
impl core::fmt::Display for HalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HalError::GpioError => write!(f, "GPIO operation failed"),
            HalError::PadError => write!(f, "Touch pad operation failed"),
            HalError::InvalidConfig => write!(f, "Invalid configuration"),
            HalError::NotInitialized => write!(f, "Hardware not initialized"),
        }
    }
}

#[cfg(any(test, feature = "std"))]
impl std::error::Error for HalError {}

/// Board resource table: which hardware channel backs a logical key
pub trait KeyResources {
    /// Hardware channel (gpio number, touch pad id) for a key, if fitted
    fn lookup(&self, key_id: u8, key_src: KeySrc) -> Option<u16>;

    /// Configure the channel for edge detection
    fn enable(&mut self, io_id: u16, key_src: KeySrc, debounce_ms: u32) -> Result<(), HalError>;

    /// Release the channel
    fn disable(&mut self, io_id: u16, key_src: KeySrc) -> Result<(), HalError>;
}

/// Capacitive touch pad peripheral
pub trait TouchPad {
    /// Re-baseline the pad
    fn reset_pad(&mut self, pad: u16) -> Result<(), HalError>;

    fn set_thresholds(&mut self, pad: u16, climb: u16, fall: u16) -> Result<(), HalError>;

    /// Number of consecutive samples required to trigger a climb/fall
    fn set_trig_times(&mut self, pad: u16, climb: u8, fall: u8) -> Result<(), HalError>;
}

/// Peripheral that woke the SoC from sleep
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeSource {
    /// Debounce-IO controller
    Debounce,
    /// Touch key controller
    Touch,
    /// Anything else (RTC, charger, ...)
    Other,
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    //! Mock implementations for testing

    use super::*;
    use core::cell::Cell;
    use std::vec::Vec;

    /// Manually advanced clock
    #[derive(Debug, Default)]
    pub struct MockClock {
        now: Cell<u32>,
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn starting_at(ms: u32) -> Self {
            Self { now: Cell::new(ms) }
        }

        pub fn set(&self, ms: u32) {
            self.now.set(ms);
        }

        /// Advance with wrap-around
        pub fn advance(&self, ms: u32) {
            self.now.set(self.now.get().wrapping_add(ms));
        }
    }

    impl Clock for MockClock {
        fn now_ms(&self) -> u32 {
            self.now.get()
        }
    }

    /// Resource table with a fixed key -> channel mapping
    #[derive(Debug, Default)]
    pub struct MockResources {
        pub map: Vec<(u8, KeySrc, u16)>,
        pub enabled: Vec<(u16, u32)>,
        pub disabled: Vec<u16>,
        pub fail_enable: bool,
    }

    impl MockResources {
        pub fn new(map: &[(u8, KeySrc, u16)]) -> Self {
            Self { map: map.to_vec(), ..Self::default() }
        }
    }

    impl KeyResources for MockResources {
        fn lookup(&self, key_id: u8, key_src: KeySrc) -> Option<u16> {
            self.map
                .iter()
                .find(|(id, src, _)| *id == key_id && *src == key_src)
                .map(|(_, _, io)| *io)
        }

        fn enable(&mut self, io_id: u16, _key_src: KeySrc, debounce_ms: u32) -> Result<(), HalError> {
            if self.fail_enable {
                return Err(HalError::GpioError);
            }
            self.enabled.push((io_id, debounce_ms));
            Ok(())
        }

        fn disable(&mut self, io_id: u16, _key_src: KeySrc) -> Result<(), HalError> {
            self.disabled.push(io_id);
            Ok(())
        }
    }

    /// Touch peripheral that records every call
    #[derive(Debug, Default)]
    pub struct MockTouchPad {
        pub resets: Vec<u16>,
        pub thresholds: Vec<(u16, u16, u16)>,
        pub trig_times: Vec<(u16, u8, u8)>,
        /// Every call fails with `HalError::PadError`
        pub faulty: bool,
    }

    impl MockTouchPad {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl MockTouchPad {
        fn check(&self) -> Result<(), HalError> {
            if self.faulty {
                Err(HalError::PadError)
            } else {
                Ok(())
            }
        }
    }

    impl TouchPad for MockTouchPad {
        fn reset_pad(&mut self, pad: u16) -> Result<(), HalError> {
            self.check()?;
            self.resets.push(pad);
            Ok(())
        }

        fn set_thresholds(&mut self, pad: u16, climb: u16, fall: u16) -> Result<(), HalError> {
            self.check()?;
            self.thresholds.push((pad, climb, fall));
            Ok(())
        }

        fn set_trig_times(&mut self, pad: u16, climb: u8, fall: u8) -> Result<(), HalError> {
            self.check()?;
            self.trig_times.push((pad, climb, fall));
            Ok(())
        }
    }
}
