#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! # Key Core
//!
//! Key gesture recognition for TWS earbud firmware.
//! Turns debounced press/release edges from IO, touch and force-sensor
//! back-ends into tap, hold, repeat and chord gestures.

#[macro_use]
mod fmt;

pub mod types;
pub mod hal;
pub mod combined;
pub mod engine;
pub mod sensor;

#[cfg(feature = "embassy-time")]
pub mod task;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;


pub use types::*;
pub use engine::*;
pub use combined::CombinedState;
pub use hal::{clk_diff, Clock, HalError, KeyResources, SoftTimer, TickTimer, TouchPad};
pub use sensor::{KeyBackend, KeySensor, SensorMsg};

#[cfg(feature = "embassy-time")]
pub use hal::EmbassyClock;

/// Key core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration matching the stock earbud tuning
pub fn default_config() -> KeyConfig {
    KeyConfig {
        id: KeyIdConfig::new(),
        time: KeyTimeConfig::default(),
        thres: KeyThresholdConfig::default(),
    }
}
