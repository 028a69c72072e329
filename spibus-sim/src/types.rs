//! simulation types
//!
//! various types used across the simulation kernel

use crate::Error;

/// simulation time in steps of the kernel's timebase
pub type Time = u64;

/// a timebase converts between simulation steps and seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timebase {
    resolution: f64,
}

impl Default for Timebase {
    fn default() -> Self {
        Self::new()
    }
}

impl Timebase {
    /// create a timebase with the default resolution
    pub fn new() -> Self {
        Self {
            resolution: crate::DEFAULT_QUANT,
        }
    }

    /// create a timebase with specified resolution in seconds
    ///
    /// errors if resolution is lower than minimum
    pub fn new_with(resolution: f64) -> Result<Self, Error> {
        if !resolution.is_finite() || resolution < crate::MIN_QUANT {
            return Err(Error::Timebase(format!(
                "failed to create timebase with resolution {}",
                resolution
            )));
        }
        Ok(Self { resolution })
    }

    /// get timebase resolution in seconds
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// number of steps closest to the given duration in seconds
    pub fn steps(&self, seconds: f64) -> Time {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        (seconds / self.resolution).round() as Time
    }

    /// duration of the given number of steps in seconds
    pub fn seconds(&self, steps: Time) -> f64 {
        (steps as f64) * self.resolution
    }

    /// number of steps in one period of a clock at `freq` Hz
    ///
    /// returns 0 for non-positive frequencies
    pub fn period_of(&self, freq: f64) -> Time {
        if !freq.is_finite() || freq <= 0.0 {
            return 0;
        }
        self.steps(1.0 / freq)
    }
}
