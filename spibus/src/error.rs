//! engine errors

use futures::task::SpawnError;
use thiserror::Error;

use spibus_sim::Time;

/// configuration rejected at construction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidConfigError {
    #[error("invalid word width `{0}`; expected 1..=64")]
    WordWidth(u32),
    #[error("sclk period of {0} steps is too short; expected at least 2")]
    SclkPeriod(Time),
    #[error("frame spacing must be at least one step")]
    FrameSpacing,
    #[error("maximum frame length must be at least one step")]
    MaxFrameLength,
    #[error("ignore value {value:#x} does not fit in {width} bits")]
    IgnoreValue { value: u64, width: u32 },
}

/// submitted word out of range; nothing was queued
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("word {word:#x} at index {index} does not fit in {width} bits")]
pub struct InvalidDataError {
    pub index: usize,
    pub word: u64,
    pub width: u32,
}

/// a slave frame whose data cannot be trusted
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame ended after {shifted} of {expected} bits")]
    EndedEarly { expected: u32, shifted: u32 },
    #[error("clock kept running after the frame's last bit")]
    Overrun,
    #[error("clock moved within {delay} steps of sampling a bit, before it was copied out")]
    EarlyEdge { delay: Time },
    #[error("frame exceeded its maximum length of {limit} steps")]
    TooLong { limit: Time },
    #[error("frame started {observed} steps after the previous one; expected at least {required}")]
    Spacing { required: Time, observed: Time },
    #[error("device error: {0}")]
    Device(anyhow::Error),
}

impl FrameError {
    /// used to wrap a device error
    pub fn device<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Device(anyhow::Error::new(e))
    }

    /// used to generate a device error with custom message
    pub fn device_with<M>(msg: M) -> Self
    where
        M: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        Self::Device(anyhow::Error::msg(msg))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] InvalidConfigError),
    #[error(transparent)]
    Data(#[from] InvalidDataError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Sim(#[from] spibus_sim::Error),
    #[error("failed to spawn engine task: {0}")]
    Spawn(#[from] SpawnError),
}
