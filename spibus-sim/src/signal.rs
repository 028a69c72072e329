//! digital signals
//!

use std::sync::mpsc;

use crate::Time;

/// handle to a signal owned by a simulation kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signal(pub(crate) usize);

impl Signal {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// signal transition to wait for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Rising,
    Falling,
    Any,
}

impl Edge {
    /// the edge that leaves a signal at `level`
    pub fn to(level: bool) -> Self {
        if level { Self::Rising } else { Self::Falling }
    }

    /// true if a transition to `level` is this edge
    pub fn matches(&self, level: bool) -> bool {
        match self {
            Self::Rising => level,
            Self::Falling => !level,
            Self::Any => true,
        }
    }
}

/// events recorded for a digital signal
///
/// Hi represents logic high (1) that occurs at Time
/// Lo represents logic low (0) that occurs at Time
#[derive(Clone, Copy, PartialEq, Eq, std::fmt::Debug)]
pub enum Digital {
    Hi(Time),
    Lo(Time),
}

impl Digital {
    pub(crate) fn new(level: bool, time: Time) -> Self {
        if level { Self::Hi(time) } else { Self::Lo(time) }
    }

    pub fn time(&self) -> Time {
        match self {
            Self::Hi(time) | Self::Lo(time) => *time,
        }
    }

    pub fn level(&self) -> bool {
        matches!(self, Self::Hi(_))
    }
}

/// a logger for signal events
pub struct SignalLogger {
    log: Vec<Digital>,
    rx: mpsc::Receiver<Digital>,
}

impl SignalLogger {
    pub fn new_with(rx: mpsc::Receiver<Digital>) -> Self {
        Self {
            log: Vec::new(),
            rx,
        }
    }

    /// get a slice of the current log
    pub fn log(&self) -> &[Digital] {
        &self.log
    }

    /// collect pending events into the log
    pub fn collect_pending(&mut self) {
        self.log.extend(self.rx.try_iter());
    }

    /// level of the signal at `time` according to the collected log
    ///
    /// returns None if nothing was logged at or before `time`
    pub fn level_at(&self, time: Time) -> Option<bool> {
        self.log
            .iter()
            .take_while(|event| event.time() <= time)
            .last()
            .map(Digital::level)
    }
}
