//! simulation errors

use futures::task::SpawnError;
use thiserror::Error;

use crate::Time;

#[derive(Error, Debug)]
pub enum Error {
    #[error("simulation time: {0} | no pending events left to run")]
    Stalled(Time),
    #[error("simulation time: {0} | time limit reached")]
    TimeLimit(Time),
    #[error("timebase error: {0}")]
    Timebase(String),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
}
