//! simulation kernel
//!
//! a single-threaded discrete-event kernel: boolean signals with edge
//! waiters, simulated-time delays and a local executor that only advances
//! time once every task has stalled

pub mod error;
pub mod event;
pub mod kernel;
pub mod signal;
pub mod types;

pub use error::*;
pub use event::Event;
pub use kernel::{Delay, EdgeWait, Handle, Simulator};
pub use signal::{Digital, Edge, Signal, SignalLogger};
pub use types::*;

/// global minimum simulation time resolution in seconds
pub const MIN_QUANT: f64 = 1e-15;

/// default simulation time resolution in seconds
pub const DEFAULT_QUANT: f64 = 1e-12;
