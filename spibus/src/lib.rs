//! SPI bus engines for event-driven logic simulation
//!
//! [`SpiMaster`] owns the clock and chip-select and shifts queued words out
//! onto the bus; [`SpiSlave`] follows an externally driven bus and hands each
//! chip-select frame to a [`SlaveDevice`]. Both talk to the simulation only
//! through the [`Bus`] capability.

pub mod bus;
pub mod config;
pub mod devices;
pub mod error;
pub mod master;
pub mod shift;
pub mod slave;

pub use bus::{Bus, Role, SimBus, SpiSignals};
pub use config::{SpiConfig, SpiConfigBuilder, SpiMode};
pub use error::*;
pub use master::SpiMaster;
pub use slave::{Frame, SlaveDevice, SpiSlave};

pub use spibus_bits::BitOrder;
pub use spibus_sim::{Edge, Time, Timebase};
