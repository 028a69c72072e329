//! generic slave devices

pub mod loopback;
pub use loopback::Loopback;
