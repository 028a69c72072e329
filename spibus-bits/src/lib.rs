pub mod error;
pub use error::*;

pub mod order;
pub use order::BitOrder;

pub mod word;
pub use word::{Positions, MAX_WIDTH};
