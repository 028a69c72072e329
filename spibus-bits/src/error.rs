use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WordError {
    #[error("invalid word width `{0}`; expected 1..=64")]
    InvalidWidth(u32),
    #[error("word {word:#x} does not fit in {width} bits")]
    OutOfRange { word: u64, width: u32 },
}
