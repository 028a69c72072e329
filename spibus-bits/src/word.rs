//! word helpers
//!
//! words are carried as `u64` regardless of their configured width;
//! these helpers keep every width-dependent computation in one place

use crate::order::BitOrder;
use crate::WordError;

/// widest word that fits the `u64` carrier
pub const MAX_WIDTH: u32 = u64::BITS;

/// errors if `width` cannot be carried by a `u64` word
pub fn check_width(width: u32) -> Result<u32, WordError> {
    if width == 0 || width > MAX_WIDTH {
        Err(WordError::InvalidWidth(width))
    } else {
        Ok(width)
    }
}

/// mask covering the low `width` bits
#[inline(always)]
pub fn mask(width: u32) -> u64 {
    if width >= MAX_WIDTH {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// true if `word` is representable in `width` bits
#[inline(always)]
pub fn fits(word: u64, width: u32) -> bool {
    word & !mask(width) == 0
}

/// errors if `word` is not representable in `width` bits
pub fn check_word(word: u64, width: u32) -> Result<u64, WordError> {
    if fits(word, width) {
        Ok(word)
    } else {
        Err(WordError::OutOfRange { word, width })
    }
}

/// value of bit `index` of `word`
#[inline(always)]
pub fn bit(word: u64, index: u32) -> bool {
    index < MAX_WIDTH && (word >> index) & 1 == 1
}

/// `word` with bit `index` set to `value`
#[inline(always)]
pub fn with_bit(word: u64, index: u32, value: bool) -> u64 {
    if index >= MAX_WIDTH {
        word
    } else if value {
        word | (1u64 << index)
    } else {
        word & !(1u64 << index)
    }
}

/// bit indices of a `width`-bit word in the order they are clocked
#[derive(Debug, Clone)]
pub struct Positions {
    order: BitOrder,
    front: u32,
    back: u32,
}

impl Positions {
    pub fn new(width: u32, order: BitOrder) -> Self {
        Self {
            order,
            front: 0,
            back: width.min(MAX_WIDTH),
        }
    }
}

impl Iterator for Positions {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.front >= self.back {
            return None;
        }
        if self.order.is_msb_first() {
            self.back -= 1;
            Some(self.back)
        } else {
            self.front += 1;
            Some(self.front - 1)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = (self.back - self.front) as usize;
        (len, Some(len))
    }
}

impl ExactSizeIterator for Positions {}
