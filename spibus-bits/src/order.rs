use std::fmt::Display;

/// order in which the bits of a word appear on the wire
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Deserialize, serde::Serialize)]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

impl Default for BitOrder {
    fn default() -> Self {
        Self::MsbFirst
    }
}

impl Display for BitOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.is_msb_first() { "MSB" } else { "LSB" })
    }
}

impl From<bool> for BitOrder {
    /// `true` selects most-significant-bit first
    fn from(msb_first: bool) -> Self {
        if msb_first { Self::MsbFirst } else { Self::LsbFirst }
    }
}

impl BitOrder {
    pub fn is_msb_first(&self) -> bool {
        matches!(self, Self::MsbFirst)
    }

    pub fn is_lsb_first(&self) -> bool {
        matches!(self, Self::LsbFirst)
    }
}
