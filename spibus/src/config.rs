//! bus configuration
//!
//! a `SpiConfig` is built once through [`SpiConfigBuilder`] and shared by
//! value between the engines; durations are in simulation steps

use serde::{Deserialize, Serialize};

use spibus_bits::{word, BitOrder, WordError};
use spibus_sim::{Edge, Time, Timebase};

use crate::InvalidConfigError;

/// SPI mode (clock polarity and phase)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

impl SpiMode {
    pub fn new(cpol: bool, cpha: bool) -> Self {
        match (cpol, cpha) {
            (false, false) => Self::Mode0,
            (false, true) => Self::Mode1,
            (true, false) => Self::Mode2,
            (true, true) => Self::Mode3,
        }
    }

    pub fn cpol(&self) -> bool {
        matches!(self, Self::Mode2 | Self::Mode3)
    }

    pub fn cpha(&self) -> bool {
        matches!(self, Self::Mode1 | Self::Mode3)
    }

    /// mode number, `2 * cpol + cpha`
    pub fn index(&self) -> u8 {
        2 * self.cpol() as u8 + self.cpha() as u8
    }

    pub fn all() -> [Self; 4] {
        [Self::Mode0, Self::Mode1, Self::Mode2, Self::Mode3]
    }
}

impl TryFrom<u8> for SpiMode {
    type Error = u8;

    fn try_from(index: u8) -> Result<Self, u8> {
        match index {
            0..=3 => Ok(Self::new(index & 0b10 != 0, index & 0b01 != 0)),
            _ => Err(index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiConfig {
    word_width: u32,
    sclk_period: Time,
    cpol: bool,
    cpha: bool,
    bit_order: BitOrder,
    data_output_idle: bool,
    frame_spacing: Time,
    cs_active_low: bool,
    ignore_rx_value: Option<u64>,
    max_frame_length: Option<Time>,
}

impl Default for SpiConfig {
    /// 8-bit words at 25 MHz, mode 0, MSB first, 1 ns frame spacing,
    /// idle-high data and an active-low chip-select, on the default timebase
    fn default() -> Self {
        let timebase = Timebase::new();
        Self {
            word_width: 8,
            sclk_period: timebase.period_of(25e6),
            cpol: false,
            cpha: false,
            bit_order: BitOrder::MsbFirst,
            data_output_idle: true,
            frame_spacing: timebase.steps(1e-9),
            cs_active_low: true,
            ignore_rx_value: None,
            max_frame_length: None,
        }
    }
}

impl SpiConfig {
    pub fn builder() -> SpiConfigBuilder {
        SpiConfigBuilder::default()
    }

    /// errors on any field the engines cannot honour
    pub fn validate(&self) -> Result<(), InvalidConfigError> {
        word::check_width(self.word_width)
            .map_err(|_| InvalidConfigError::WordWidth(self.word_width))?;
        if self.sclk_period < 2 {
            return Err(InvalidConfigError::SclkPeriod(self.sclk_period));
        }
        if self.frame_spacing == 0 {
            return Err(InvalidConfigError::FrameSpacing);
        }
        if self.max_frame_length == Some(0) {
            return Err(InvalidConfigError::MaxFrameLength);
        }
        if let Some(value) = self.ignore_rx_value {
            if !word::fits(value, self.word_width) {
                return Err(InvalidConfigError::IgnoreValue {
                    value,
                    width: self.word_width,
                });
            }
        }
        Ok(())
    }

    pub fn word_width(&self) -> u32 {
        self.word_width
    }

    pub fn sclk_period(&self) -> Time {
        self.sclk_period
    }

    pub fn cpol(&self) -> bool {
        self.cpol
    }

    pub fn cpha(&self) -> bool {
        self.cpha
    }

    pub fn mode(&self) -> SpiMode {
        SpiMode::new(self.cpol, self.cpha)
    }

    pub fn bit_order(&self) -> BitOrder {
        self.bit_order
    }

    pub fn msb_first(&self) -> bool {
        self.bit_order.is_msb_first()
    }

    pub fn data_output_idle(&self) -> bool {
        self.data_output_idle
    }

    pub fn frame_spacing(&self) -> Time {
        self.frame_spacing
    }

    pub fn cs_active_low(&self) -> bool {
        self.cs_active_low
    }

    pub fn ignore_rx_value(&self) -> Option<u64> {
        self.ignore_rx_value
    }

    pub fn max_frame_length(&self) -> Option<Time> {
        self.max_frame_length
    }

    /// durations of the first and second half of a clock period
    pub fn half_periods(&self) -> (Time, Time) {
        let first = self.sclk_period / 2;
        (first, self.sclk_period - first)
    }

    /// first clock edge of a bit period
    pub fn leading_edge(&self) -> Edge {
        Edge::to(!self.cpol)
    }

    /// second clock edge of a bit period
    pub fn trailing_edge(&self) -> Edge {
        Edge::to(self.cpol)
    }

    /// chip-select line level for the given assertion state
    pub fn cs_level(&self, asserted: bool) -> bool {
        asserted != self.cs_active_low
    }

    pub fn is_asserted(&self, cs_level: bool) -> bool {
        cs_level == self.cs_level(true)
    }

    pub fn cs_assert_edge(&self) -> Edge {
        Edge::to(self.cs_level(true))
    }

    pub fn cs_deassert_edge(&self) -> Edge {
        Edge::to(self.cs_level(false))
    }

    /// true if `word` equals the configured don't-care value
    pub fn is_ignored(&self, word: u64) -> bool {
        self.ignore_rx_value == Some(word)
    }

    pub fn check_word(&self, word: u64) -> Result<u64, WordError> {
        word::check_word(word, self.word_width)
    }
}

/// builder for [`SpiConfig`]; starts from the defaults
#[derive(Debug, Clone, Default)]
pub struct SpiConfigBuilder {
    config: SpiConfig,
}

impl SpiConfigBuilder {
    pub fn word_width(mut self, width: u32) -> Self {
        self.config.word_width = width;
        self
    }

    pub fn sclk_period(mut self, period: Time) -> Self {
        self.config.sclk_period = period;
        self
    }

    /// set the clock period from a frequency in Hz
    pub fn sclk_freq(mut self, freq: f64, timebase: &Timebase) -> Self {
        self.config.sclk_period = timebase.period_of(freq);
        self
    }

    pub fn cpol(mut self, cpol: bool) -> Self {
        self.config.cpol = cpol;
        self
    }

    pub fn cpha(mut self, cpha: bool) -> Self {
        self.config.cpha = cpha;
        self
    }

    pub fn mode(self, mode: SpiMode) -> Self {
        self.cpol(mode.cpol()).cpha(mode.cpha())
    }

    pub fn bit_order(mut self, order: BitOrder) -> Self {
        self.config.bit_order = order;
        self
    }

    pub fn msb_first(self, msb_first: bool) -> Self {
        self.bit_order(BitOrder::from(msb_first))
    }

    pub fn data_output_idle(mut self, level: bool) -> Self {
        self.config.data_output_idle = level;
        self
    }

    pub fn frame_spacing(mut self, spacing: Time) -> Self {
        self.config.frame_spacing = spacing;
        self
    }

    pub fn cs_active_low(mut self, active_low: bool) -> Self {
        self.config.cs_active_low = active_low;
        self
    }

    /// treat received words equal to `value` as don't-care
    pub fn ignore_rx_value(mut self, value: u64) -> Self {
        self.config.ignore_rx_value = Some(value);
        self
    }

    /// report slave frames that keep chip-select asserted for longer than `length`
    pub fn max_frame_length(mut self, length: Time) -> Self {
        self.config.max_frame_length = Some(length);
        self
    }

    pub fn build(self) -> Result<SpiConfig, InvalidConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SpiConfig::builder().build().unwrap();
        assert_eq!(config, SpiConfig::default());
        assert_eq!(config.word_width(), 8);
        assert_eq!(config.sclk_period(), 40_000);
        assert_eq!(config.frame_spacing(), 1_000);
        assert_eq!(config.mode(), SpiMode::Mode0);
        assert!(config.msb_first());
        assert!(config.data_output_idle());
        assert!(config.cs_active_low());
    }

    #[test]
    fn test_mode_mapping() {
        for (index, mode) in SpiMode::all().into_iter().enumerate() {
            assert_eq!(mode.index() as usize, index);
            assert_eq!(SpiMode::try_from(index as u8), Ok(mode));

            let config = SpiConfig::builder().mode(mode).build().unwrap();
            assert_eq!(config.mode(), mode);
            assert_eq!(2 * config.cpol() as u8 + config.cpha() as u8, mode.index());
        }
        assert_eq!(SpiMode::try_from(4), Err(4));
    }

    #[test]
    fn test_edges_follow_polarity() {
        let idle_low = SpiConfig::builder().cpol(false).build().unwrap();
        assert_eq!(idle_low.leading_edge(), Edge::Rising);
        assert_eq!(idle_low.trailing_edge(), Edge::Falling);

        let idle_high = SpiConfig::builder().cpol(true).build().unwrap();
        assert_eq!(idle_high.leading_edge(), Edge::Falling);
        assert_eq!(idle_high.trailing_edge(), Edge::Rising);
    }

    #[test]
    fn test_chip_select_polarity() {
        let low = SpiConfig::builder().cs_active_low(true).build().unwrap();
        assert!(!low.cs_level(true));
        assert!(low.is_asserted(false));
        assert_eq!(low.cs_assert_edge(), Edge::Falling);
        assert_eq!(low.cs_deassert_edge(), Edge::Rising);

        let high = SpiConfig::builder().cs_active_low(false).build().unwrap();
        assert!(high.cs_level(true));
        assert!(high.is_asserted(true));
        assert_eq!(high.cs_assert_edge(), Edge::Rising);
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        assert_eq!(
            SpiConfig::builder().word_width(0).build(),
            Err(InvalidConfigError::WordWidth(0)),
        );
        assert_eq!(
            SpiConfig::builder().word_width(65).build(),
            Err(InvalidConfigError::WordWidth(65)),
        );
        assert_eq!(
            SpiConfig::builder().sclk_period(1).build(),
            Err(InvalidConfigError::SclkPeriod(1)),
        );
        assert_eq!(
            SpiConfig::builder().sclk_freq(-1.0, &Timebase::new()).build(),
            Err(InvalidConfigError::SclkPeriod(0)),
        );
        assert_eq!(
            SpiConfig::builder().frame_spacing(0).build(),
            Err(InvalidConfigError::FrameSpacing),
        );
        assert_eq!(
            SpiConfig::builder().max_frame_length(0).build(),
            Err(InvalidConfigError::MaxFrameLength),
        );
        assert_eq!(
            SpiConfig::builder().ignore_rx_value(0x100).build(),
            Err(InvalidConfigError::IgnoreValue { value: 0x100, width: 8 }),
        );
    }

    #[test]
    fn test_half_periods_cover_odd_periods() {
        let config = SpiConfig::builder().sclk_period(5).build().unwrap();
        assert_eq!(config.half_periods(), (2, 3));
    }

    #[test]
    fn test_ignore_value() {
        let config = SpiConfig::builder().ignore_rx_value(0x80).build().unwrap();
        assert!(config.is_ignored(0x80));
        assert!(!config.is_ignored(0x81));
        assert!(!SpiConfig::default().is_ignored(0));
    }
}
