//! bit-shift primitive
//!
//! one loop serves all four modes and both ends of the bus; only the
//! source of clock edges differs. a master generates them with
//! [`DriveClock`], a slave follows an external clock

use std::convert::Infallible;

use futures::future::{self, select, Either};
use futures::pin_mut;

use spibus_bits::{word, Positions};
use spibus_sim::{Edge, Time};

use crate::{Bus, FrameError, Role, SpiConfig};

/// the two clock edges of a bit period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Leading,
    Trailing,
}

impl Phase {
    pub fn edge(&self, config: &SpiConfig) -> Edge {
        match self {
            Self::Leading => config.leading_edge(),
            Self::Trailing => config.trailing_edge(),
        }
    }
}

/// a source of clock edges for [`shift`]
#[allow(async_fn_in_trait)]
pub trait Clocking {
    type Error;

    /// resolves once the clock has made the `phase` edge of the bit
    /// following the first `shifted` bits
    async fn edge(&mut self, phase: Phase, shifted: u32) -> Result<(), Self::Error>;
}

/// generates the clock: each edge waits half a period, then toggles sclk
pub struct DriveClock<'a, B> {
    bus: &'a B,
    config: &'a SpiConfig,
}

impl<'a, B: Bus> DriveClock<'a, B> {
    pub fn new(bus: &'a B, config: &'a SpiConfig) -> Self {
        Self { bus, config }
    }
}

impl<B: Bus> Clocking for DriveClock<'_, B> {
    type Error = Infallible;

    async fn edge(&mut self, phase: Phase, _shifted: u32) -> Result<(), Infallible> {
        let (first, second) = self.config.half_periods();
        let (wait, level) = match phase {
            Phase::Leading => (first, !self.config.cpol()),
            Phase::Trailing => (second, self.config.cpol()),
        };
        self.bus.wait_duration(wait).await;
        self.bus.write(Role::Clock, level);
        Ok(())
    }
}

/// follows an externally driven clock within one chip-select frame
pub(crate) struct FollowClock<'a, B> {
    bus: &'a B,
    config: &'a SpiConfig,
    bits: u32,
    deadline: Option<Time>,
}

impl<'a, B: Bus> FollowClock<'a, B> {
    pub(crate) fn new(bus: &'a B, config: &'a SpiConfig, bits: u32, deadline: Option<Time>) -> Self {
        Self {
            bus,
            config,
            bits,
            deadline,
        }
    }
}

impl<B: Bus> Clocking for FollowClock<'_, B> {
    type Error = FrameError;

    async fn edge(&mut self, phase: Phase, shifted: u32) -> Result<(), FrameError> {
        match follow(self.bus, self.config, phase.edge(self.config), self.deadline).await {
            Followed::Clock => Ok(()),
            Followed::FrameEnd => Err(FrameError::EndedEarly {
                expected: self.bits,
                shifted,
            }),
            Followed::Deadline => Err(FrameError::TooLong {
                limit: self.config.max_frame_length().unwrap_or_default(),
            }),
        }
    }
}

/// what ended a wait on the clock inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Followed {
    Clock,
    FrameEnd,
    Deadline,
}

/// wait for `edge` on the clock, the end of the frame or the frame deadline,
/// whichever comes first
///
/// a frame end is reported straight away if chip-select is already deasserted
pub(crate) async fn follow<B: Bus>(
    bus: &B,
    config: &SpiConfig,
    edge: Edge,
    deadline: Option<Time>,
) -> Followed {
    if !config.is_asserted(bus.read(Role::ChipSelect)) {
        return Followed::FrameEnd;
    }

    let end = bus.wait_edge(Role::ChipSelect, config.cs_deassert_edge());
    let clock = bus.wait_edge(Role::Clock, edge);
    let timeout = async {
        match deadline {
            Some(deadline) => bus.wait_duration(deadline.saturating_sub(bus.now())).await,
            None => future::pending::<()>().await,
        }
    };
    pin_mut!(end, clock, timeout);

    // the frame end takes precedence over an edge seen in the same poll
    match select(end, select(clock, timeout)).await {
        Either::Left(_) => Followed::FrameEnd,
        Either::Right((Either::Left(_), _)) => Followed::Clock,
        Either::Right((Either::Right(_), _)) => Followed::Deadline,
    }
}

/// shift `bits` bits of `tx` out on the data-out line while sampling the
/// data-in line, in the configured bit order
///
/// with CPHA=0 a bit is driven before its leading edge and sampled on it; with
/// CPHA=1 it is driven on the leading edge and sampled on the trailing edge.
/// without a `tx` word the line is held at the idle level. received bits land
/// at the index they were clocked from, so the result reads like `tx`
pub async fn shift<B, C>(
    bus: &B,
    config: &SpiConfig,
    clocking: &mut C,
    bits: u32,
    tx: Option<u64>,
) -> Result<u64, C::Error>
where
    B: Bus,
    C: Clocking,
{
    let drive = |index: u32| {
        let level = tx.map_or(config.data_output_idle(), |tx| word::bit(tx, index));
        bus.write(Role::DataOut, level);
    };
    let sample = |rx: u64, index: u32| word::with_bit(rx, index, bus.read(Role::DataIn));

    let mut positions = Positions::new(bits, config.bit_order()).peekable();
    if !config.cpha() {
        if let Some(&first) = positions.peek() {
            drive(first);
        }
    }

    let mut rx = 0;
    let mut shifted = 0;
    while let Some(index) = positions.next() {
        clocking.edge(Phase::Leading, shifted).await?;
        if config.cpha() {
            drive(index);
        } else {
            rx = sample(rx, index);
        }

        clocking.edge(Phase::Trailing, shifted).await?;
        if config.cpha() {
            rx = sample(rx, index);
        } else if let Some(&next) = positions.peek() {
            drive(next);
        }
        shifted += 1;
    }
    Ok(rx)
}
