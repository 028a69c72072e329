//! SPI slave engine
//!
//! the slave follows a bus driven by someone else. every chip-select
//! assertion starts a frame that is handed to the device's transaction
//! handler; the handler shifts as many bits as its protocol needs in step
//! with the external clock, then waits for the frame to end

use std::cell::{Cell, Ref, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use futures::future::{AbortHandle, Abortable};
use futures::task::{LocalSpawn, LocalSpawnExt};
use futures::FutureExt;

use spibus_bits::{word, Positions};
use spibus_sim::{Edge, Event, Time};

use crate::shift::{self, follow, Clocking, FollowClock, Followed, Phase};
use crate::{Bus, Error, FrameError, Role, SpiConfig};

/// a simulated peripheral behind a [`SpiSlave`]
///
/// device state is only touched from `transaction`; callers observe it
/// through the slave once it is idle
#[allow(async_fn_in_trait)]
pub trait SlaveDevice {
    fn config(&self) -> &SpiConfig;

    /// handle one chip-select frame
    ///
    /// implementations await [`Frame::started`] before touching their state,
    /// shift bits with [`Frame::shift`] and await [`Frame::ended`] before
    /// returning
    async fn transaction<B: Bus>(&mut self, frame: &Frame<'_, B>) -> Result<(), FrameError>;
}

/// one chip-select frame as seen by a device
pub struct Frame<'a, B> {
    bus: &'a B,
    config: &'a SpiConfig,
    started_at: Time,
    deadline: Option<Time>,
}

impl<'a, B: Bus> Frame<'a, B> {
    fn new(bus: &'a B, config: &'a SpiConfig, started_at: Time) -> Self {
        Self {
            bus,
            config,
            started_at,
            deadline: config
                .max_frame_length()
                .map(|length| started_at.saturating_add(length)),
        }
    }

    pub fn bus(&self) -> &B {
        self.bus
    }

    pub fn config(&self) -> &SpiConfig {
        self.config
    }

    pub fn started_at(&self) -> Time {
        self.started_at
    }

    /// true while chip-select is asserted
    pub fn is_active(&self) -> bool {
        self.config.is_asserted(self.bus.read(Role::ChipSelect))
    }

    /// resolves with the time chip-select was asserted
    ///
    /// a frame is only handed out once it has started, so this never waits
    pub async fn started(&self) -> Time {
        self.started_at
    }

    /// resolves once chip-select is deasserted
    ///
    /// errors if the clock moves again before that or the frame outlives its
    /// maximum length
    pub async fn ended(&self) -> Result<(), FrameError> {
        match follow(self.bus, self.config, self.config.leading_edge(), self.deadline).await {
            Followed::FrameEnd => Ok(()),
            Followed::Clock => Err(FrameError::Overrun),
            Followed::Deadline => Err(FrameError::TooLong {
                limit: self.config.max_frame_length().unwrap_or_default(),
            }),
        }
    }

    /// shift `bits` bits in step with the external clock, sending `tx` or
    /// the idle level, and return the bits received
    pub async fn shift(&self, bits: u32, tx: Option<u64>) -> Result<u64, FrameError> {
        let mut clocking = FollowClock::new(self.bus, self.config, bits, self.deadline);
        shift::shift(self.bus, self.config, &mut clocking, bits, tx).await
    }

    /// shift `bits` bits in, copying each sampled bit to the data-out line
    /// `delay` steps after it was sampled, and return the bits received
    ///
    /// the device behaves like a single flip-flop between data-in and
    /// data-out, so the other end reads the word back one bit late. the clock
    /// must not move again until each bit has been copied
    pub async fn transparent_shift(&self, bits: u32, delay: Time) -> Result<u64, FrameError> {
        let mut clocking = FollowClock::new(self.bus, self.config, bits, self.deadline);
        let sample = if self.config.cpha() {
            Phase::Trailing
        } else {
            Phase::Leading
        };

        let mut rx = 0;
        for (shifted, index) in (0u32..).zip(Positions::new(bits, self.config.bit_order())) {
            for phase in [Phase::Leading, Phase::Trailing] {
                clocking.edge(phase, shifted).await?;
                if phase != sample {
                    continue;
                }

                let level = self.bus.read(Role::DataIn);
                rx = word::with_bit(rx, index, level);

                let copy_at = self.bus.now().saturating_add(delay);
                match follow(self.bus, self.config, Edge::Any, Some(copy_at)).await {
                    Followed::Deadline => self.bus.write(Role::DataOut, level),
                    Followed::Clock => return Err(FrameError::EarlyEdge { delay }),
                    Followed::FrameEnd => {
                        return Err(FrameError::EndedEarly {
                            expected: bits,
                            shifted,
                        })
                    }
                }
            }
        }
        Ok(rx)
    }
}

struct Shared<B, D> {
    bus: B,
    config: SpiConfig,
    // taken by the frame task for the duration of a frame
    device: RefCell<Option<D>>,
    idle: Event,
    errors: RefCell<VecDeque<FrameError>>,
    error_raised: Event,
    frames: Cell<u64>,
    error_count: Cell<u64>,
}

/// an SPI bus slave wrapping a [`SlaveDevice`]
///
/// dropping the slave ends its background task
pub struct SpiSlave<B, D> {
    shared: Rc<Shared<B, D>>,
    task: AbortHandle,
}

impl<B, D> SpiSlave<B, D>
where
    B: Bus + 'static,
    D: SlaveDevice + 'static,
{
    /// create a slave for `device` on `bus` and spawn its frame task on `spawner`
    pub fn new<S>(bus: B, device: D, spawner: &S) -> Result<Self, Error>
    where
        S: LocalSpawn + ?Sized,
    {
        let config = device.config().clone();
        config.validate()?;

        bus.write(Role::DataOut, config.data_output_idle());
        let shared = Rc::new(Shared {
            bus,
            config,
            device: RefCell::new(Some(device)),
            idle: Event::new(),
            errors: RefCell::new(VecDeque::new()),
            error_raised: Event::new(),
            frames: Cell::new(0),
            error_count: Cell::new(0),
        });
        shared.idle.set();

        let (task, registration) = AbortHandle::new_pair();
        spawner.spawn_local(Abortable::new(run(shared.clone()), registration).map(|_| ()))?;

        Ok(Self { shared, task })
    }

    pub fn config(&self) -> &SpiConfig {
        &self.shared.config
    }

    /// true when no frame is being handled
    pub fn is_idle(&self) -> bool {
        self.shared.idle.is_set()
    }

    pub async fn wait_idle(&self) {
        self.shared.idle.wait().await
    }

    /// the device, or None while a frame is being handled
    ///
    /// a frame that starts while the returned guard is still held is not
    /// handed to the device and is recorded as a device error
    pub fn try_device(&self) -> Option<Ref<'_, D>> {
        if !self.is_idle() {
            return None;
        }
        Ref::filter_map(self.shared.device.borrow(), |device| device.as_ref()).ok()
    }

    /// wait for the slave to be idle, then inspect the device
    pub async fn with_device<R>(&self, f: impl FnOnce(&D) -> R) -> R {
        loop {
            let changed = self.shared.idle.notified();
            if let Some(device) = self.try_device() {
                return f(&*device);
            }
            changed.await;
        }
    }

    /// take the oldest recorded frame error
    pub fn take_error(&self) -> Option<FrameError> {
        self.shared.errors.borrow_mut().pop_front()
    }

    /// wait for a frame error and take it
    pub async fn next_error(&self) -> FrameError {
        loop {
            let raised = self.shared.error_raised.notified();
            if let Some(err) = self.take_error() {
                return err;
            }
            raised.await;
        }
    }

    /// number of frames that ended in an error
    pub fn error_count(&self) -> u64 {
        self.shared.error_count.get()
    }

    /// number of frames handled without error
    pub fn frame_count(&self) -> u64 {
        self.shared.frames.get()
    }
}

impl<B, D> Drop for SpiSlave<B, D> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run<B: Bus, D: SlaveDevice>(shared: Rc<Shared<B, D>>) {
    let bus = &shared.bus;
    let config = &shared.config;
    let mut last_end: Option<Time> = None;

    loop {
        shared.idle.set();
        bus.wait_edge(Role::ChipSelect, config.cs_assert_edge()).await;
        shared.idle.clear();

        let started_at = bus.now();
        log::debug!("{}: slave frame start", started_at);

        let since = last_end.map(|end| started_at.saturating_sub(end));
        let result = match since {
            Some(observed) if observed < config.frame_spacing() => Err(FrameError::Spacing {
                required: config.frame_spacing(),
                observed,
            }),
            _ => match shared.device.try_borrow_mut().map(|mut slot| slot.take()) {
                Ok(Some(mut device)) => {
                    let frame = Frame::new(bus, config, started_at);
                    let result = device.transaction(&frame).await;
                    *shared.device.borrow_mut() = Some(device);
                    result
                }
                Ok(None) => Ok(()),
                // a caller still holds the device from `try_device`
                Err(_) => Err(FrameError::device_with(
                    "device still borrowed when the frame started",
                )),
            },
        };

        match result {
            Ok(()) => {
                shared.frames.set(shared.frames.get() + 1);
                log::debug!("{}: slave frame end", bus.now());
            }
            Err(err) => {
                log::warn!("{}: slave frame error: {}", bus.now(), err);
                shared.errors.borrow_mut().push_back(err);
                shared.error_count.set(shared.error_count.get() + 1);
                shared.error_raised.set();
            }
        }

        if config.is_asserted(bus.read(Role::ChipSelect)) {
            bus.wait_edge(Role::ChipSelect, config.cs_deassert_edge()).await;
        }
        bus.write(Role::DataOut, config.data_output_idle());
        last_end = Some(bus.now());
    }
}
