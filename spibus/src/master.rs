//! SPI master engine
//!
//! the master owns sclk and cs. words submitted by the caller are queued and
//! clocked out one chip-select frame each by a background task; the word
//! sampled during each frame is appended to the receive queue in the same
//! order

use std::cell::{Ref, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use futures::future::{AbortHandle, Abortable};
use futures::task::{LocalSpawn, LocalSpawnExt};
use futures::FutureExt;

use spibus_sim::{Event, Time};

use crate::shift::{shift, DriveClock};
use crate::{Bus, Error, InvalidDataError, Role, SpiConfig};

#[derive(Default)]
struct MasterState {
    tx: VecDeque<u64>,
    rx: VecDeque<u64>,
    in_flight: Option<AbortHandle>,
    submitted: u64,
    completed: u64,
    ignored: u64,
    last_deassert: Option<Time>,
}

struct Shared<B> {
    bus: B,
    config: SpiConfig,
    state: RefCell<MasterState>,
    tx_ready: Event,
    rx_ready: Event,
    progress: Event,
}

impl<B: Bus> Shared<B> {
    fn state(&self) -> Ref<'_, MasterState> {
        self.state.borrow()
    }

    fn drive_idle(&self) {
        self.bus.write(Role::ChipSelect, self.config.cs_level(false));
        self.bus.write(Role::Clock, self.config.cpol());
        self.bus.write(Role::DataOut, self.config.data_output_idle());
    }
}

/// resolve once `cond` holds, re-checking it each time `event` is set
async fn wait_until(event: &Event, mut cond: impl FnMut() -> bool) {
    loop {
        let notified = event.notified();
        if cond() {
            return;
        }
        notified.await;
    }
}

/// an SPI bus master
///
/// dropping the master ends its background task and returns the bus to its
/// idle levels
pub struct SpiMaster<B: Bus> {
    shared: Rc<Shared<B>>,
    task: AbortHandle,
}

impl<B: Bus + 'static> SpiMaster<B> {
    /// create a master driving `bus` and spawn its protocol task on `spawner`
    ///
    /// the bus lines are driven to their idle levels straight away and the
    /// first frame starts no earlier than one frame spacing later
    pub fn new<S>(bus: B, config: SpiConfig, spawner: &S) -> Result<Self, Error>
    where
        S: LocalSpawn + ?Sized,
    {
        config.validate()?;

        // the bus counts as idle since construction, so the first frame
        // keeps its spacing too
        let now = bus.now();
        let shared = Rc::new(Shared {
            bus,
            config,
            state: RefCell::new(MasterState {
                last_deassert: Some(now),
                ..MasterState::default()
            }),
            tx_ready: Event::new(),
            rx_ready: Event::new(),
            progress: Event::new(),
        });
        shared.drive_idle();

        let (task, registration) = AbortHandle::new_pair();
        spawner.spawn_local(Abortable::new(run(shared.clone()), registration).map(|_| ()))?;

        Ok(Self { shared, task })
    }

    pub fn config(&self) -> &SpiConfig {
        &self.shared.config
    }

    /// queue `words` for transmission
    ///
    /// nothing is queued if any word does not fit the word width
    pub fn submit<I>(&self, words: I) -> Result<(), InvalidDataError>
    where
        I: IntoIterator<Item = u64>,
    {
        let words = words.into_iter().collect::<Vec<_>>();
        let width = self.shared.config.word_width();
        for (index, &word) in words.iter().enumerate() {
            self.shared
                .config
                .check_word(word)
                .map_err(|_| InvalidDataError { index, word, width })?;
        }
        if words.is_empty() {
            return Ok(());
        }

        {
            let mut state = self.shared.state.borrow_mut();
            state.submitted += words.len() as u64;
            state.tx.extend(words);
        }
        self.shared.tx_ready.set();
        Ok(())
    }

    /// queue `words` and wait until all of them have been clocked out
    ///
    /// words dropped by a [`SpiMaster::reset`] count as clocked out
    pub async fn submit_blocking<I>(&self, words: I) -> Result<(), InvalidDataError>
    where
        I: IntoIterator<Item = u64>,
    {
        self.submit(words)?;
        let target = self.shared.state().submitted;
        wait_until(&self.shared.progress, || self.shared.state().completed >= target).await;
        Ok(())
    }

    /// take up to `count` received words, or all of them
    pub fn retrieve(&self, count: Option<usize>) -> Vec<u64> {
        let mut state = self.shared.state.borrow_mut();
        let count = count.map_or(state.rx.len(), |count| count.min(state.rx.len()));
        state.rx.drain(..count).collect()
    }

    /// wait until `count` words (at least one if unspecified) have been
    /// received, then take them
    pub async fn retrieve_blocking(&self, count: Option<usize>) -> Vec<u64> {
        let wanted = count.unwrap_or(1);
        wait_until(&self.shared.rx_ready, || self.shared.state().rx.len() >= wanted).await;
        self.retrieve(count)
    }

    /// number of words waiting to be clocked out, excluding the one in flight
    pub fn pending_tx_count(&self) -> usize {
        self.shared.state().tx.len()
    }

    pub fn pending_rx_count(&self) -> usize {
        self.shared.state().rx.len()
    }

    pub fn tx_is_empty(&self) -> bool {
        self.shared.state().tx.is_empty()
    }

    pub fn rx_is_empty(&self) -> bool {
        self.shared.state().rx.is_empty()
    }

    /// true if both queues are empty and no frame is in flight
    pub fn is_idle(&self) -> bool {
        let state = self.shared.state();
        state.tx.is_empty() && state.rx.is_empty() && state.in_flight.is_none()
    }

    /// wait until every queued word has been clocked out
    pub async fn wait_idle(&self) {
        wait_until(&self.shared.progress, || {
            let state = self.shared.state();
            state.tx.is_empty() && state.in_flight.is_none()
        })
        .await
    }

    /// number of received words equal to the configured ignore value
    pub fn ignored_rx_count(&self) -> u64 {
        self.shared.state().ignored
    }

    /// drop every queued word and abort the frame in flight
    ///
    /// the bus is returned to its idle levels; a reset with nothing queued
    /// changes nothing
    pub fn reset(&self) {
        let now = self.shared.bus.now();
        let aborted = {
            let mut state = self.shared.state.borrow_mut();
            state.tx.clear();
            state.rx.clear();
            state.completed = state.submitted;
            let aborted = state.in_flight.take();
            if aborted.is_some() {
                state.last_deassert = Some(now);
            }
            aborted
        };

        self.shared.drive_idle();
        if let Some(in_flight) = aborted {
            log::debug!("{}: master reset aborted a frame", now);
            in_flight.abort();
        }
        self.shared.progress.set();
    }
}

impl<B: Bus> Drop for SpiMaster<B> {
    fn drop(&mut self) {
        self.task.abort();
        if let Some(in_flight) = self.shared.state.borrow_mut().in_flight.take() {
            in_flight.abort();
        }
        self.shared.drive_idle();
    }
}

async fn run<B: Bus>(shared: Rc<Shared<B>>) {
    loop {
        wait_until(&shared.tx_ready, || !shared.state().tx.is_empty()).await;

        let (in_flight, registration) = AbortHandle::new_pair();
        let word = {
            let mut state = shared.state.borrow_mut();
            let Some(word) = state.tx.pop_front() else {
                continue;
            };
            state.in_flight = Some(in_flight);
            word
        };

        let Ok(rx) = Abortable::new(transfer(&shared, word), registration).await else {
            // reset already cleared the state and idled the bus
            continue;
        };

        {
            let mut state = shared.state.borrow_mut();
            state.in_flight = None;
            state.rx.push_back(rx);
            state.completed += 1;
            if shared.config.is_ignored(rx) {
                state.ignored += 1;
                log::debug!("{}: master read {:#x} (ignored)", shared.bus.now(), rx);
            } else {
                log::debug!("{}: master read {:#x}", shared.bus.now(), rx);
            }
        }
        shared.rx_ready.set();
        shared.progress.set();
    }
}

/// clock one word out inside its own chip-select frame
async fn transfer<B: Bus>(shared: &Shared<B>, word: u64) -> u64 {
    let bus = &shared.bus;
    let config = &shared.config;

    let last_deassert = shared.state().last_deassert;
    if let Some(last_deassert) = last_deassert {
        let ready_at = last_deassert.saturating_add(config.frame_spacing());
        let now = bus.now();
        if ready_at > now {
            bus.wait_duration(ready_at - now).await;
        }
    }

    log::debug!("{}: master write {:#x}", bus.now(), word);
    bus.write(Role::ChipSelect, config.cs_level(true));

    let mut clocking = DriveClock::new(bus, config);
    let rx = match shift(bus, config, &mut clocking, config.word_width(), Some(word)).await {
        Ok(rx) => rx,
        Err(never) => match never {},
    };

    bus.wait_duration(config.half_periods().0).await;
    bus.write(Role::ChipSelect, config.cs_level(false));
    bus.write(Role::DataOut, config.data_output_idle());
    shared.state.borrow_mut().last_deassert = Some(bus.now());
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SpiSignals;
    use spibus_sim::Simulator;

    #[test]
    fn test_rejected_submit_leaves_queue_untouched() {
        let sim = Simulator::new();
        let handle = sim.handle();
        let config = SpiConfig::builder().word_width(4).build().unwrap();
        let signals = SpiSignals::new(&handle, &config);
        let master = SpiMaster::new(signals.master(&handle), config, &handle).unwrap();

        let err = master.submit([1, 2, 0x10, 3]).unwrap_err();
        assert_eq!(err, InvalidDataError { index: 2, word: 0x10, width: 4 });
        assert_eq!(master.pending_tx_count(), 0);
        assert!(master.is_idle());

        master.submit([0xf]).unwrap();
        assert_eq!(master.pending_tx_count(), 1);
        assert!(!master.is_idle());
    }

    #[test]
    fn test_idle_levels_follow_config() {
        let sim = Simulator::new();
        let handle = sim.handle();
        let config = SpiConfig::builder()
            .cpol(true)
            .data_output_idle(false)
            .cs_active_low(false)
            .build()
            .unwrap();
        // signals start at the opposite levels
        let sclk = handle.signal("sclk", false);
        let mosi = handle.signal("mosi", true);
        let miso = handle.signal("miso", true);
        let cs = handle.signal("cs", true);
        let bus = crate::SimBus::new(handle.clone(), sclk, mosi, miso, cs);

        let _master = SpiMaster::new(bus, config, &handle).unwrap();
        assert!(handle.read(sclk));
        assert!(!handle.read(mosi));
        assert!(!handle.read(cs));
    }
}
