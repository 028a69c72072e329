//! simulation kernel
//!
//! signal writes take effect immediately and wake every waiter registered
//! for a matching edge. time only advances once the executor has stalled,
//! jumping straight to the earliest pending delay

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::mpsc;
use std::task::{Context, Poll, Waker};

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::{LocalFutureObj, LocalSpawn, LocalSpawnExt, SpawnError};

use crate::signal::{Digital, Edge, Signal, SignalLogger};
use crate::types::{Time, Timebase};
use crate::Error;

struct Waiter {
    id: u64,
    edge: Edge,
    waker: Waker,
}

struct SignalState {
    name: String,
    value: bool,
    waiters: Vec<Waiter>,
    loggers: Vec<mpsc::Sender<Digital>>,
}

struct Kernel {
    now: Time,
    timebase: Timebase,
    next_id: u64,
    timers: BTreeMap<(Time, u64), Waker>,
    signals: Vec<SignalState>,
    fired: HashSet<u64>,
}

impl Kernel {
    fn new(timebase: Timebase) -> Self {
        Self {
            now: 0,
            timebase,
            next_id: 0,
            timers: BTreeMap::new(),
            signals: Vec::new(),
            fired: HashSet::new(),
        }
    }

    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn next_deadline(&self) -> Option<Time> {
        self.timers.keys().next().map(|(deadline, _)| *deadline)
    }

    /// move time forward to `time` and return the wakers of every delay due by then
    fn advance_to(&mut self, time: Time) -> Vec<Waker> {
        self.now = self.now.max(time);
        let later = self.timers.split_off(&(self.now.saturating_add(1), 0));
        let due = std::mem::replace(&mut self.timers, later);
        due.into_values().collect()
    }
}

/// a cloneable reference to a running kernel
///
/// handles are what simulation tasks hold: they read and drive signals,
/// create edge and delay futures, and spawn further tasks
#[derive(Clone)]
pub struct Handle {
    kernel: Rc<RefCell<Kernel>>,
    spawner: LocalSpawner,
}

impl Handle {
    /// current simulation time
    pub fn now(&self) -> Time {
        self.kernel.borrow().now
    }

    pub fn timebase(&self) -> Timebase {
        self.kernel.borrow().timebase
    }

    /// create a new signal resting at `initial`
    pub fn signal(&self, name: impl Into<String>, initial: bool) -> Signal {
        let mut kernel = self.kernel.borrow_mut();
        kernel.signals.push(SignalState {
            name: name.into(),
            value: initial,
            waiters: Vec::new(),
            loggers: Vec::new(),
        });
        Signal(kernel.signals.len() - 1)
    }

    pub fn name(&self, signal: Signal) -> String {
        self.kernel.borrow().signals[signal.0].name.clone()
    }

    pub fn read(&self, signal: Signal) -> bool {
        self.kernel.borrow().signals[signal.0].value
    }

    /// drive `signal` to `value`
    ///
    /// a write that does not change the value is not an edge
    pub fn write(&self, signal: Signal, value: bool) {
        let wakers = {
            let mut guard = self.kernel.borrow_mut();
            let kernel = &mut *guard;
            let now = kernel.now;
            let state = &mut kernel.signals[signal.0];
            if state.value == value {
                return;
            }
            state.value = value;
            log::trace!("{}: {} -> {}", now, state.name, value as u8);

            let event = Digital::new(value, now);
            state.loggers.retain(|tx| tx.send(event).is_ok());

            let (fired, pending): (Vec<Waiter>, Vec<Waiter>) = std::mem::take(&mut state.waiters)
                .into_iter()
                .partition(|waiter| waiter.edge.matches(value));
            state.waiters = pending;

            fired
                .into_iter()
                .map(|waiter| {
                    kernel.fired.insert(waiter.id);
                    waiter.waker
                })
                .collect::<Vec<_>>()
        };
        for waker in wakers {
            waker.wake();
        }
    }

    /// future resolving on the next `edge` of `signal`
    pub fn edge(&self, signal: Signal, edge: Edge) -> EdgeWait {
        let id = self.kernel.borrow_mut().id();
        EdgeWait {
            kernel: self.kernel.clone(),
            signal,
            edge,
            id,
        }
    }

    /// future resolving once `duration` steps have elapsed
    pub fn delay(&self, duration: Time) -> Delay {
        let mut kernel = self.kernel.borrow_mut();
        let deadline = kernel.now.saturating_add(duration);
        let id = kernel.id();
        Delay {
            kernel: self.kernel.clone(),
            deadline,
            id,
        }
    }

    /// create a logger receiving every subsequent transition of `signal`
    pub fn logger(&self, signal: Signal) -> SignalLogger {
        let (tx, rx) = mpsc::channel();
        self.kernel.borrow_mut().signals[signal.0].loggers.push(tx);
        SignalLogger::new_with(rx)
    }

    /// spawn a task on the kernel's executor
    pub fn spawn<F>(&self, future: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + 'static,
    {
        self.spawner.spawn_local(future)?;
        Ok(())
    }
}

impl LocalSpawn for Handle {
    fn spawn_local_obj(&self, future: LocalFutureObj<'static, ()>) -> Result<(), SpawnError> {
        self.spawner.spawn_local_obj(future)
    }

    fn status_local(&self) -> Result<(), SpawnError> {
        self.spawner.status_local()
    }
}

/// future returned by [`Handle::edge`]
pub struct EdgeWait {
    kernel: Rc<RefCell<Kernel>>,
    signal: Signal,
    edge: Edge,
    id: u64,
}

impl Future for EdgeWait {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut guard = self.kernel.borrow_mut();
        let kernel = &mut *guard;
        if kernel.fired.remove(&self.id) {
            return Poll::Ready(());
        }
        let waiters = &mut kernel.signals[self.signal.0].waiters;
        match waiters.iter_mut().find(|waiter| waiter.id == self.id) {
            Some(waiter) => {
                if !waiter.waker.will_wake(cx.waker()) {
                    waiter.waker = cx.waker().clone();
                }
            }
            None => waiters.push(Waiter {
                id: self.id,
                edge: self.edge,
                waker: cx.waker().clone(),
            }),
        }
        Poll::Pending
    }
}

impl Drop for EdgeWait {
    fn drop(&mut self) {
        if let Ok(mut kernel) = self.kernel.try_borrow_mut() {
            kernel.fired.remove(&self.id);
            kernel.signals[self.signal.0].waiters.retain(|waiter| waiter.id != self.id);
        }
    }
}

/// future returned by [`Handle::delay`]
pub struct Delay {
    kernel: Rc<RefCell<Kernel>>,
    deadline: Time,
    id: u64,
}

impl Delay {
    pub fn deadline(&self) -> Time {
        self.deadline
    }
}

impl Future for Delay {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut kernel = self.kernel.borrow_mut();
        let key = (self.deadline, self.id);
        if kernel.now >= self.deadline {
            kernel.timers.remove(&key);
            return Poll::Ready(());
        }
        match kernel.timers.get_mut(&key) {
            Some(waker) => {
                if !waker.will_wake(cx.waker()) {
                    *waker = cx.waker().clone();
                }
            }
            None => {
                kernel.timers.insert(key, cx.waker().clone());
            }
        }
        Poll::Pending
    }
}

impl Drop for Delay {
    fn drop(&mut self) {
        if let Ok(mut kernel) = self.kernel.try_borrow_mut() {
            kernel.timers.remove(&(self.deadline, self.id));
        }
    }
}

/// owns the executor and drives simulated time
pub struct Simulator {
    pool: LocalPool,
    handle: Handle,
    time_limit: Option<Time>,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    /// create a simulator with the default timebase
    pub fn new() -> Self {
        Self::new_with(Timebase::new())
    }

    pub fn new_with(timebase: Timebase) -> Self {
        let pool = LocalPool::new();
        let handle = Handle {
            kernel: Rc::new(RefCell::new(Kernel::new(timebase))),
            spawner: pool.spawner(),
        };
        Self {
            pool,
            handle,
            time_limit: None,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    pub fn now(&self) -> Time {
        self.handle.now()
    }

    /// stop [`Simulator::run_until_complete`] once simulation time reaches `limit`
    pub fn set_time_limit(&mut self, limit: Time) {
        self.time_limit = Some(limit);
    }

    pub fn spawn<F>(&self, future: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + 'static,
    {
        self.handle.spawn(future)
    }

    fn advance_to(&mut self, time: Time) {
        let wakers = self.handle.kernel.borrow_mut().advance_to(time);
        for waker in wakers {
            waker.wake();
        }
    }

    fn next_deadline(&self) -> Option<Time> {
        self.handle.kernel.borrow().next_deadline()
    }

    /// run every task for `duration` steps of simulated time
    pub fn run_for(&mut self, duration: Time) {
        let end = self.now().saturating_add(duration);
        loop {
            self.pool.run_until_stalled();
            match self.next_deadline() {
                Some(deadline) if deadline <= end => self.advance_to(deadline),
                _ => break,
            }
        }
        self.advance_to(end);
        self.pool.run_until_stalled();
    }

    /// run the simulation until `future` completes, returning its output
    ///
    /// errors if every task stalls with no pending delay left, or if the
    /// time limit is reached first
    pub fn run_until_complete<F>(&mut self, future: F) -> Result<F::Output, Error>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let slot = Rc::new(RefCell::new(None));
        let output = slot.clone();
        self.handle.spawn(async move {
            let value = future.await;
            *output.borrow_mut() = Some(value);
        })?;

        let limit = self.time_limit.unwrap_or(Time::MAX);
        loop {
            self.pool.run_until_stalled();
            if let Some(value) = slot.borrow_mut().take() {
                return Ok(value);
            }
            match self.next_deadline() {
                None => return Err(Error::Stalled(self.now())),
                Some(deadline) if deadline > limit => {
                    self.advance_to(limit);
                    return Err(Error::TimeLimit(limit));
                }
                Some(deadline) => self.advance_to(deadline),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_without_change_is_not_an_edge() {
        let sim = Simulator::new();
        let handle = sim.handle();
        let sig = handle.signal("sig", true);
        let mut logger = handle.logger(sig);

        handle.write(sig, true);
        handle.write(sig, false);
        handle.write(sig, false);
        logger.collect_pending();

        assert_eq!(logger.log(), &[Digital::Lo(0)]);
        assert!(!handle.read(sig));
        assert_eq!(handle.name(sig), "sig");
    }

    #[test]
    fn test_dropped_waiters_are_deregistered() {
        let sim = Simulator::new();
        let handle = sim.handle();
        let sig = handle.signal("sig", false);

        let wait = handle.edge(sig, Edge::Rising);
        let delay = handle.delay(5);
        drop(wait);
        drop(delay);

        assert!(handle.kernel.borrow().timers.is_empty());
        assert!(handle.kernel.borrow().signals[0].waiters.is_empty());
    }
}
