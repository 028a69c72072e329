//! notification events
//!
//! an `Event` is a flag tasks can wait on. `wait` resolves while the flag is
//! set; `notified` only resolves on a `set` issued after it was created, so a
//! task can check a condition and then park without missing an update

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

#[derive(Default)]
struct EventState {
    set: bool,
    generation: u64,
    waiters: Vec<Waker>,
}

#[derive(Clone, Default)]
pub struct Event {
    inner: Rc<RefCell<EventState>>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// set the flag and wake every waiting task
    pub fn set(&self) {
        let waiters = {
            let mut state = self.inner.borrow_mut();
            state.set = true;
            state.generation = state.generation.wrapping_add(1);
            std::mem::take(&mut state.waiters)
        };
        for waker in waiters {
            waker.wake();
        }
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().set = false;
    }

    pub fn is_set(&self) -> bool {
        self.inner.borrow().set
    }

    /// resolves immediately if set, otherwise on the next `set`
    pub fn wait(&self) -> EventWait {
        self.waiter(true)
    }

    /// resolves on the next `set`, whatever the current state
    pub fn notified(&self) -> EventWait {
        self.waiter(false)
    }

    fn waiter(&self, level: bool) -> EventWait {
        EventWait {
            event: self.clone(),
            generation: self.inner.borrow().generation,
            level,
        }
    }
}

pub struct EventWait {
    event: Event,
    generation: u64,
    level: bool,
}

impl Future for EventWait {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.event.inner.borrow_mut();
        if (self.level && state.set) || state.generation != self.generation {
            return Poll::Ready(());
        }
        if !state.waiters.iter().any(|waker| waker.will_wake(cx.waker())) {
            state.waiters.push(cx.waker().clone());
        }
        Poll::Pending
    }
}
