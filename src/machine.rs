use parking_lot::{Condvar, Mutex};

use crate::Options;

#[cfg(feature = "metric")]
use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};

#[cfg(feature = "metric")]
macro_rules! record {
    ($x: ident) => {
        G_STATE.$x.fetch_add(1, Relaxed)
    };
}

#[cfg(not(feature = "metric"))]
macro_rules! record {
    ($x: ident) => {};
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Refill,
    Take,
}

/// Hooks into the critical section of a [`Machine`].
///
/// Every hook is called while the machine lock is held, so implementations observe a consistent
/// count and never run concurrently with each other. `acquired` opens a critical section (after
/// locking and after every wake), `parking` and `released` close it.
pub trait Observer: Send + Sync {
    fn acquired(&self, _op: Op, _count: usize) {}

    fn parking(&self, _op: Op, _count: usize) {}

    fn released(&self, _op: Op, _before: usize, _after: usize) {}
}

impl Observer for () {}

/// A bounded counter shared by producers and consumers.
///
/// The count stays in `[0, capacity]`. [`Machine::refill`] blocks while the machine is full and
/// tops it off to `capacity`, [`Machine::take`] blocks while it is empty and removes one unit.
/// Both broadcast to every waiter of the opposite side, waiters always re-check their guard.
pub struct Machine<P: Observer = ()> {
    count: Mutex<usize>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
    observer: P,
}

impl Machine {
    pub fn new(opt: &Options) -> Self {
        Self::with_observer(opt, ())
    }
}

impl<P: Observer> Machine<P> {
    pub fn with_observer(opt: &Options, observer: P) -> Self {
        assert!(opt.capacity > 0);
        assert!(opt.initial <= opt.capacity);
        Self {
            count: Mutex::new(opt.initial),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity: opt.capacity,
            observer,
        }
    }

    pub fn refill(&self) {
        let mut count = self.count.lock();
        self.observer.acquired(Op::Refill, *count);

        while *count == self.capacity {
            log::info!("machine full, producer waiting");
            record!(full_wait);
            self.observer.parking(Op::Refill, *count);
            self.not_full.wait(&mut count);
            self.observer.acquired(Op::Refill, *count);
        }

        let before = *count;
        // top off, not increment
        *count = self.capacity;
        log::info!("machine refilled");
        record!(refill);

        self.observer.released(Op::Refill, before, *count);
        self.not_empty.notify_all();
    }

    /// remove one unit, return the count before removal
    pub fn take(&self) -> usize {
        let mut count = self.count.lock();
        self.observer.acquired(Op::Take, *count);

        while *count == 0 {
            log::info!("machine empty, consumer waiting");
            record!(empty_wait);
            self.observer.parking(Op::Take, *count);
            self.not_empty.wait(&mut count);
            self.observer.acquired(Op::Take, *count);
        }

        let before = *count;
        *count -= 1;
        log::info!("unit taken, previous count = {}", before);
        record!(take);

        self.observer.released(Op::Take, before, *count);
        self.not_full.notify_all();
        before
    }

    pub fn count(&self) -> usize {
        *self.count.lock()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn observer(&self) -> &P {
        &self.observer
    }
}

#[cfg(feature = "metric")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub refill: usize,
    pub take: usize,
    pub full_wait: usize,
    pub empty_wait: usize,
}

#[cfg(feature = "metric")]
struct MachineStatus {
    refill: AtomicUsize,
    take: AtomicUsize,
    full_wait: AtomicUsize,
    empty_wait: AtomicUsize,
}

#[cfg(feature = "metric")]
static G_STATE: MachineStatus = MachineStatus {
    refill: AtomicUsize::new(0),
    take: AtomicUsize::new(0),
    full_wait: AtomicUsize::new(0),
    empty_wait: AtomicUsize::new(0),
};

/// process-wide totals across every machine
#[cfg(feature = "metric")]
pub fn stats() -> Stats {
    Stats {
        refill: G_STATE.refill.load(Relaxed),
        take: G_STATE.take.load(Relaxed),
        full_wait: G_STATE.full_wait.load(Relaxed),
        empty_wait: G_STATE.empty_wait.load(Relaxed),
    }
}
