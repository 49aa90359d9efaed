#![allow(dead_code)]

use coke::{Machine, Observer, Op, Options};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

pub fn wait_until<F>(timeout: Duration, step: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    while start.elapsed() <= timeout {
        if predicate() {
            return true;
        }
        std::thread::sleep(step);
    }
    false
}

pub fn options(capacity: usize, initial: usize) -> Options {
    let mut opt = Options::new();
    opt.capacity = capacity;
    opt.initial = initial;
    opt
}

/// Records every critical section of a machine.
///
/// Since hooks run under the machine lock, `open` never holds more than one section and
/// `inside` above 1 means two threads were in at the same time.
pub struct Recorder {
    capacity: usize,
    inside: AtomicUsize,
    overlaps: AtomicUsize,
    out_of_bounds: AtomicUsize,
    short_refills: AtomicUsize,
    open: Mutex<Option<Instant>>,
    spans: Mutex<Vec<(Instant, Instant)>>,
    parked: Mutex<HashMap<Op, usize>>,
    done: Mutex<HashMap<Op, usize>>,
}

impl Recorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inside: AtomicUsize::new(0),
            overlaps: AtomicUsize::new(0),
            out_of_bounds: AtomicUsize::new(0),
            short_refills: AtomicUsize::new(0),
            open: Mutex::new(None),
            spans: Mutex::new(Vec::new()),
            parked: Mutex::new(HashMap::new()),
            done: Mutex::new(HashMap::new()),
        }
    }

    fn check(&self, count: usize) {
        if count > self.capacity {
            self.out_of_bounds.fetch_add(1, SeqCst);
        }
    }

    fn close(&self) {
        if let Some(start) = self.open.lock().unwrap().take() {
            self.spans.lock().unwrap().push((start, Instant::now()));
        }
        self.inside.fetch_sub(1, SeqCst);
    }

    pub fn parked(&self, op: Op) -> usize {
        self.parked.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    pub fn done(&self, op: Op) -> usize {
        self.done.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    pub fn overlaps(&self) -> usize {
        self.overlaps.load(SeqCst)
    }

    pub fn out_of_bounds(&self) -> usize {
        self.out_of_bounds.load(SeqCst)
    }

    /// refills that left the machine anywhere but exactly full
    pub fn short_refills(&self) -> usize {
        self.short_refills.load(SeqCst)
    }

    /// number of span pairs where the later one starts before the earlier one ends
    pub fn overlapping_spans(&self) -> usize {
        let mut spans = self.spans.lock().unwrap().clone();
        spans.sort_by_key(|x| x.0);
        spans.windows(2).filter(|w| w[1].0 < w[0].1).count()
    }

    pub fn spans(&self) -> usize {
        self.spans.lock().unwrap().len()
    }
}

impl Observer for Recorder {
    fn acquired(&self, _op: Op, count: usize) {
        if self.inside.fetch_add(1, SeqCst) != 0 {
            self.overlaps.fetch_add(1, SeqCst);
        }
        self.check(count);
        *self.open.lock().unwrap() = Some(Instant::now());
    }

    fn parking(&self, op: Op, count: usize) {
        self.check(count);
        *self.parked.lock().unwrap().entry(op).or_insert(0) += 1;
        self.close();
    }

    fn released(&self, op: Op, before: usize, after: usize) {
        self.check(before);
        self.check(after);
        if op == Op::Refill && after != self.capacity {
            self.short_refills.fetch_add(1, SeqCst);
        }
        *self.done.lock().unwrap().entry(op).or_insert(0) += 1;
        self.close();
    }
}

/// Hammer `machine` with `consumers` threads taking `takes` units each while `producers` threads
/// refill until every consumer is done, then drain so blocked producers can leave.
///
/// Returns the number of units taken by the drain.
pub fn stress<P: Observer + 'static>(
    machine: Arc<Machine<P>>,
    consumers: usize,
    producers: usize,
    takes: usize,
) -> usize {
    assert!(producers > 0);
    let quit = Arc::new(AtomicBool::new(false));
    let barrier = Arc::new(Barrier::new(consumers + producers));

    let prod: Vec<_> = (0..producers)
        .map(|_| {
            let m = machine.clone();
            let q = quit.clone();
            let b = barrier.clone();
            thread::spawn(move || {
                b.wait();
                while !q.load(SeqCst) {
                    m.refill();
                }
            })
        })
        .collect();

    let cons: Vec<_> = (0..consumers)
        .map(|_| {
            let m = machine.clone();
            let b = barrier.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                b.wait();
                for _ in 0..takes {
                    let before = m.take();
                    assert!(before >= 1 && before <= m.capacity());
                    if rng.gen_ratio(1, 8) {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    for c in cons {
        c.join().expect("consumer panicked");
    }
    quit.store(true, SeqCst);

    // producers only ever raise the count, so a positive count can't block this thread
    let mut drained = 0;
    let all_left = wait_until(TIMEOUT, Duration::from_micros(50), || {
        if prod.iter().all(|p| p.is_finished()) {
            return true;
        }
        if machine.count() > 0 {
            machine.take();
            drained += 1;
        }
        false
    });
    assert!(all_left, "producers stuck");

    for p in prod {
        p.join().expect("producer panicked");
    }
    drained
}
