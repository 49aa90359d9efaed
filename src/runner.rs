use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::machine::{Machine, Observer};
use crate::utils::failpoint;
use crate::utils::options::{Options, Shutdown};
use crate::OpCode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// calls [`Machine::refill`]
    Producer,
    /// calls [`Machine::take`]
    Consumer,
}

impl Role {
    fn name(&self) -> &'static str {
        match self {
            Role::Producer => "producer",
            Role::Consumer => "consumer",
        }
    }

    pub fn apply<P: Observer>(&self, machine: &Machine<P>) {
        match self {
            Role::Producer => machine.refill(),
            Role::Consumer => {
                machine.take();
            }
        }
    }
}

/// What the runner saw when it returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Report {
    pub spawned: usize,
    pub finished: usize,
    /// still blocked or mid-iteration, left to die with the process
    pub abandoned: usize,
    /// machine count at return
    pub count: usize,
}

struct Worker {
    name: String,
    handle: JoinHandle<()>,
}

pub struct Runner<P: Observer = ()> {
    opt: Options,
    machine: Arc<Machine<P>>,
}

impl Runner {
    pub fn new(opt: Options) -> Result<Self, OpCode> {
        let opt = opt.validate()?;
        let machine = Arc::new(Machine::new(&opt));
        Ok(Self { opt, machine })
    }
}

impl<P: Observer + 'static> Runner<P> {
    /// run against a caller-built machine, `opt.capacity` and `opt.initial` are neither used
    /// nor checked
    pub fn with_machine(opt: Options, machine: Arc<Machine<P>>) -> Result<Self, OpCode> {
        opt.validate_run()?;
        Ok(Self { opt, machine })
    }

    pub fn machine(&self) -> Arc<Machine<P>> {
        self.machine.clone()
    }

    /// Spawn every worker, sleep for `run_time`, then apply the shutdown policy.
    ///
    /// A spawn failure returns [`OpCode::SpawnFailed`] at once, workers already started keep
    /// running.
    pub fn run(self) -> Result<Report, OpCode> {
        let mut workers = Vec::with_capacity(self.opt.workers());

        for id in 0..self.opt.consumers {
            workers.push(self.spawn(Role::Consumer, id)?);
        }
        for id in 0..self.opt.producers {
            workers.push(self.spawn(Role::Producer, id)?);
        }
        log::info!(
            "started {} consumers {} producers, run for {:?}",
            self.opt.consumers,
            self.opt.producers,
            self.opt.run_time
        );

        std::thread::sleep(self.opt.run_time);

        if let Shutdown::Join { timeout } = self.opt.shutdown {
            wait_workers(&workers, timeout);
        }

        let spawned = workers.len();
        let mut finished = 0;
        for w in workers {
            if !w.handle.is_finished() {
                log::warn!("abandon worker {}", w.name);
                continue;
            }
            finished += 1;
            if w.handle.join().is_err() {
                log::error!("worker {} panicked", w.name);
            }
        }

        #[cfg(feature = "metric")]
        log::info!("{:?}", crate::machine::stats());

        let report = Report {
            spawned,
            finished,
            abandoned: spawned - finished,
            count: self.machine.count(),
        };
        log::info!("{:?}", report);
        Ok(report)
    }

    fn spawn(&self, role: Role, id: usize) -> Result<Worker, OpCode> {
        let name = format!("{}-{}", role.name(), id);
        let machine = self.machine.clone();
        let runs = self.opt.max_runs;

        failpoint::check("spawn")
            .and_then(|_| {
                std::thread::Builder::new()
                    .name(name.clone())
                    .spawn(move || {
                        log::debug!("start {} worker", role.name());
                        for _ in 0..runs {
                            role.apply(&machine);
                        }
                        log::debug!("{} worker done after {} runs", role.name(), runs);
                    })
            })
            .map(|handle| Worker {
                name: name.clone(),
                handle,
            })
            .map_err(|e| {
                log::error!("can't spawn {}: {}", name, e);
                OpCode::SpawnFailed
            })
    }
}

fn wait_workers(workers: &[Worker], timeout: Duration) {
    const STEP: Duration = Duration::from_millis(1);
    let start = Instant::now();

    while start.elapsed() <= timeout {
        if workers.iter().all(|w| w.handle.is_finished()) {
            return;
        }
        std::thread::sleep(STEP);
    }
    log::warn!("workers still running after {:?}", timeout);
}
