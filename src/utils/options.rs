use std::time::Duration;

use super::env_parse;
use crate::OpCode;

/// what the runner does with its workers once the run time is over
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shutdown {
    /// return immediately, workers still blocked or mid-iteration are left behind and die with
    /// the process
    Abandon,
    /// wait at most `timeout` for workers to finish, then abandon the rest
    Join { timeout: Duration },
}

#[derive(Clone, Debug)]
pub struct Options {
    /// how many units the machine holds when full, must be >= 1
    pub capacity: usize,
    /// units available at startup, range in [0, capacity]
    pub initial: usize,
    /// how many times each worker calls its operation
    pub max_runs: usize,
    /// number of workers calling `refill`
    pub producers: usize,
    /// number of workers calling `take`
    pub consumers: usize,
    /// how long the runner sleeps after spawning before it returns
    pub run_time: Duration,
    /// see [`Shutdown`], the default is [`Shutdown::Abandon`]
    pub shutdown: Shutdown,
}

impl Options {
    pub const CAPACITY: usize = 10;
    pub const INITIAL_COUNT: usize = 5;
    pub const MAX_RUNS: usize = 10;
    pub const NUMBER_PRODUCERS: usize = 2;
    pub const NUMBER_CONSUMERS: usize = 20;
    pub const RUN_TIME: Duration = Duration::from_secs(5);

    pub const ENV_CAPACITY: &'static str = "COKE_CAPACITY";
    pub const ENV_INITIAL: &'static str = "COKE_INITIAL";
    pub const ENV_MAX_RUNS: &'static str = "COKE_MAX_RUNS";
    pub const ENV_PRODUCERS: &'static str = "COKE_PRODUCERS";
    pub const ENV_CONSUMERS: &'static str = "COKE_CONSUMERS";
    pub const ENV_RUN_TIME: &'static str = "COKE_RUN_TIME_MS";
    pub const ENV_JOIN_TIMEOUT: &'static str = "COKE_JOIN_TIMEOUT_MS";

    pub fn new() -> Self {
        Self {
            capacity: Self::CAPACITY,
            initial: Self::INITIAL_COUNT,
            max_runs: Self::MAX_RUNS,
            producers: Self::NUMBER_PRODUCERS,
            consumers: Self::NUMBER_CONSUMERS,
            run_time: Self::RUN_TIME,
            shutdown: Shutdown::Abandon,
        }
    }

    /// defaults overridden by `COKE_*` environment variables, garbage values keep the default
    pub fn from_env() -> Self {
        let mut opt = Self::new();
        if let Some(x) = env_parse(Self::ENV_CAPACITY) {
            opt.capacity = x;
        }
        if let Some(x) = env_parse(Self::ENV_INITIAL) {
            opt.initial = x;
        }
        if let Some(x) = env_parse(Self::ENV_MAX_RUNS) {
            opt.max_runs = x;
        }
        if let Some(x) = env_parse(Self::ENV_PRODUCERS) {
            opt.producers = x;
        }
        if let Some(x) = env_parse(Self::ENV_CONSUMERS) {
            opt.consumers = x;
        }
        if let Some(ms) = env_parse(Self::ENV_RUN_TIME) {
            opt.run_time = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse(Self::ENV_JOIN_TIMEOUT) {
            opt.shutdown = Shutdown::Join {
                timeout: Duration::from_millis(ms),
            };
        }
        opt
    }

    pub fn validate(self) -> Result<Self, OpCode> {
        self.validate_counts()?;
        self.validate_run()?;
        Ok(self)
    }

    /// checks `capacity` and `initial`, which only matter when the options build a machine
    pub(crate) fn validate_counts(&self) -> Result<(), OpCode> {
        if self.capacity == 0 {
            log::error!("capacity must be at least 1");
            return Err(OpCode::Invalid);
        }
        if self.initial > self.capacity {
            log::error!(
                "initial count {} exceeds capacity {}",
                self.initial,
                self.capacity
            );
            return Err(OpCode::Invalid);
        }
        Ok(())
    }

    /// checks the fields the runner itself consumes
    pub(crate) fn validate_run(&self) -> Result<(), OpCode> {
        if let Shutdown::Join { timeout } = self.shutdown {
            if timeout.is_zero() {
                log::error!("join timeout must be non-zero");
                return Err(OpCode::Invalid);
            }
        }
        Ok(())
    }

    pub fn workers(&self) -> usize {
        self.producers + self.consumers
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}
