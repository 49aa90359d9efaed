//! A bounded counter (a coke machine) shared by producer and consumer threads, guarded by one
//! lock and two condition variables, plus the runner that drives a fixed population of workers.

#[cfg(feature = "metric")]
pub use machine::{stats, Stats};
pub use machine::{Machine, Observer, Op};
pub use runner::{Report, Role, Runner};
pub use utils::{
    options::{Options, Shutdown},
    OpCode,
};

mod machine;
mod runner;
mod utils;
