use std::str::FromStr;

pub(crate) mod failpoint;
pub(crate) mod options;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum OpCode {
    /// options rejected before any worker was started
    Invalid,
    /// the OS refused to create a worker thread
    SpawnFailed,
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{:?}", self))
    }
}

impl std::error::Error for OpCode {}

/// read `name` from the environment, unset or unparsable values yield `None`
pub(crate) fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}
