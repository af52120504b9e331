//! Process-execution ports consumed by the job supervisor.
//!
//! The fetch workers are external binaries; platform quirks (suffix-qualified
//! executable names, process sweeping) live in the adapter crate behind
//! these traits.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::Result;

/// A concrete worker invocation. The program path arrives resolved from
/// configuration; the core never computes platform suffixes.
#[derive(Clone, Debug)]
pub struct JobSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

/// Handle to a spawned worker process: incremental stdout, exit polling and
/// a kill switch.
#[async_trait]
pub trait ProcessHandle: Send + std::fmt::Debug {
    /// Next stdout line; `None` once the stream is closed.
    async fn read_line(&mut self) -> Result<Option<String>>;

    /// Exit code if the process has exited, without blocking.
    fn poll(&mut self) -> Result<Option<i32>>;

    async fn kill(&mut self) -> Result<()>;

    /// Captured stderr so far (bounded tail), for failure reporting.
    async fn stderr_tail(&self) -> String;
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Spawn a worker. Launch failures surface as `Error::Spawn` and are
    /// reported immediately; there is no retry.
    async fn spawn(&self, spec: &JobSpec) -> Result<Box<dyn ProcessHandle>>;

    /// Kill sibling helper processes sharing the worker's executable name.
    async fn kill_by_name(&self, name: &str) -> Result<()>;
}
