use std::path::PathBuf;

pub use anyhow::Result;
use thiserror::Error;

/// Supervisor-side failures.
///
/// Transient per-worker conditions (an unreadable status file, a crashing
/// worker) are not errors at this level; they are lifecycle states. This
/// covers the things that stop a run from being set up at all.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("invalid search range: start {start:#010x} exceeds end {end:#010x}")]
    InvalidRange { start: u32, end: u32 },

    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("{workers} workers cannot share {instructions} instructions; reduce the worker count")]
    TooManyWorkers { workers: usize, instructions: u64 },

    #[error("worker binary {path:?} was not found; it likely needs to be compiled with \"make\" first")]
    WorkerBinaryMissing { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
