//! Locked reads of per-worker status files.
//!
//! Workers rewrite `data/status<id>` continuously and hold an exclusive
//! advisory lock (flock) while writing. Reading under the same lock means a
//! record is never observed mid-write; everything else that can go wrong is
//! reported as "no record" and the caller keeps its previous one.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use sweep_protocol::StatusRecord;
use tracing::debug;

/// Directory the workers drop their status files in, relative to the
/// working directory. Fixed on the worker side, so not configurable here.
pub const DEFAULT_STATUS_DIR: &str = "data";

/// Path of worker `id`'s status file under `dir`.
pub fn status_file_path(dir: &Path, id: usize) -> PathBuf {
    dir.join(format!("status{id}"))
}

/// Read worker `id`'s current status record.
///
/// `None` covers every recoverable condition: the file does not exist yet
/// (startup race), cannot be locked or read, or holds a malformed or
/// half-written record.
pub fn read_status(dir: &Path, id: usize) -> Option<StatusRecord> {
    let path = status_file_path(dir, id);
    let mut file = match File::open(&path) {
        Ok(file) => file,
        Err(_) => return None,
    };

    if let Err(err) = file.lock_exclusive() {
        debug!("worker {} status lock failed: {}", id, err);
        return None;
    }
    let mut text = String::new();
    let read = file.read_to_string(&mut text);
    let _ = file.unlock();

    if let Err(err) = read {
        debug!("worker {} status read failed: {}", id, err);
        return None;
    }
    match StatusRecord::parse(&text) {
        Ok(record) => Some(record),
        Err(err) => {
            debug!("worker {} status unreadable: {}", id, err);
            None
        }
    }
}
