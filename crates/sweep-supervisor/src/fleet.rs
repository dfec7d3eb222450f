//! Worker process supervision.
//!
//! One OS process per assignment. Both output streams are drained on
//! background reader threads so a worker can never block on a full pipe;
//! stderr is retained so a crash can be reported verbatim. Handles kill
//! their process when dropped, so no exit path leaks a worker.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::config::FuzzerOptions;
use crate::error::SupervisorError;
use crate::partition::WorkerAssignment;

/// Exit code a worker uses to report an internal failure. Anything else
/// nonzero is treated as neither success nor crash.
pub const WORKER_CRASH_CODE: i32 = 1;

/// Result of polling one worker's process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    Running,
    ExitedOk,
    ExitedError(i32),
    /// Killed by a signal before it could report an exit code.
    Signaled,
    /// No worker with that id.
    NotFound,
}

/// What the fleet as a whole is doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetVerdict {
    StillRunning,
    AllSucceeded,
    /// A worker crashed (crash exit code or killed by a signal).
    Crashed { worker: usize },
}

// ---------------------------------------------------------------------------
// WorkerHandle
// ---------------------------------------------------------------------------

/// One supervised worker process.
pub struct WorkerHandle {
    id: usize,
    process: Child,
    stderr_text: Arc<Mutex<String>>,
    stdout_handle: Option<JoinHandle<()>>,
    stderr_handle: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawn `bin` with `args`, stdin closed and both output streams piped
    /// to reader threads. A missing binary is the distinguished startup
    /// error; everything else surfaces as plain IO.
    pub fn spawn(id: usize, bin: &Path, args: &[String]) -> Result<Self, SupervisorError> {
        let mut child = Command::new(bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => SupervisorError::WorkerBinaryMissing {
                    path: bin.to_path_buf(),
                },
                _ => SupervisorError::Io(err),
            })?;
        debug!("worker {} started, pid {}", id, child.id());

        let stdout_handle = child.stdout.take().map(|stdout| {
            let reader = BufReader::new(stdout);
            std::thread::spawn(move || {
                for line in reader.lines() {
                    if let Ok(line) = line {
                        debug!("[worker {}] {}", id, line);
                    }
                }
            })
        });

        let stderr_text = Arc::new(Mutex::new(String::new()));
        let stderr_handle = child.stderr.take().map(|stderr| {
            let reader = BufReader::new(stderr);
            let buffer = Arc::clone(&stderr_text);
            std::thread::spawn(move || {
                for line in reader.lines() {
                    if let Ok(line) = line {
                        debug!("[worker {} stderr] {}", id, line);
                        if let Ok(mut text) = buffer.lock() {
                            text.push_str(&line);
                            text.push('\n');
                        }
                    }
                }
            })
        });

        Ok(Self {
            id,
            process: child,
            stderr_text,
            stdout_handle,
            stderr_handle,
        })
    }

    /// Check the process's exit state without blocking.
    pub fn poll(&mut self) -> WorkerExit {
        match self.process.try_wait() {
            Ok(None) => WorkerExit::Running,
            Ok(Some(status)) => match status.code() {
                Some(0) => WorkerExit::ExitedOk,
                Some(code) => WorkerExit::ExitedError(code),
                None => WorkerExit::Signaled,
            },
            Err(err) => {
                warn!("worker {} poll failed: {}", self.id, err);
                WorkerExit::Running
            }
        }
    }

    /// Best-effort termination: kill if still alive, then reap. Safe to
    /// call repeatedly and after exit.
    ///
    /// The reader threads are detached, not joined: anything the worker
    /// forked inherits the pipe write ends, so EOF can lag the worker's
    /// own death arbitrarily. The threads finish on their own once the
    /// last writer is gone.
    pub fn kill(&mut self) {
        if matches!(self.process.try_wait(), Ok(None)) {
            if let Err(err) = self.process.kill() {
                debug!("worker {} kill failed: {}", self.id, err);
            }
            let _ = self.process.wait();
        }
        drop(self.stdout_handle.take());
        drop(self.stderr_handle.take());
    }

    /// Everything the worker wrote to stderr. Joins the reader thread
    /// first so nothing buffered is missed; only call once the process
    /// has exited.
    pub fn take_stderr(&mut self) -> String {
        if let Some(handle) = self.stderr_handle.take() {
            let _ = handle.join();
        }
        self.stderr_text
            .lock()
            .map(|text| text.clone())
            .unwrap_or_default()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.kill();
    }
}

// ---------------------------------------------------------------------------
// WorkerFleet
// ---------------------------------------------------------------------------

/// The full set of supervised workers, killed as a unit.
pub struct WorkerFleet {
    pub(crate) workers: Vec<WorkerHandle>,
}

impl WorkerFleet {
    /// Launch one worker per assignment.
    ///
    /// Fails fast on the first spawn error; whatever was already launched
    /// is torn down when the partial fleet drops.
    pub fn spawn(
        assignments: &[WorkerAssignment],
        options: &FuzzerOptions,
        worker_bin: &Path,
    ) -> Result<Self, SupervisorError> {
        let mut workers = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let args = options.build_worker_args(assignment);
            workers.push(WorkerHandle::spawn(assignment.id, worker_bin, &args)?);
            info!("worker {} covers {}", assignment.id, assignment.range);
        }
        Ok(Self { workers })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Poll one worker's exit state.
    pub fn poll(&mut self, id: usize) -> WorkerExit {
        match self.workers.get_mut(id) {
            Some(worker) => worker.poll(),
            None => WorkerExit::NotFound,
        }
    }

    /// Full stderr text of worker `id`, empty for an unknown id.
    pub fn take_stderr(&mut self, id: usize) -> String {
        self.workers
            .get_mut(id)
            .map(WorkerHandle::take_stderr)
            .unwrap_or_default()
    }

    /// Sweep every worker's exit state.
    ///
    /// A crash anywhere wins over everything else; otherwise the fleet has
    /// succeeded only once every worker reported the success code.
    pub fn verdict(&mut self) -> FleetVerdict {
        let mut all_succeeded = true;
        for worker in &mut self.workers {
            match worker.poll() {
                WorkerExit::ExitedError(WORKER_CRASH_CODE) | WorkerExit::Signaled => {
                    return FleetVerdict::Crashed { worker: worker.id };
                }
                WorkerExit::ExitedOk => {}
                WorkerExit::Running | WorkerExit::ExitedError(_) | WorkerExit::NotFound => {
                    all_succeeded = false;
                }
            }
        }
        if all_succeeded && !self.workers.is_empty() {
            FleetVerdict::AllSucceeded
        } else {
            FleetVerdict::StillRunning
        }
    }

    /// Kill every worker still alive. Idempotent; also runs on drop.
    pub fn kill_all(&mut self) {
        for worker in &mut self.workers {
            worker.kill();
        }
    }
}

impl Drop for WorkerFleet {
    fn drop(&mut self) {
        self.kill_all();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    use super::*;

    fn sh(id: usize, script: &str) -> WorkerHandle {
        let args = vec!["-c".to_string(), script.to_string()];
        WorkerHandle::spawn(id, Path::new("/bin/sh"), &args).unwrap()
    }

    /// Poll until the worker reports a non-Running state, within a bound.
    fn wait_for_exit(worker: &mut WorkerHandle) -> WorkerExit {
        for _ in 0..500 {
            let state = worker.poll();
            if state != WorkerExit::Running {
                return state;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("worker never exited");
    }

    /// Poll until the fleet settles on a verdict, within a bound.
    fn wait_for_verdict(fleet: &mut WorkerFleet) -> FleetVerdict {
        for _ in 0..500 {
            match fleet.verdict() {
                FleetVerdict::StillRunning => std::thread::sleep(Duration::from_millis(10)),
                other => return other,
            }
        }
        panic!("fleet never settled");
    }

    #[test]
    fn test_clean_exit_polls_ok() {
        let mut worker = sh(0, "exit 0");
        assert_eq!(wait_for_exit(&mut worker), WorkerExit::ExitedOk);
        // Exit state is stable across repeated polls
        assert_eq!(worker.poll(), WorkerExit::ExitedOk);
    }

    #[test]
    fn test_crash_exit_code_and_stderr_are_captured() {
        let mut worker = sh(0, "echo boom >&2; exit 1");
        assert_eq!(wait_for_exit(&mut worker), WorkerExit::ExitedError(1));
        assert_eq!(worker.take_stderr(), "boom\n");
    }

    #[test]
    fn test_kill_is_idempotent_and_reports_signal() {
        let mut worker = sh(0, "sleep 30");
        assert_eq!(worker.poll(), WorkerExit::Running);

        worker.kill();
        assert_eq!(worker.poll(), WorkerExit::Signaled);
        worker.kill();
        assert_eq!(worker.poll(), WorkerExit::Signaled);
    }

    #[test]
    fn test_kill_does_not_wait_for_descendants() {
        // The backgrounded child inherits the pipe write ends and keeps
        // them open long after the worker itself is dead
        let mut worker = sh(0, "sleep 15 & wait");
        assert_eq!(worker.poll(), WorkerExit::Running);

        let begin = Instant::now();
        worker.kill();
        assert!(
            begin.elapsed() < Duration::from_secs(5),
            "kill() blocked on the worker's descendants"
        );
        assert_eq!(worker.poll(), WorkerExit::Signaled);
    }

    #[test]
    fn test_missing_binary_is_distinguished() {
        let result = WorkerHandle::spawn(0, Path::new("./no-such-fuzzer-binary"), &[]);
        assert!(matches!(
            result,
            Err(SupervisorError::WorkerBinaryMissing { path }) if path == PathBuf::from("./no-such-fuzzer-binary")
        ));
    }

    #[test]
    fn test_fleet_poll_unknown_id() {
        let mut fleet = WorkerFleet { workers: vec![] };
        assert_eq!(fleet.poll(7), WorkerExit::NotFound);
        assert_eq!(fleet.take_stderr(7), "");
    }

    #[test]
    fn test_fleet_verdict_crash_wins() {
        let mut fleet = WorkerFleet {
            workers: vec![sh(0, "sleep 30"), sh(1, "echo dead >&2; exit 1")],
        };
        assert_eq!(
            wait_for_verdict(&mut fleet),
            FleetVerdict::Crashed { worker: 1 }
        );
        assert_eq!(fleet.take_stderr(1), "dead\n");
        fleet.kill_all();
    }

    #[test]
    fn test_fleet_verdict_all_succeeded() {
        let mut fleet = WorkerFleet {
            workers: vec![sh(0, "exit 0"), sh(1, "exit 0")],
        };
        assert_eq!(wait_for_verdict(&mut fleet), FleetVerdict::AllSucceeded);
    }

    #[test]
    fn test_fleet_kill_all_idempotent() {
        let mut fleet = WorkerFleet {
            workers: vec![sh(0, "sleep 30"), sh(1, "sleep 30")],
        };
        fleet.kill_all();
        fleet.kill_all();
        assert_eq!(fleet.poll(0), WorkerExit::Signaled);
        assert_eq!(fleet.poll(1), WorkerExit::Signaled);
    }

    #[test]
    fn test_generic_failure_is_not_a_crash() {
        let mut fleet = WorkerFleet {
            workers: vec![sh(0, "exit 3")],
        };
        assert_eq!(
            wait_for_exit(&mut fleet.workers[0]),
            WorkerExit::ExitedError(3)
        );
        // Exit code 3 is neither success nor the crash code
        assert_eq!(fleet.verdict(), FleetVerdict::StillRunning);
    }
}
