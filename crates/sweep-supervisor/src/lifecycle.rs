//! Supervision run lifecycle.
//!
//! Drives a whole session: the poll/render tick, keyboard handling, and the
//! phase machine that decides how the run ends.
//!
//! ```text
//!            all exited 0                 q
//!  Running ────────────────→ Completing ────→ Done
//!     │ │                        │
//!     │ │ q / Ctrl+C             │ Ctrl+C
//!     │ └─────────→ Aborted ←────┘
//!     │ crash
//!     ↓
//!  Crashed
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use sweep_protocol::StatusRecord;

use crate::aggregate::AggregateSummary;
use crate::dashboard::{Console, DashboardView, InputAction};
use crate::error::Result;
use crate::fleet::{FleetVerdict, WorkerFleet};
use crate::partition::SearchRange;
use crate::status::read_status;

/// Poll/render period while workers are running.
pub const TICK: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Session phase (lightweight; the worker handles live in the controller).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Workers running, dashboard refreshing on every tick
    Running,

    /// Every worker exited cleanly; final frame drawn, waiting for quit
    Completing,

    /// User confirmed completion
    Done,

    /// A worker died; its stderr is retained for the report
    Crashed { worker: usize, stderr: String },

    /// User quit before the sweep finished
    Aborted,
}

impl Phase {
    /// Check whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &Phase) -> bool {
        matches!(
            (self, target),
            (Phase::Running, Phase::Completing)
                | (Phase::Running, Phase::Crashed { .. })
                | (Phase::Running, Phase::Aborted)
                | (Phase::Completing, Phase::Done)
                | (Phase::Completing, Phase::Aborted)
        )
    }

    /// Attempt to transition to `target`. Returns `Err` if invalid.
    pub fn transition(&mut self, target: Phase) -> Result<(), PhaseTransitionError> {
        if !self.can_transition_to(&target) {
            return Err(PhaseTransitionError {
                from: self.clone(),
                to: target,
            });
        }
        *self = target;
        Ok(())
    }

    /// Whether the run is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Crashed { .. } | Phase::Aborted)
    }

    /// Human-readable label (for logging).
    pub fn label(&self) -> &str {
        match self {
            Phase::Running => "Running",
            Phase::Completing => "Completing",
            Phase::Done => "Done",
            Phase::Crashed { .. } => "Crashed",
            Phase::Aborted => "Aborted",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Crashed { worker, .. } => write!(f, "Crashed(worker {})", worker),
            other => write!(f, "{}", other.label()),
        }
    }
}

// ---------------------------------------------------------------------------
// PhaseTransitionError
// ---------------------------------------------------------------------------

/// Error returned when an invalid phase transition is attempted.
#[derive(Debug, Clone)]
pub struct PhaseTransitionError {
    pub from: Phase,
    pub to: Phase,
}

impl fmt::Display for PhaseTransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid phase transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for PhaseTransitionError {}

// ---------------------------------------------------------------------------
// RunOutcome
// ---------------------------------------------------------------------------

/// How a run ended. The `Display` form is the line printed to stdout once
/// the terminal is restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Crashed { worker: usize, stderr: String },
    Aborted,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "Done"),
            RunOutcome::Crashed { worker, stderr } => {
                write!(f, "Worker {} crashed:\n{}", worker, stderr)
            }
            RunOutcome::Aborted => write!(f, "User abort"),
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Owns the fleet and the console for the duration of a run.
pub struct Controller<C: Console> {
    fleet: WorkerFleet,
    session: C,
    range: SearchRange,
    status_dir: PathBuf,
    phase: Phase,
    records: Vec<Option<StatusRecord>>,
    summary: Option<AggregateSummary>,
    started: Instant,
}

impl<C: Console> Controller<C> {
    pub fn new(fleet: WorkerFleet, session: C, range: SearchRange, status_dir: PathBuf) -> Self {
        let records = vec![None; fleet.len()];
        Self {
            fleet,
            session,
            range,
            status_dir,
            phase: Phase::Running,
            records,
            summary: None,
            started: Instant::now(),
        }
    }

    /// Drive the session to its outcome, then tear the fleet down.
    pub fn run(&mut self) -> Result<RunOutcome> {
        let outcome = self.drive();
        self.fleet.kill_all();
        outcome
    }

    fn drive(&mut self) -> Result<RunOutcome> {
        loop {
            self.refresh(false)?;

            // The tick doubles as the input timeout
            match self.session.poll_input(TICK)? {
                InputAction::Quit | InputAction::Interrupt => {
                    self.phase.transition(Phase::Aborted)?;
                    return Ok(RunOutcome::Aborted);
                }
                InputAction::None => {}
            }

            match self.fleet.verdict() {
                FleetVerdict::Crashed { worker } => {
                    error!("worker {} crashed", worker);
                    let stderr = self.fleet.take_stderr(worker);
                    self.phase.transition(Phase::Crashed {
                        worker,
                        stderr: stderr.clone(),
                    })?;
                    return Ok(RunOutcome::Crashed { worker, stderr });
                }
                FleetVerdict::AllSucceeded => {
                    info!("all workers finished");
                    self.phase.transition(Phase::Completing)?;
                    // One last read so the final counters are on screen
                    self.refresh(true)?;
                    loop {
                        match self.session.wait_input()? {
                            InputAction::Quit => {
                                self.phase.transition(Phase::Done)?;
                                return Ok(RunOutcome::Completed);
                            }
                            InputAction::Interrupt => {
                                self.phase.transition(Phase::Aborted)?;
                                return Ok(RunOutcome::Aborted);
                            }
                            InputAction::None => {}
                        }
                    }
                }
                FleetVerdict::StillRunning => {}
            }
        }
    }

    /// Read fresh statuses, recompute the summary once the table is full,
    /// and draw a frame.
    fn refresh(&mut self, done: bool) -> Result<()> {
        self.read_statuses();
        if !self.records.is_empty() && self.records.iter().all(Option::is_some) {
            self.summary = Some(AggregateSummary::compute(
                self.records.iter().flatten(),
                self.range,
                self.started,
                Instant::now(),
            ));
        }
        let view = DashboardView {
            records: &self.records,
            summary: self.summary.as_ref(),
            done,
        };
        self.session.draw(&view)?;
        Ok(())
    }

    /// Refresh the last-known record table. A file that cannot be read or
    /// parsed keeps the previous record; counters that went backwards are
    /// discarded as a torn read.
    fn read_statuses(&mut self) {
        for id in 0..self.records.len() {
            if let Some(fresh) = read_status(&self.status_dir, id) {
                if let Some(previous) = &self.records[id] {
                    if fresh.counters_regressed(previous) {
                        warn!("worker {} counters went backwards, keeping previous read", id);
                        continue;
                    }
                }
                self.records[id] = Some(fresh);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
