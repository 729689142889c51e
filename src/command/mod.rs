/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Command contracts — the lifecycle trait, the state machine vocabulary, and
//! the opaque resource identity used for conflict arbitration.
//!
//! A [`Command`] is one unit of schedulable control logic.  The engine owns a
//! command exclusively for the duration of one run and promises:
//!
//! * `initialize` is called exactly once, before the first `execute`;
//! * `end` is called exactly once per run, whether the run finished
//!   naturally, timed out, or was interrupted.
//!
//! Interruption can arrive before `initialize` ever ran (resource conflict at
//! submission time, cancellation).  `end` is still called in that case, so
//! implementations must tolerate an un-initialized command — that is a
//! documented contract the engine cannot enforce.

pub mod group;

use std::sync::Arc;
use std::time::Duration;

// ── Command lifecycle contract ────────────────────────────────────────────────

/// One unit of schedulable control logic.
pub trait Command: Send {
    /// Name used in logs and listener notifications.
    fn name(&self) -> &str {
        "command"
    }

    /// Called once, on the run's first step.
    fn initialize(&mut self) {}

    /// Called every step after `initialize`.  Returning `true` signals
    /// natural completion.
    fn execute(&mut self) -> bool;

    /// Called exactly once when the run terminates, for any reason.  Must
    /// tolerate being called before `initialize` (interrupted pre-start run).
    fn end(&mut self) {}

    /// Maximum run time.  [`Duration::ZERO`] (the default) disables the
    /// timeout check entirely.
    fn timeout(&self) -> Duration {
        Duration::ZERO
    }

    /// Resources this command needs exclusive use of while running.
    fn requirements(&self) -> Vec<RequirementId> {
        Vec::new()
    }
}

// ── Command state ─────────────────────────────────────────────────────────────

/// Lifecycle state of one command run.
///
/// ```text
/// Uninitialized ──► Running ──► Finished ──► Finalized
///       │              │            │
///       └──────────────┴────────────┴──────► Interrupted
/// ```
///
/// `Finalized` and `Interrupted` (after `end` has run) are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Created but not yet stepped; `initialize` has not run.
    Uninitialized,
    /// `initialize` has run; `execute` fires every step.
    Running,
    /// `execute` returned true or the timeout elapsed; `end` pending.
    Finished,
    /// `end` has run after natural completion.  Terminal.
    Finalized,
    /// The run was cancelled, pre-empted, or faulted; `end` has run.
    /// Terminal.
    Interrupted,
}

impl CommandState {
    /// Whether a run in this state performs no further work.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandState::Finalized | CommandState::Interrupted)
    }
}

// ── Requirable resources ──────────────────────────────────────────────────────

/// Marker capability for an exclusively-ownable physical resource (a
/// drivetrain, a motor group, a controller).
///
/// The engine never calls anything on a `Requirable`; the handle exists only
/// so its identity can participate in conflict arbitration.
pub trait Requirable: Send + Sync {}

/// Opaque identity of one [`Requirable`] handle.
///
/// Derived from the `Arc` allocation address, so equality is handle identity,
/// never value equality: two distinct drivetrains that happen to be
/// configured identically are still two distinct resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequirementId(usize);

impl RequirementId {
    /// Identity of the resource behind `handle`.  Clones of the same `Arc`
    /// map to the same id.
    pub fn of<T: Requirable + ?Sized>(handle: &Arc<T>) -> Self {
        RequirementId(Arc::as_ptr(handle) as *const () as usize)
    }
}

// ── Controller boundary contract ──────────────────────────────────────────────

/// Closed-loop control seam consumed by user commands, never by the engine.
///
/// The dominant pattern for authoring leaf commands is to call an externally
/// supplied controller once per `execute` and finish when it reports the
/// setpoint is reached.
pub trait Controller: Send {
    /// Run one control iteration; returns `true` once the target is reached.
    fn compute_output(&mut self) -> bool;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
