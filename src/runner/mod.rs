/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Command runner — the live per-run state machine.
//!
//! A [`CommandRunner`] drives one frozen [`CommandNode`] tree through the
//! lifecycle on every tick.  `step()` returns `true` once the run may be
//! dropped from the active set; stepping a terminal runner is a no-op that
//! keeps reporting completion.
//!
//! Leaf stepping falls through within a single tick: initialize → execute →
//! (on completion or timeout) end.  A command whose `execute` returns true on
//! its first call therefore completes, `end()` included, in one step — which
//! is what gives sequential groups their one-child-per-tick cadence.
//!
//! Panics inside `initialize`/`execute`/`end` are caught and treated as
//! interruption: `end` is still attempted at most once, the fault is logged,
//! and the runner reports done so one broken command cannot wedge the
//! scheduler.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, warn};

use crate::command::group::CommandNode;
use crate::command::{Command, CommandState};
use crate::executor::panic_message;

// ── Outcome ───────────────────────────────────────────────────────────────────

/// How one run (leaf or group) terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `execute` reported natural completion.
    Completed,
    /// Every child of a group joined, but at least one timed out or was
    /// interrupted along the way.
    CompletedWithFailures,
    /// The configured timeout elapsed first.
    TimedOut,
    /// Cancelled, pre-empted, or faulted.
    Interrupted,
}

// ── Listener seam ─────────────────────────────────────────────────────────────

/// Synchronous observer of command state transitions, notified within the
/// same step that performs the transition so ordering is preserved.
///
/// Notifications carry the leaf command's name; group plumbing is engine
/// state and produces no events of its own.  Used externally to feed a
/// persistent event log; [`NopListener`] is the default.
pub trait CommandListener: Send {
    fn record(&mut self, command: &str, state: CommandState);
}

/// Listener that ignores every transition.
pub struct NopListener;

impl CommandListener for NopListener {
    fn record(&mut self, _command: &str, _state: CommandState) {}
}

// ── Step context ──────────────────────────────────────────────────────────────

/// Per-step environment handed down the runner tree: the tick time, the sink
/// for forked children, and the transition listener.
pub struct StepCtx<'a> {
    time_ms: u64,
    forked: &'a mut Vec<CommandNode>,
    listener: &'a mut dyn CommandListener,
}

impl<'a> StepCtx<'a> {
    pub fn new(
        time_ms: u64,
        forked: &'a mut Vec<CommandNode>,
        listener: &'a mut dyn CommandListener,
    ) -> Self {
        Self {
            time_ms,
            forked,
            listener,
        }
    }

    pub fn time_ms(&self) -> u64 {
        self.time_ms
    }

    fn record(&mut self, command: &str, state: CommandState) {
        self.listener.record(command, state);
    }

    fn fork(&mut self, node: CommandNode) {
        self.forked.push(node);
    }
}

// ── Leaf state machine ────────────────────────────────────────────────────────

struct LeafRun {
    command: Box<dyn Command>,
    name: String,
    state: CommandState,
    started_ms: u64,
    timed_out: bool,
    outcome: Option<Outcome>,
}

impl LeafRun {
    fn new(command: Box<dyn Command>) -> Self {
        let name = command.name().to_string();
        Self {
            command,
            name,
            state: CommandState::Uninitialized,
            started_ms: 0,
            timed_out: false,
            outcome: None,
        }
    }

    fn step(&mut self, ctx: &mut StepCtx) -> Option<Outcome> {
        if let Some(outcome) = self.outcome {
            return Some(outcome);
        }

        if self.state == CommandState::Uninitialized {
            if self.hook_panicked("initialize", ctx.time_ms, |c| c.initialize()) {
                return Some(self.interrupt(ctx));
            }
            self.started_ms = ctx.time_ms;
            self.state = CommandState::Running;
            ctx.record(&self.name, CommandState::Running);
        }

        if self.state == CommandState::Running {
            let finished = match self.run_execute(ctx.time_ms) {
                Ok(done) => done,
                Err(()) => return Some(self.interrupt(ctx)),
            };
            let timeout = self.command.timeout();
            let elapsed = ctx.time_ms.saturating_sub(self.started_ms);
            let timed_out = !timeout.is_zero() && elapsed >= timeout.as_millis() as u64;

            if finished || timed_out {
                self.timed_out = timed_out && !finished;
                self.state = CommandState::Finished;
                ctx.record(&self.name, CommandState::Finished);
            } else {
                return None;
            }
        }

        // Finished → run end() and finalize within the same step.
        self.hook_panicked("end", ctx.time_ms, |c| c.end());
        self.state = CommandState::Finalized;
        ctx.record(&self.name, CommandState::Finalized);
        let outcome = if self.timed_out {
            Outcome::TimedOut
        } else {
            Outcome::Completed
        };
        self.outcome = Some(outcome);
        Some(outcome)
    }

    /// Terminate the run: `end()` exactly once (tolerating an un-initialized
    /// command), then mark Interrupted.  Idempotent.
    fn interrupt(&mut self, ctx: &mut StepCtx) -> Outcome {
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        self.hook_panicked("end", ctx.time_ms, |c| c.end());
        self.state = CommandState::Interrupted;
        ctx.record(&self.name, CommandState::Interrupted);
        self.outcome = Some(Outcome::Interrupted);
        Outcome::Interrupted
    }

    fn run_execute(&mut self, time_ms: u64) -> Result<bool, ()> {
        match catch_unwind(AssertUnwindSafe(|| self.command.execute())) {
            Ok(done) => Ok(done),
            Err(payload) => {
                error!(
                    command = %self.name,
                    time_ms,
                    hook = "execute",
                    panic = panic_message(payload.as_ref()),
                    "command logic fault; run will be interrupted"
                );
                Err(())
            }
        }
    }

    /// Run a lifecycle hook, logging a panic.  Returns `true` if it panicked.
    fn hook_panicked(
        &mut self,
        hook: &'static str,
        time_ms: u64,
        f: impl FnOnce(&mut dyn Command),
    ) -> bool {
        let command = self.command.as_mut();
        match catch_unwind(AssertUnwindSafe(|| f(command))) {
            Ok(_) => false,
            Err(payload) => {
                error!(
                    command = %self.name,
                    time_ms,
                    hook,
                    panic = panic_message(payload.as_ref()),
                    "command logic fault"
                );
                true
            }
        }
    }
}

// ── Run tree ──────────────────────────────────────────────────────────────────

enum RunNode {
    Leaf(LeafRun),
    Sequential {
        children: Vec<RunNode>,
        cursor: usize,
        degraded: bool,
    },
    Parallel {
        children: Vec<RunNode>,
        results: Vec<Option<Outcome>>,
        partial_failure: bool,
    },
    Fork {
        child: Option<CommandNode>,
    },
}

impl RunNode {
    fn instantiate(node: CommandNode) -> Self {
        match node {
            CommandNode::Leaf(command) => RunNode::Leaf(LeafRun::new(command)),
            CommandNode::Sequential(children) => RunNode::Sequential {
                children: children.into_iter().map(RunNode::instantiate).collect(),
                cursor: 0,
                degraded: false,
            },
            CommandNode::Parallel(children) => {
                let len = children.len();
                RunNode::Parallel {
                    children: children.into_iter().map(RunNode::instantiate).collect(),
                    results: vec![None; len],
                    partial_failure: false,
                }
            }
            CommandNode::Fork(child) => RunNode::Fork {
                child: Some(*child),
            },
        }
    }

    /// Advance this subtree by one tick.  `Some(outcome)` means the subtree
    /// is done and will perform no further work.
    fn step(&mut self, ctx: &mut StepCtx) -> Option<Outcome> {
        match self {
            RunNode::Leaf(leaf) => leaf.step(ctx),

            RunNode::Sequential {
                children,
                cursor,
                degraded,
            } => {
                if *cursor >= children.len() {
                    return Some(if *degraded {
                        Outcome::CompletedWithFailures
                    } else {
                        Outcome::Completed
                    });
                }
                match children[*cursor].step(ctx)? {
                    done @ (Outcome::Completed | Outcome::CompletedWithFailures) => {
                        if done == Outcome::CompletedWithFailures {
                            *degraded = true;
                        }
                        *cursor += 1;
                        // Next child first steps on the following tick; a
                        // group past its last child likewise first reports
                        // done on the following tick.
                        None
                    }
                    failed => {
                        warn!(
                            time_ms = ctx.time_ms,
                            child_outcome = ?failed,
                            "sequential group interrupted; remaining children will not run"
                        );
                        *cursor = children.len();
                        Some(Outcome::Interrupted)
                    }
                }
            }

            RunNode::Parallel {
                children,
                results,
                partial_failure,
            } => {
                for (child, slot) in children.iter_mut().zip(results.iter_mut()) {
                    if slot.is_some() {
                        continue;
                    }
                    if let Some(outcome) = child.step(ctx) {
                        if outcome != Outcome::Completed {
                            *partial_failure = true;
                        }
                        *slot = Some(outcome);
                    }
                }
                if results.iter().all(Option::is_some) {
                    if *partial_failure {
                        warn!(
                            time_ms = ctx.time_ms,
                            "parallel group joined with partial failure"
                        );
                        Some(Outcome::CompletedWithFailures)
                    } else {
                        Some(Outcome::Completed)
                    }
                } else {
                    None
                }
            }

            RunNode::Fork { child } => {
                if let Some(node) = child.take() {
                    ctx.fork(node);
                }
                Some(Outcome::Completed)
            }
        }
    }

    /// Terminate every live descendant: `end()` for each child that entered
    /// the lifecycle, nothing for children that never started.
    fn interrupt(&mut self, ctx: &mut StepCtx) -> Outcome {
        match self {
            RunNode::Leaf(leaf) => leaf.interrupt(ctx),

            RunNode::Sequential {
                children, cursor, ..
            } => {
                if *cursor < children.len() {
                    children[*cursor].interrupt(ctx);
                    *cursor = children.len();
                }
                Outcome::Interrupted
            }

            RunNode::Parallel {
                children, results, ..
            } => {
                for (child, slot) in children.iter_mut().zip(results.iter_mut()) {
                    if slot.is_none() {
                        child.interrupt(ctx);
                        *slot = Some(Outcome::Interrupted);
                    }
                }
                Outcome::Interrupted
            }

            RunNode::Fork { child } => {
                // An undispatched fork child never started; just drop it.
                child.take();
                Outcome::Interrupted
            }
        }
    }
}

// ── CommandRunner ─────────────────────────────────────────────────────────────

/// The live, mutable execution record for one command run.
pub struct CommandRunner {
    root: RunNode,
    cancelled: AtomicBool,
    outcome: Option<Outcome>,
}

impl CommandRunner {
    pub fn new(node: CommandNode) -> Self {
        Self {
            root: RunNode::instantiate(node),
            cancelled: AtomicBool::new(false),
            outcome: None,
        }
    }

    /// Request cooperative cancellation.  Only sets a flag; the actual
    /// `end()` and state transition happen on the next step performed by the
    /// stepping thread.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Terminal outcome, once the run has completed.
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Advance the run by one tick.  Returns `true` when the runner may be
    /// dropped from the active set.  Idempotent after completion.
    pub fn step(&mut self, ctx: &mut StepCtx) -> bool {
        if self.outcome.is_some() {
            return true;
        }
        if self.is_cancelled() {
            self.outcome = Some(self.root.interrupt(ctx));
            return true;
        }
        match self.root.step(ctx) {
            Some(outcome) => {
                self.outcome = Some(outcome);
                true
            }
            None => false,
        }
    }

    /// Immediately drive the run to Interrupted (resource pre-emption,
    /// `kill_all`).  `end()` hooks fire synchronously before this returns.
    pub fn force_interrupt(&mut self, ctx: &mut StepCtx) {
        if self.outcome.is_none() {
            self.outcome = Some(self.root.interrupt(ctx));
        }
    }
}

// ── CommandHarness ────────────────────────────────────────────────────────────

/// Direct-drive wrapper for deterministic unit testing of commands: steps a
/// single [`CommandRunner`] with caller-supplied times, no executor or
/// scheduler required.  Forked children are collected instead of scheduled
/// and can be retrieved with [`take_forked`](Self::take_forked).
pub struct CommandHarness {
    runner: CommandRunner,
    forked: Vec<CommandNode>,
    listener: Box<dyn CommandListener>,
}

impl CommandHarness {
    pub fn new(node: impl Into<CommandNode>) -> Self {
        Self::with_listener(node, Box::new(NopListener))
    }

    pub fn with_listener(node: impl Into<CommandNode>, listener: Box<dyn CommandListener>) -> Self {
        Self {
            runner: CommandRunner::new(node.into()),
            forked: Vec::new(),
            listener,
        }
    }

    /// Step once at the given time; returns `true` when the run is done.
    pub fn step(&mut self, time_ms: u64) -> bool {
        let mut ctx = StepCtx::new(time_ms, &mut self.forked, self.listener.as_mut());
        self.runner.step(&mut ctx)
    }

    pub fn cancel(&self) {
        self.runner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.runner.is_cancelled()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.runner.outcome()
    }

    /// Children detached by fork nodes since the last call.
    pub fn take_forked(&mut self) -> Vec<CommandNode> {
        std::mem::take(&mut self.forked)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
