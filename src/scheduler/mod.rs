/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Command scheduler — the periodic task that owns every active command run
//! and arbitrates exclusive access to physical resources.
//!
//! # Arbitration policy
//! Submission always wins: if a newly submitted command requires a resource
//! currently held by an active run, that run is interrupted on the spot (its
//! `end()` completes before this call returns) and the resource passes to
//! the new run.  There is no priority scheme beyond "last submission wins".
//!
//! # Threading
//! [`CommandScheduler`] is a cheap cloneable handle.  `submit` is safe from
//! any thread **except** inside a command body running on the executor
//! thread — command logic that wants to start another run uses a `fork` node
//! instead, which lands in a pending queue drained at the top of the next
//! tick through the same admission path.  All stepping happens on the
//! executor thread via the [`Executable`] implementation.
//!
//! # Ordering guarantees
//! Runners are stepped in admission order, and an interrupted holder's
//! `end()` always completes before the pre-empting run's `initialize()` —
//! admission happens between ticks (or at the top of one), never mid-step.

pub mod error;

pub use error::SchedulerError;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::command::group::CommandNode;
use crate::command::RequirementId;
use crate::executor::{lock_unpoisoned, Executable};
use crate::runner::{CommandListener, CommandRunner, NopListener, StepCtx};

// ── Internal state ────────────────────────────────────────────────────────────

struct ActiveRun {
    id: u64,
    label: String,
    runner: CommandRunner,
}

struct SchedState {
    active: Vec<ActiveRun>,
    /// Resource identity → id of the run currently holding it.
    owners: HashMap<RequirementId, u64>,
    listener: Box<dyn CommandListener>,
    next_id: u64,
    /// Time of the most recent tick; stamps interrupts performed between
    /// ticks (pre-emption during `submit`, `kill_all`).
    now_ms: u64,
}

// ── CommandScheduler ──────────────────────────────────────────────────────────

/// Cloneable handle to the shared scheduling state.  Register one clone with
/// the periodic executor; keep others wherever commands are submitted from.
#[derive(Clone)]
pub struct CommandScheduler {
    state: Arc<Mutex<SchedState>>,
    /// Fork submissions and anything else deferred to the next tick.
    pending: Arc<Mutex<Vec<CommandNode>>>,
}

impl CommandScheduler {
    pub fn new() -> Self {
        Self::with_listener(Box::new(NopListener))
    }

    /// Build a scheduler whose listener is notified synchronously on every
    /// command state transition.
    pub fn with_listener(listener: Box<dyn CommandListener>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedState {
                active: Vec::new(),
                owners: HashMap::new(),
                listener,
                next_id: 1,
                now_ms: 0,
            })),
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Submit a command (or composition tree) for execution.
    ///
    /// Validates synchronously, then pre-empts any active run holding one of
    /// the submission's required resources: the loser is driven straight to
    /// Interrupted — `end()` called, resources released, removed from the
    /// active set — before the new run is admitted.  The new run's first
    /// step happens on the next tick.
    ///
    /// Callable from any thread.  Not callable from inside a command body on
    /// the executor thread; use a `fork` node there.
    ///
    /// # Errors
    /// [`SchedulerError::InvalidGroup`] for a structurally invalid tree; no
    /// state changes in that case.
    pub fn submit(&self, node: impl Into<CommandNode>) -> Result<(), SchedulerError> {
        let node = node.into();
        node.validate()?;
        let mut state = lock_unpoisoned(&self.state);
        Self::admit(&mut state, node);
        Ok(())
    }

    /// Interrupt and finalize every active run immediately.  Used on
    /// shutdown and mode transitions.
    pub fn kill_all(&self) {
        let mut state = lock_unpoisoned(&self.state);
        let SchedState {
            active,
            owners,
            listener,
            now_ms,
            ..
        } = &mut *state;

        for mut run in active.drain(..) {
            let mut scratch = Vec::new();
            let mut ctx = StepCtx::new(*now_ms, &mut scratch, listener.as_mut());
            run.runner.force_interrupt(&mut ctx);
            info!(command = %run.label, id = run.id, time_ms = *now_ms, "run killed");
        }
        owners.clear();
        lock_unpoisoned(&self.pending).clear();
    }

    /// Whether no run is active or pending.  Gates safe re-initialization.
    pub fn is_empty(&self) -> bool {
        lock_unpoisoned(&self.state).active.is_empty()
            && lock_unpoisoned(&self.pending).is_empty()
    }

    // ── Admission & arbitration ───────────────────────────────────────────────

    fn admit(state: &mut SchedState, node: CommandNode) {
        let requirements = node.requirements();

        for req in &requirements {
            let Some(holder_id) = state.owners.get(req).copied() else {
                continue;
            };
            if let Some(pos) = state.active.iter().position(|r| r.id == holder_id) {
                let mut loser = state.active.remove(pos);
                let now_ms = state.now_ms;
                warn!(
                    winner = %node.label(),
                    loser = %loser.label,
                    time_ms = now_ms,
                    "resource conflict: pre-empting current holder"
                );
                let mut scratch = Vec::new();
                let mut ctx = StepCtx::new(now_ms, &mut scratch, state.listener.as_mut());
                loser.runner.force_interrupt(&mut ctx);
            }
            state.owners.retain(|_, id| *id != holder_id);
        }

        let id = state.next_id;
        state.next_id += 1;
        for req in &requirements {
            state.owners.insert(*req, id);
        }
        let label = node.label().to_string();
        debug!(command = %label, id, requirements = requirements.len(), "run admitted");
        state.active.push(ActiveRun {
            id,
            label,
            runner: CommandRunner::new(node),
        });
    }

    // ── Tick ──────────────────────────────────────────────────────────────────

    fn run_tick(&self, time_ms: u64) {
        let mut state = lock_unpoisoned(&self.state);
        state.now_ms = time_ms;

        // Admit fork submissions deferred from the previous tick.
        let deferred: Vec<CommandNode> = lock_unpoisoned(&self.pending).drain(..).collect();
        for node in deferred {
            Self::admit(&mut state, node);
        }

        // Step pass over a stable snapshot of the active set.
        let mut forked: Vec<CommandNode> = Vec::new();
        {
            let SchedState {
                active, listener, ..
            } = &mut *state;
            for run in active.iter_mut() {
                let mut ctx = StepCtx::new(time_ms, &mut forked, listener.as_mut());
                run.runner.step(&mut ctx);
            }
        }

        // Drop completed runs and release their resources.
        let SchedState { active, owners, .. } = &mut *state;
        active.retain(|run| {
            if let Some(outcome) = run.runner.outcome() {
                owners.retain(|_, id| *id != run.id);
                debug!(command = %run.label, id = run.id, ?outcome, time_ms, "run complete");
                false
            } else {
                true
            }
        });
        drop(state);

        if !forked.is_empty() {
            lock_unpoisoned(&self.pending).extend(forked);
        }
    }
}

impl Default for CommandScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Executable for CommandScheduler {
    fn execute(&mut self, time_ms: u64) {
        self.run_tick(time_ms);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::group::GroupBuilder;
    use crate::command::{Command, CommandState, Requirable};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    struct Drivetrain;
    impl Requirable for Drivetrain {}

    /// Command that appends lifecycle markers to a shared journal.
    struct Journaled {
        name: &'static str,
        journal: Arc<StdMutex<Vec<String>>>,
        finish_after: u32,
        executed: u32,
        requirements: Vec<RequirementId>,
    }

    impl Journaled {
        fn new(
            name: &'static str,
            journal: Arc<StdMutex<Vec<String>>>,
            finish_after: u32,
            requirements: Vec<RequirementId>,
        ) -> Self {
            Self {
                name,
                journal,
                finish_after,
                executed: 0,
                requirements,
            }
        }

        fn log(&self, event: &str) {
            self.journal.lock().unwrap().push(format!("{}:{}", self.name, event));
        }
    }

    impl Command for Journaled {
        fn name(&self) -> &str {
            self.name
        }
        fn initialize(&mut self) {
            self.log("init");
        }
        fn execute(&mut self) -> bool {
            self.executed += 1;
            self.log("exec");
            self.executed >= self.finish_after
        }
        fn end(&mut self) {
            self.log("end");
        }
        fn requirements(&self) -> Vec<RequirementId> {
            self.requirements.clone()
        }
    }

    fn scheduler() -> (CommandScheduler, CommandScheduler) {
        let s = CommandScheduler::new();
        (s.clone(), s)
    }

    fn journal() -> Arc<StdMutex<Vec<String>>> {
        Arc::new(StdMutex::new(Vec::new()))
    }

    fn events(journal: &Arc<StdMutex<Vec<String>>>) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    // ── Resource arbitration ──────────────────────────────────────────────────

    #[test]
    fn newest_submission_preempts_the_current_holder() {
        let (mut tick, handle) = scheduler();
        let resource: Arc<Drivetrain> = Arc::new(Drivetrain);
        let r = RequirementId::of(&resource);
        let j = journal();

        handle
            .submit(Journaled::new("a", j.clone(), u32::MAX, vec![r]))
            .unwrap();
        tick.execute(0); // A is now running

        // Submitting B must synchronously interrupt A, before returning.
        handle
            .submit(Journaled::new("b", j.clone(), u32::MAX, vec![r]))
            .unwrap();
        assert_eq!(
            events(&j),
            vec!["a:init", "a:exec", "a:end"],
            "A must be ended by B's submission alone"
        );

        tick.execute(20);
        let log = events(&j);
        assert_eq!(log.last().map(String::as_str), Some("b:exec"));
        let a_end = log.iter().position(|e| e == "a:end").unwrap();
        let b_init = log.iter().position(|e| e == "b:init").unwrap();
        assert!(a_end < b_init, "A's end must precede B's initialize");
    }

    #[test]
    fn unrelated_resources_do_not_preempt() {
        let (mut tick, handle) = scheduler();
        let left: Arc<Drivetrain> = Arc::new(Drivetrain);
        let right: Arc<Drivetrain> = Arc::new(Drivetrain);
        let (r1, r2) = (RequirementId::of(&left), RequirementId::of(&right));
        let j = journal();

        handle
            .submit(Journaled::new("a", j.clone(), u32::MAX, vec![r1]))
            .unwrap();
        handle
            .submit(Journaled::new("b", j.clone(), u32::MAX, vec![r2]))
            .unwrap();
        tick.execute(0);

        let log = events(&j);
        assert!(log.contains(&"a:exec".to_string()));
        assert!(log.contains(&"b:exec".to_string()));
        assert!(!log.contains(&"a:end".to_string()));
    }

    #[test]
    fn group_claims_the_union_of_leaf_requirements() {
        let (mut tick, handle) = scheduler();
        let resource: Arc<Drivetrain> = Arc::new(Drivetrain);
        let r = RequirementId::of(&resource);
        let j = journal();

        let group = GroupBuilder::new()
            .sequentially(vec![
                Journaled::new("first", j.clone(), u32::MAX, vec![r]).into(),
            ])
            .build()
            .unwrap();
        handle.submit(group).unwrap();
        tick.execute(0);

        // A later leaf needing the same resource pre-empts the whole group.
        handle
            .submit(Journaled::new("usurper", j.clone(), u32::MAX, vec![r]))
            .unwrap();
        assert!(events(&j).contains(&"first:end".to_string()));
    }

    // ── Lifecycle through ticks ───────────────────────────────────────────────

    #[test]
    fn completed_runs_are_removed_and_release_resources() {
        let (mut tick, handle) = scheduler();
        let resource: Arc<Drivetrain> = Arc::new(Drivetrain);
        let r = RequirementId::of(&resource);
        let j = journal();

        handle
            .submit(Journaled::new("oneshot", j.clone(), 1, vec![r]))
            .unwrap();
        assert!(!handle.is_empty());
        tick.execute(0);
        assert!(handle.is_empty(), "completed run leaves the active set");

        // The resource is free again: a new holder is admitted cleanly.
        handle
            .submit(Journaled::new("next", j.clone(), 1, vec![r]))
            .unwrap();
        tick.execute(20);
        assert!(handle.is_empty());
        let log = events(&j);
        assert!(log.contains(&"next:end".to_string()));
        let oneshot_ends = log.iter().filter(|e| *e == "oneshot:end").count();
        assert_eq!(oneshot_ends, 1, "a completed run must not be ended again");
    }

    #[test]
    fn kill_all_interrupts_every_active_run() {
        let (mut tick, handle) = scheduler();
        let j = journal();

        handle
            .submit(Journaled::new("x", j.clone(), u32::MAX, vec![]))
            .unwrap();
        handle
            .submit(Journaled::new("y", j.clone(), u32::MAX, vec![]))
            .unwrap();
        tick.execute(0);

        handle.kill_all();
        assert!(handle.is_empty());
        let log = events(&j);
        assert!(log.contains(&"x:end".to_string()));
        assert!(log.contains(&"y:end".to_string()));
    }

    #[test]
    fn invalid_submission_is_rejected_without_state_change() {
        let (_, handle) = scheduler();
        let err = handle
            .submit(CommandNode::Sequential(vec![]))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidGroup(_)));
        assert!(handle.is_empty());
    }

    // ── Fork ──────────────────────────────────────────────────────────────────

    #[test]
    fn forked_child_runs_independently_of_its_parent() {
        let (mut tick, handle) = scheduler();
        let j = journal();

        let routine = GroupBuilder::new()
            .fork(Journaled::new("detached", j.clone(), 4, vec![]))
            .sequentially(vec![Journaled::new("after", j.clone(), 1, vec![]).into()])
            .build()
            .unwrap();
        handle.submit(routine).unwrap();

        tick.execute(0); // fork point completes; child deferred to next tick
        tick.execute(20); // "after" runs; "detached" admitted and stepped
        let log = events(&j);
        assert!(log.contains(&"after:init".to_string()), "sequence proceeded past the fork");
        assert!(log.contains(&"detached:init".to_string()), "forked child started");
        assert!(!handle.is_empty(), "forked child outlives the sequence");

        tick.execute(40);
        tick.execute(60);
        tick.execute(80);
        assert!(handle.is_empty(), "forked child eventually completes on its own");
        assert!(events(&j).contains(&"detached:end".to_string()));
    }

    // ── Listener ──────────────────────────────────────────────────────────────

    #[test]
    fn listener_is_notified_synchronously_per_transition() {
        struct Capture(Arc<StdMutex<Vec<(String, CommandState)>>>);
        impl CommandListener for Capture {
            fn record(&mut self, command: &str, state: CommandState) {
                self.0.lock().unwrap().push((command.to_string(), state));
            }
        }

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let mut scheduler = CommandScheduler::with_listener(Box::new(Capture(seen.clone())));
        let j = journal();
        scheduler
            .submit(Journaled::new("obs", j, 1, vec![]))
            .unwrap();
        scheduler.execute(0);

        let seen = seen.lock().unwrap();
        let states: Vec<CommandState> = seen.iter().map(|(_, s)| *s).collect();
        assert_eq!(
            states,
            vec![
                CommandState::Running,
                CommandState::Finished,
                CommandState::Finalized
            ]
        );
        assert!(seen.iter().all(|(name, _)| name == "obs"));
    }

    #[test]
    fn preemption_interrupt_is_stamped_with_the_last_tick_time() {
        use tracing_subscriber::fmt::MakeWriter;

        #[derive(Clone)]
        struct Capture(Arc<StdMutex<Vec<u8>>>);
        impl std::io::Write for Capture {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        impl<'a> MakeWriter<'a> for Capture {
            type Writer = Capture;
            fn make_writer(&'a self) -> Capture {
                self.clone()
            }
        }

        let sink = Capture(Arc::new(StdMutex::new(Vec::new())));
        let subscriber = tracing_subscriber::fmt()
            .with_writer(sink.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .without_time()
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let (mut tick, handle) = scheduler();
            let resource: Arc<Drivetrain> = Arc::new(Drivetrain);
            let r = RequirementId::of(&resource);
            let j = journal();

            handle
                .submit(Journaled::new("a", j.clone(), u32::MAX, vec![r]))
                .unwrap();
            tick.execute(40);
            handle
                .submit(Journaled::new("b", j, u32::MAX, vec![r]))
                .unwrap();
        });

        let logs = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert!(
            logs.contains("time_ms=40"),
            "pre-emption between ticks must carry the last tick time, got: {logs}"
        );
    }

    // ── Cross-thread submission ───────────────────────────────────────────────

    #[test]
    fn submissions_race_ticks_without_losing_runs() {
        let (mut tick, handle) = scheduler();
        let done = Arc::new(AtomicU32::new(0));

        struct CountDone(Arc<AtomicU32>);
        impl Command for CountDone {
            fn execute(&mut self) -> bool {
                true
            }
            fn end(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let submitter = {
            let handle = handle.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    handle.submit(CountDone(done.clone())).unwrap();
                }
            })
        };
        for t in 0..200 {
            tick.execute(t);
            if submitter.is_finished() && handle.is_empty() {
                break;
            }
        }
        submitter.join().unwrap();
        // Drain anything admitted after the last checked tick.
        tick.execute(1_000);
        assert_eq!(done.load(Ordering::SeqCst), 50, "every submission ran to completion");
        assert!(handle.is_empty());
    }
}
