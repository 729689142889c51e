/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Periodic executor — one dedicated thread invoking every registered
//! [`Executable`] once per tick.
//!
//! Registration is safe from any thread while the tick loop is running:
//! mutations land in a pending queue and are merged by the executor thread at
//! the top of the next tick, so `register`/`unregister` never block a tick
//! and the loop never observes a torn task list.  Tasks run in registration
//! order; a panicking task is caught, logged with its id and tick time, and
//! the remaining tasks still run.
//!
//! Shutdown sequence: `unregister_all()` followed by `shutdown()` (raise the
//! stop flag, unpark the thread, join).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::time::{Metronome, WaitStrategy};

// ── Executable contract ───────────────────────────────────────────────────────

/// One unit of periodic work.
///
/// Implemented by the command scheduler, the switch reactor, and anything
/// else that wants a slice of every tick.  `time_ms` is the time since the
/// executor thread started, in milliseconds; every task invoked in the same
/// tick sees the same value.
///
/// A tick must not block: the executor runs every registered task within one
/// period, so a blocking task delays all of them.
pub trait Executable: Send {
    fn execute(&mut self, time_ms: u64);
}

/// Opaque handle identifying one registered task, returned by
/// [`PeriodicExecutor::register`] and consumed by
/// [`PeriodicExecutor::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

// ── Internal shared state ─────────────────────────────────────────────────────

enum PendingOp {
    Register(TaskId, Box<dyn Executable>),
    Unregister(TaskId),
    UnregisterAll,
}

struct Shared {
    pending: Mutex<Vec<PendingOp>>,
    stop: Arc<AtomicBool>,
    next_id: AtomicU64,
}

// ── PeriodicExecutor ──────────────────────────────────────────────────────────

/// Owner of the dedicated tick thread and the registered-task set.
pub struct PeriodicExecutor {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl PeriodicExecutor {
    /// Spawn the tick thread with the given period and wait strategy.
    ///
    /// Both are fixed for the lifetime of the executor; there is no safe way
    /// to change them afterwards.
    ///
    /// # Errors
    /// Returns the OS error if the thread could not be spawned.
    pub fn start(period: Duration, strategy: WaitStrategy) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            pending: Mutex::new(Vec::new()),
            stop: Arc::new(AtomicBool::new(false)),
            next_id: AtomicU64::new(1),
        });

        let loop_shared = shared.clone();
        let thread = thread::Builder::new()
            .name("cadenza-tick".into())
            .spawn(move || tick_loop(loop_shared, period, strategy))?;

        info!(period_ms = period.as_millis() as u64, ?strategy, "periodic executor started");
        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Register a task; it joins the tick rotation at the top of the next
    /// tick, after every task registered before it.
    pub fn register(&self, task: Box<dyn Executable>) -> TaskId {
        let id = TaskId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        self.push_op(PendingOp::Register(id, task));
        debug!(task = id.0, "task registered");
        id
    }

    /// Remove a task; it performs no further ticks once the executor thread
    /// merges the removal (the current tick may still invoke it).
    pub fn unregister(&self, id: TaskId) {
        self.push_op(PendingOp::Unregister(id));
        debug!(task = id.0, "task unregistered");
    }

    /// Remove every registered task.
    pub fn unregister_all(&self) {
        self.push_op(PendingOp::UnregisterAll);
        debug!("all tasks unregistered");
    }

    /// Stop the tick thread and join it.  Pending registrations are dropped.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn push_op(&self, op: PendingOp) {
        lock_unpoisoned(&self.shared.pending).push(op);
    }

    fn stop_and_join(&mut self) {
        if let Some(handle) = self.thread.take() {
            self.shared.stop.store(true, Ordering::Release);
            handle.thread().unpark();
            if handle.join().is_err() {
                error!("executor thread terminated by panic");
            } else {
                info!("periodic executor stopped");
            }
        }
    }
}

impl Drop for PeriodicExecutor {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

// ── Tick loop ─────────────────────────────────────────────────────────────────

fn tick_loop(shared: Arc<Shared>, period: Duration, strategy: WaitStrategy) {
    let mut metronome = Metronome::new(period, strategy, shared.stop.clone());
    let mut tasks: Vec<(TaskId, Box<dyn Executable>)> = Vec::new();
    let epoch = Instant::now();

    loop {
        if !metronome.pause() {
            break;
        }
        merge_pending(&shared, &mut tasks);

        let time_ms = epoch.elapsed().as_millis() as u64;
        for (id, task) in tasks.iter_mut() {
            let outcome = catch_unwind(AssertUnwindSafe(|| task.execute(time_ms)));
            if let Err(payload) = outcome {
                error!(
                    task = id.0,
                    time_ms,
                    panic = panic_message(payload.as_ref()),
                    "task tick panicked; remaining tasks still run"
                );
            }
        }
    }
}

fn merge_pending(shared: &Shared, tasks: &mut Vec<(TaskId, Box<dyn Executable>)>) {
    let ops: Vec<PendingOp> = {
        let mut pending = lock_unpoisoned(&shared.pending);
        pending.drain(..).collect()
    };
    for op in ops {
        match op {
            PendingOp::Register(id, task) => tasks.push((id, task)),
            PendingOp::Unregister(id) => tasks.retain(|(tid, _)| *tid != id),
            PendingOp::UnregisterAll => tasks.clear(),
        }
    }
}

/// Extract a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// Lock a mutex, recovering the guard if a previous holder panicked.  The
/// executor isolates task panics before they can poison anything, so this
/// only matters for panics inside test assertions.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
