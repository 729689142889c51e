/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Switch reactor — an [`Executable`] that polls boolean conditions once per
//! tick and notifies listeners on edges (state changes).
//!
//! Listener registration is safe while notifications are in flight: new
//! listeners land in a per-condition pending list (a plain mutex-guarded
//! vector) and are merged before the next notification pass, so registration
//! from another thread — or from inside a listener callback — never corrupts
//! or skips the listeners already registered for the current or next pass.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::executor::{lock_unpoisoned, Executable};

type Probe = Box<dyn FnMut() -> bool + Send>;
type Listener = Box<dyn FnMut(bool) + Send>;

// ── Internal state ────────────────────────────────────────────────────────────

struct Condition {
    name: String,
    probe: Probe,
    last: bool,
    listeners: Vec<Listener>,
    pending: Arc<Mutex<Vec<Listener>>>,
}

// ── SwitchReactor ─────────────────────────────────────────────────────────────

/// Edge-triggered condition watcher.  Register the reactor (a clone) with the
/// periodic executor; keep another clone to add watched conditions.
#[derive(Clone)]
pub struct SwitchReactor {
    conditions: Arc<Mutex<Vec<Condition>>>,
}

/// Handle for registering listeners on one watched condition.
#[derive(Clone)]
pub struct ConditionHandle {
    pending: Arc<Mutex<Vec<Listener>>>,
}

impl ConditionHandle {
    /// Register a listener invoked with the new state on every edge.
    /// Takes effect by the next notification pass at the latest.
    pub fn on_change(&self, listener: impl FnMut(bool) + Send + 'static) {
        lock_unpoisoned(&self.pending).push(Box::new(listener));
    }
}

impl SwitchReactor {
    pub fn new() -> Self {
        Self {
            conditions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Watch a boolean condition.  `probe` is polled once per tick; the
    /// initial state is taken as `false`, so a probe that is already true
    /// fires a rising edge on the first tick.
    pub fn watch(
        &self,
        name: impl Into<String>,
        probe: impl FnMut() -> bool + Send + 'static,
    ) -> ConditionHandle {
        let pending = Arc::new(Mutex::new(Vec::new()));
        lock_unpoisoned(&self.conditions).push(Condition {
            name: name.into(),
            probe: Box::new(probe),
            last: false,
            listeners: Vec::new(),
            pending: pending.clone(),
        });
        ConditionHandle { pending }
    }
}

impl Default for SwitchReactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executable for SwitchReactor {
    fn execute(&mut self, time_ms: u64) {
        let mut conditions = lock_unpoisoned(&self.conditions);
        for cond in conditions.iter_mut() {
            // Merge listeners registered since the last pass.  Re-entrant
            // registration from a callback only touches `pending`, never the
            // vector being iterated.
            let mut new_listeners: Vec<Listener> =
                lock_unpoisoned(&cond.pending).drain(..).collect();
            cond.listeners.append(&mut new_listeners);

            let state = (cond.probe)();
            if state != cond.last {
                cond.last = state;
                debug!(condition = %cond.name, state, time_ms, "switch edge");
                for listener in cond.listeners.iter_mut() {
                    listener(state);
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
