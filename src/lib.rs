/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Cadenza – periodic command scheduler for robot control
//!
//! One dedicated thread runs all periodic work at a fixed cadence; one of
//! those periodic tasks is the command scheduler, which drives user control
//! routines through an explicit lifecycle and arbitrates exclusive access to
//! physical resources.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── time/       – Metronome: the precise-wait primitive (spin/sleep/park)
//! ├── executor/   – Executable contract + the dedicated tick thread
//! ├── command/    – Command lifecycle contract, states, resource identities
//! │   └── group   – immutable composition tree + fluent builder
//! ├── runner/     – per-run state machine, listener seam, test harness
//! ├── scheduler/  – active-run set + resource-conflict arbitration
//! ├── reactor/    – edge-triggered switch-condition watcher
//! └── config/     – YAML runtime configuration (period, wait strategy)
//! ```

pub mod command;
pub mod config;
pub mod executor;
pub mod reactor;
pub mod runner;
pub mod scheduler;
pub mod time;

pub use command::{Command, CommandState, Controller, Requirable, RequirementId};
pub use command::group::{CommandNode, GroupBuilder, GroupError};
pub use config::RuntimeConfig;
pub use executor::{Executable, PeriodicExecutor, TaskId};
pub use reactor::{ConditionHandle, SwitchReactor};
pub use runner::{CommandHarness, CommandListener, CommandRunner, NopListener, Outcome};
pub use scheduler::{CommandScheduler, SchedulerError};
pub use time::{Metronome, WaitStrategy};
