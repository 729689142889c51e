/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Runtime configuration loading.
//!
//! The expected YAML structure is:
//! ```yaml
//! period_ms: 20
//! wait_strategy: sleep   # spin | sleep | park
//! ```
//!
//! Both the tick period and the wait strategy are fixed at executor
//! construction time; this module only decides what those values are.
//! Missing fields fall back to their defaults so partial configs are
//! accepted gracefully.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::time::WaitStrategy;

/// Default tick period when the YAML omits `period_ms`: 20 ms (50 Hz), the
/// usual cadence for small robot control loops.
const DEFAULT_PERIOD_MS: u64 = 20;

// ── Private YAML deserialization type ─────────────────────────────────────────

/// Maps directly onto the YAML file layout.  Kept private — callers work
/// with [`RuntimeConfig`] instead.
#[derive(Debug, Deserialize)]
struct RuntimeConfigFile {
    #[serde(default = "default_period_ms")]
    period_ms: u64,
    #[serde(default)]
    wait_strategy: WaitStrategy,
}

fn default_period_ms() -> u64 {
    DEFAULT_PERIOD_MS
}

// ── RuntimeConfig ─────────────────────────────────────────────────────────────

/// Validated runtime configuration for the periodic executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    period: Duration,
    strategy: WaitStrategy,
}

impl RuntimeConfig {
    /// Parse and validate `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the YAML is structurally
    /// invalid, the strategy name is unknown, or `period_ms` is zero.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot open configuration file: {}", path.display()))?;

        let file: RuntimeConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse YAML file: {}", path.display()))?;

        if file.period_ms == 0 {
            bail!("period_ms must be non-zero in {}", path.display());
        }

        let config = Self {
            period: Duration::from_millis(file.period_ms),
            strategy: file.wait_strategy,
        };
        info!(
            period_ms = file.period_ms,
            strategy = ?config.strategy,
            "runtime configuration loaded"
        );
        Ok(config)
    }

    /// The tick period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// The configured wait strategy.
    pub fn strategy(&self) -> WaitStrategy {
        self.strategy
    }

    /// Override the period, e.g. from a CLI flag.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(DEFAULT_PERIOD_MS),
            strategy: WaitStrategy::default(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
