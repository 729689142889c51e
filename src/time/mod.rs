/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Metronome — the precise-wait primitive behind the periodic executor.
//!
//! [`Metronome::pause`] blocks the calling thread until the next tick
//! boundary.  The next deadline is always `previous deadline + period`, never
//! "now + period": a late tick shortens the following wait instead of shifting
//! every subsequent boundary, so lateness does not accumulate as drift.
//!
//! Three [`WaitStrategy`] variants trade CPU usage for timing accuracy behind
//! the same contract:
//!
//! | Strategy | Mechanism | Accuracy | CPU |
//! |---|---|---|---|
//! | `Spin`  | busy-check the monotonic clock | highest | one full core |
//! | `Sleep` | chunked `thread::sleep`        | coarse  | yields |
//! | `Park`  | `thread::park_timeout`         | platform-dependent | yields |
//!
//! All three observe the shared interrupt flag; `pause()` returns `false`
//! when the wait was interrupted (shutdown) rather than completing normally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;

/// Upper bound on a single `Sleep`-strategy nap, so the interrupt flag is
/// observed promptly even for long periods.
const SLEEP_SLICE: Duration = Duration::from_millis(1);

// ── WaitStrategy ──────────────────────────────────────────────────────────────

/// How [`Metronome::pause`] spends the time until the next tick boundary.
///
/// Fixed at executor construction time; the YAML configuration names the
/// variants in lowercase (`spin` / `sleep` / `park`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WaitStrategy {
    /// Busy-check a monotonic clock.  Highest accuracy, burns a core.
    Spin,
    /// Repeated short sleeps.  Coarser boundaries, yields the CPU.
    #[default]
    Sleep,
    /// `thread::park_timeout`.  Granularity is platform-dependent; `unpark`
    /// doubles as the wake-up for shutdown.
    Park,
}

// ── Metronome ─────────────────────────────────────────────────────────────────

/// Blocks a thread at a fixed cadence without accumulating drift.
///
/// Owned by the executor thread; the `interrupt` flag is shared with whoever
/// performs shutdown.
pub struct Metronome {
    period: Duration,
    strategy: WaitStrategy,
    deadline: Instant,
    interrupt: Arc<AtomicBool>,
}

impl Metronome {
    /// Create a metronome whose first boundary is one `period` from now.
    pub fn new(period: Duration, strategy: WaitStrategy, interrupt: Arc<AtomicBool>) -> Self {
        Self {
            period,
            strategy,
            deadline: Instant::now() + period,
            interrupt,
        }
    }

    /// The configured tick period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Block until the next tick boundary.
    ///
    /// Returns `true` when the wait completed normally, `false` when it was
    /// interrupted via the shared flag.  Either way the next deadline has
    /// already been advanced by exactly one period, so a late or interrupted
    /// tick catches up rather than re-basing the schedule.
    pub fn pause(&mut self) -> bool {
        let target = self.deadline;
        self.deadline += self.period;

        loop {
            if self.interrupt.load(Ordering::Acquire) {
                return false;
            }
            let now = Instant::now();
            if now >= target {
                return true;
            }
            let remaining = target - now;
            match self.strategy {
                WaitStrategy::Spin => std::hint::spin_loop(),
                WaitStrategy::Sleep => thread::sleep(remaining.min(SLEEP_SLICE)),
                WaitStrategy::Park => thread::park_timeout(remaining),
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn metronome(period_ms: u64, strategy: WaitStrategy) -> (Metronome, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        (
            Metronome::new(Duration::from_millis(period_ms), strategy, flag.clone()),
            flag,
        )
    }

    #[test]
    fn all_strategies_complete_a_period() {
        for strategy in [WaitStrategy::Spin, WaitStrategy::Sleep, WaitStrategy::Park] {
            let (mut m, _flag) = metronome(5, strategy);
            let start = Instant::now();
            assert!(m.pause(), "strategy {strategy:?} should complete normally");
            assert!(
                start.elapsed() >= Duration::from_millis(4),
                "strategy {strategy:?} returned too early"
            );
        }
    }

    #[test]
    fn interrupted_pause_returns_false() {
        let (mut m, flag) = metronome(10_000, WaitStrategy::Sleep);
        flag.store(true, Ordering::Release);
        assert!(!m.pause());
    }

    #[test]
    fn deadlines_do_not_rebase_after_a_late_tick() {
        let (mut m, _flag) = metronome(10, WaitStrategy::Sleep);
        // Miss two boundaries entirely.
        thread::sleep(Duration::from_millis(35));
        // The next two pauses cover deadlines that already passed, so they
        // must return almost immediately — catching up, not re-basing.
        let start = Instant::now();
        assert!(m.pause());
        assert!(m.pause());
        assert!(
            start.elapsed() < Duration::from_millis(5),
            "missed boundaries should be caught up without waiting"
        );
    }

    #[test]
    fn average_cadence_tracks_the_period() {
        let (mut m, _flag) = metronome(10, WaitStrategy::Sleep);
        let start = Instant::now();
        for _ in 0..5 {
            assert!(m.pause());
        }
        let elapsed = start.elapsed();
        // 5 ticks at 10 ms = 50 ms.  Generous bounds: scheduling noise on a
        // loaded CI box can stretch individual sleeps.
        assert!(elapsed >= Duration::from_millis(45), "ran fast: {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(250), "ran slow: {elapsed:?}");
    }

    #[test]
    fn period_accessor_reports_configuration() {
        let (m, _flag) = metronome(20, WaitStrategy::Park);
        assert_eq!(m.period(), Duration::from_millis(20));
    }

    #[test]
    fn wait_strategy_parses_lowercase_names() {
        let s: WaitStrategy = serde_yaml::from_str("spin").unwrap();
        assert_eq!(s, WaitStrategy::Spin);
        let s: WaitStrategy = serde_yaml::from_str("park").unwrap();
        assert_eq!(s, WaitStrategy::Park);
        assert!(serde_yaml::from_str::<WaitStrategy>("busy").is_err());
    }
}
