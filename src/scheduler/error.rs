/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error type for command submission.
//!
//! Resource conflicts are deliberately absent here: pre-empting the current
//! holder is normal control flow in the scheduler, not a failure.  Submission
//! only fails for structurally invalid input, synchronously and with no
//! partial state change.

use thiserror::Error;

use crate::command::group::GroupError;

/// Why a submission was rejected by [`CommandScheduler::submit`].
///
/// [`CommandScheduler::submit`]: super::CommandScheduler::submit
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// The submitted composition tree is structurally invalid (empty group,
    /// empty child list).
    #[error("invalid command group: {0}")]
    InvalidGroup(#[from] GroupError),
}
