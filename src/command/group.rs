/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Command composition — the immutable node tree and its fluent builder.
//!
//! A composed command is a tree of [`CommandNode`]s frozen before submission:
//!
//! * `Leaf` — one user [`Command`];
//! * `Sequential` — children run one after another;
//! * `Parallel` — children run interleaved until every one has finished;
//! * `Fork` — the child is handed to the scheduler as an independent run and
//!   the fork point counts as complete immediately.
//!
//! [`GroupBuilder`] gives the readable top-to-bottom authoring form: each
//! combinator appends steps to a flat top-level sequence, and `build()`
//! freezes and validates the tree.  There is no shared mutable "current
//! root" — every call owns the builder and returns it.

use thiserror::Error;

use super::{Command, RequirementId};

// ── CommandNode ───────────────────────────────────────────────────────────────

/// One node of a frozen command composition tree.
pub enum CommandNode {
    /// A single user command.
    Leaf(Box<dyn Command>),
    /// Children run in order; each child starts on the tick after its
    /// predecessor finished.
    Sequential(Vec<CommandNode>),
    /// Children run interleaved within each tick until all have finished.
    Parallel(Vec<CommandNode>),
    /// The child is submitted to the scheduler as an independent run; the
    /// enclosing composition proceeds as if this node finished immediately.
    Fork(Box<CommandNode>),
}

impl CommandNode {
    /// Wrap a command as a leaf node.
    pub fn leaf(command: impl Command + 'static) -> Self {
        CommandNode::Leaf(Box::new(command))
    }

    /// Name used in logs and listener notifications for this node.
    pub fn label(&self) -> &str {
        match self {
            CommandNode::Leaf(cmd) => cmd.name(),
            CommandNode::Sequential(_) => "sequential",
            CommandNode::Parallel(_) => "parallel",
            CommandNode::Fork(_) => "fork",
        }
    }

    /// Reject structurally invalid trees before any state is touched.
    ///
    /// # Errors
    /// [`GroupError::EmptyStep`] if any sequential or parallel node has no
    /// children.
    pub fn validate(&self) -> Result<(), GroupError> {
        match self {
            CommandNode::Leaf(_) => Ok(()),
            CommandNode::Sequential(children) => {
                if children.is_empty() {
                    return Err(GroupError::EmptyStep { mode: "sequential" });
                }
                children.iter().try_for_each(CommandNode::validate)
            }
            CommandNode::Parallel(children) => {
                if children.is_empty() {
                    return Err(GroupError::EmptyStep { mode: "parallel" });
                }
                children.iter().try_for_each(CommandNode::validate)
            }
            CommandNode::Fork(child) => child.validate(),
        }
    }

    /// Union of the resource requirements over every leaf of this tree.
    ///
    /// Fork subtrees are excluded: a forked child is an independent run and
    /// claims its own resources when the scheduler admits it.
    pub fn requirements(&self) -> Vec<RequirementId> {
        let mut out = Vec::new();
        self.collect_requirements(&mut out);
        out
    }

    fn collect_requirements(&self, out: &mut Vec<RequirementId>) {
        match self {
            CommandNode::Leaf(cmd) => {
                for req in cmd.requirements() {
                    if !out.contains(&req) {
                        out.push(req);
                    }
                }
            }
            CommandNode::Sequential(children) | CommandNode::Parallel(children) => {
                for child in children {
                    child.collect_requirements(out);
                }
            }
            CommandNode::Fork(_) => {}
        }
    }
}

impl<C: Command + 'static> From<C> for CommandNode {
    fn from(command: C) -> Self {
        CommandNode::leaf(command)
    }
}

impl std::fmt::Debug for CommandNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandNode::Leaf(cmd) => write!(f, "Leaf({})", cmd.name()),
            CommandNode::Sequential(c) => write!(f, "Sequential({c:?})"),
            CommandNode::Parallel(c) => write!(f, "Parallel({c:?})"),
            CommandNode::Fork(c) => write!(f, "Fork({c:?})"),
        }
    }
}

// ── GroupError ────────────────────────────────────────────────────────────────

/// Structural rejection of a command group, raised synchronously at build or
/// submission time with no partial state change.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupError {
    /// `build()` was called on a builder with no steps at all.
    #[error("command group has no steps")]
    EmptyGroup,

    /// A sequential or parallel node has an empty child list.
    #[error("{mode} step has no children")]
    EmptyStep { mode: &'static str },
}

// ── GroupBuilder ──────────────────────────────────────────────────────────────

/// Fluent builder for command compositions.
///
/// ```
/// # use cadenza::command::Command;
/// # use cadenza::command::group::GroupBuilder;
/// # struct Step;
/// # impl Command for Step { fn execute(&mut self) -> bool { true } }
/// let routine = GroupBuilder::new()
///     .sequentially(vec![Step.into(), Step.into()])
///     .fork(Step)
///     .simultaneously(vec![Step.into(), Step.into()])
///     .build()
///     .unwrap();
/// ```
///
/// The chain reads top to bottom as the routine runs: the two leading steps,
/// then the forked command detaches, then the parallel pair joins.
#[derive(Default)]
pub struct GroupBuilder {
    steps: Vec<CommandNode>,
}

impl GroupBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the given nodes as consecutive steps of the top-level sequence.
    pub fn sequentially(mut self, children: Vec<CommandNode>) -> Self {
        self.steps.extend(children);
        self
    }

    /// Append one step that runs all of `children` interleaved and completes
    /// when every one has finished.
    pub fn simultaneously(mut self, children: Vec<CommandNode>) -> Self {
        self.steps.push(CommandNode::Parallel(children));
        self
    }

    /// Append one step that detaches `child` into an independent scheduler
    /// run and completes immediately.
    pub fn fork(mut self, child: impl Into<CommandNode>) -> Self {
        self.steps.push(CommandNode::Fork(Box::new(child.into())));
        self
    }

    /// Freeze the composition into an immutable tree.
    ///
    /// # Errors
    /// [`GroupError::EmptyGroup`] if no steps were added;
    /// [`GroupError::EmptyStep`] if any nested node has no children.
    pub fn build(mut self) -> Result<CommandNode, GroupError> {
        if self.steps.is_empty() {
            return Err(GroupError::EmptyGroup);
        }
        let node = if self.steps.len() == 1 {
            self.steps.remove(0)
        } else {
            CommandNode::Sequential(self.steps)
        };
        node.validate()?;
        Ok(node)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Requirable;
    use std::sync::Arc;

    struct Named(&'static str, Vec<RequirementId>);

    impl Command for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn execute(&mut self) -> bool {
            true
        }
        fn requirements(&self) -> Vec<RequirementId> {
            self.1.clone()
        }
    }

    fn cmd(name: &'static str) -> Named {
        Named(name, Vec::new())
    }

    struct Motor;
    impl Requirable for Motor {}

    #[test]
    fn chained_combinators_build_a_flat_top_level_sequence() {
        let node = GroupBuilder::new()
            .sequentially(vec![cmd("a").into(), cmd("b").into()])
            .fork(cmd("c"))
            .simultaneously(vec![cmd("d").into(), cmd("e").into()])
            .build()
            .unwrap();

        match node {
            CommandNode::Sequential(steps) => {
                assert_eq!(steps.len(), 4);
                assert!(matches!(steps[0], CommandNode::Leaf(_)));
                assert!(matches!(steps[1], CommandNode::Leaf(_)));
                assert!(matches!(steps[2], CommandNode::Fork(_)));
                assert!(matches!(steps[3], CommandNode::Parallel(_)));
            }
            other => panic!("expected top-level sequence, got {other:?}"),
        }
    }

    #[test]
    fn single_step_builds_without_a_sequence_wrapper() {
        let node = GroupBuilder::new()
            .simultaneously(vec![cmd("a").into(), cmd("b").into()])
            .build()
            .unwrap();
        assert!(matches!(node, CommandNode::Parallel(_)));
    }

    #[test]
    fn empty_builder_is_rejected() {
        assert_eq!(GroupBuilder::new().build().unwrap_err(), GroupError::EmptyGroup);
    }

    #[test]
    fn empty_parallel_step_is_rejected() {
        let err = GroupBuilder::new()
            .sequentially(vec![cmd("a").into()])
            .simultaneously(vec![])
            .build()
            .unwrap_err();
        assert_eq!(err, GroupError::EmptyStep { mode: "parallel" });
    }

    #[test]
    fn nested_groups_are_validated_recursively() {
        let inner = CommandNode::Sequential(vec![]);
        let err = GroupBuilder::new()
            .sequentially(vec![cmd("a").into(), inner])
            .build()
            .unwrap_err();
        assert_eq!(err, GroupError::EmptyStep { mode: "sequential" });
    }

    #[test]
    fn requirements_union_over_leaves_without_duplicates() {
        let motor: Arc<Motor> = Arc::new(Motor);
        let id = RequirementId::of(&motor);

        let node = GroupBuilder::new()
            .sequentially(vec![
                Named("a", vec![id]).into(),
                Named("b", vec![id]).into(),
            ])
            .build()
            .unwrap();
        assert_eq!(node.requirements(), vec![id]);
    }

    #[test]
    fn fork_subtree_requirements_are_not_claimed_by_the_parent() {
        let motor: Arc<Motor> = Arc::new(Motor);
        let id = RequirementId::of(&motor);

        let node = GroupBuilder::new()
            .fork(Named("forked", vec![id]))
            .sequentially(vec![cmd("after").into()])
            .build()
            .unwrap();
        assert!(node.requirements().is_empty());
    }

    #[test]
    fn labels_name_leaves_and_modes() {
        assert_eq!(CommandNode::leaf(cmd("turn")).label(), "turn");
        assert_eq!(CommandNode::Parallel(vec![]).label(), "parallel");
        assert_eq!(
            CommandNode::Fork(Box::new(cmd("x").into())).label(),
            "fork"
        );
    }
}
