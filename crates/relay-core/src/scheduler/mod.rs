//! Dependency Scheduler
//!
//! Groups subtasks into execution levels. Every subtask in a level has all
//! of its dependencies in strictly earlier levels, so a level can run fully
//! in parallel. Dependencies on ids outside the batch count as satisfied.
//!
//! Cyclic input is not an error: when a round makes no progress, every
//! remaining subtask is placed in one final level and [`LevelPlan::forced`]
//! names them.

mod driver;

pub use driver::{BatchExecutor, BatchReport, DispatchRoute, FailureKind, SubtaskOutcome};

use crate::types::Subtask;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Subtasks that may run concurrently
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLevel {
    /// Zero-based position in the plan
    pub index: usize,
    /// Subtasks in input order
    pub subtasks: Vec<Subtask>,
}

impl ExecutionLevel {
    /// Ids of the subtasks in this level
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.subtasks.iter().map(|s| s.id.as_str()).collect()
    }

    /// Number of subtasks
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.subtasks.len()
    }

    /// Check if level is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subtasks.is_empty()
    }
}

/// Levels plus a report of any forced grouping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelPlan {
    /// Levels in execution order
    pub levels: Vec<ExecutionLevel>,
    /// Ids placed in the final level without their dependencies being met
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced: Option<Vec<String>>,
}

impl LevelPlan {
    /// Whether the final level was forced
    #[inline]
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        self.forced.is_some()
    }

    /// Ids per level
    #[must_use]
    pub fn id_levels(&self) -> Vec<Vec<&str>> {
        self.levels.iter().map(ExecutionLevel::ids).collect()
    }
}

/// Group subtasks into execution levels
#[must_use]
pub fn group(subtasks: &[Subtask]) -> Vec<ExecutionLevel> {
    group_with_report(subtasks).levels
}

/// Group subtasks into execution levels and report forced grouping
#[must_use]
pub fn group_with_report(subtasks: &[Subtask]) -> LevelPlan {
    let known: HashSet<&str> = subtasks.iter().map(|s| s.id.as_str()).collect();
    let mut assigned: HashSet<&str> = HashSet::with_capacity(subtasks.len());
    let mut placed = vec![false; subtasks.len()];
    let mut remaining = subtasks.len();
    let mut plan = LevelPlan::default();

    for _ in 0..subtasks.len() {
        if remaining == 0 {
            break;
        }

        let ready: Vec<usize> = subtasks
            .iter()
            .enumerate()
            .filter(|(i, _)| !placed[*i])
            .filter(|(_, task)| {
                task.dependencies
                    .iter()
                    .all(|dep| assigned.contains(dep.as_str()) || !known.contains(dep.as_str()))
            })
            .map(|(i, _)| i)
            .collect();

        if ready.is_empty() {
            let stuck: Vec<usize> = (0..subtasks.len()).filter(|i| !placed[*i]).collect();
            let ids: Vec<String> = stuck.iter().map(|i| subtasks[*i].id.clone()).collect();
            warn!(
                subtasks = ?ids,
                "Circular dependencies detected, forcing remaining subtasks into one level"
            );
            push_level(&mut plan, subtasks, &stuck, &mut placed, &mut assigned);
            plan.forced = Some(ids);
            break;
        }

        remaining -= ready.len();
        push_level(&mut plan, subtasks, &ready, &mut placed, &mut assigned);
    }

    plan
}

fn push_level<'a>(
    plan: &mut LevelPlan,
    subtasks: &'a [Subtask],
    members: &[usize],
    placed: &mut [bool],
    assigned: &mut HashSet<&'a str>,
) {
    for &i in members {
        placed[i] = true;
        assigned.insert(subtasks[i].id.as_str());
    }
    plan.levels.push(ExecutionLevel {
        index: plan.levels.len(),
        subtasks: members.iter().map(|&i| subtasks[i].clone()).collect(),
    });
}
