//! Action list construction: from an analyzed graph to ordered levels.
//!
//! Two phases. Expand walks the graph depth-first, bucketing actionable
//! targets by their distance from the root and collecting actionable leaves
//! into one final, deepest bucket. Normalize then walks the buckets deepest
//! first, keeping each target only in the deepest bucket that discovered it.
//! The result: every actionable target appears exactly once, and a
//! dependency's level always comes before any dependent's level.

use std::collections::HashSet;

use crate::model::{Registry, TargetId};

/// Ordered sequence of execution levels. All targets within a level may run
/// concurrently; level `i` completes before level `i + 1` starts.
#[derive(Debug, Default)]
pub struct ActionPlan {
    levels: Vec<Vec<TargetId>>,
}

impl ActionPlan {
    pub fn levels(&self) -> &[Vec<TargetId>] {
        &self.levels
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn total_actions(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }
}

/// Build the action plan for the graph rooted at `target`. Assumes
/// `analyze` already ran, so `execute` flags are final and the graph is
/// known to be acyclic.
pub fn build_action_list(registry: &Registry, target: TargetId) -> ActionPlan {
    ActionPlan {
        levels: normalize(expand(registry, target)),
    }
}

fn actionable(registry: &Registry, id: TargetId) -> bool {
    let target = registry.target(id);
    target.execute() && target.has_recipes()
}

/// Does any target below `id` carry actionable work?
fn dependencies_have_work(registry: &Registry, id: TargetId) -> bool {
    let mut stack: Vec<TargetId> = registry.target(id).dependencies().to_vec();
    let mut seen: HashSet<TargetId> = HashSet::new();
    while let Some(next) = stack.pop() {
        if !seen.insert(next) {
            continue;
        }
        if actionable(registry, next) {
            return true;
        }
        stack.extend_from_slice(registry.target(next).dependencies());
    }
    false
}

fn expand(registry: &Registry, root: TargetId) -> Vec<Vec<TargetId>> {
    let mut buckets: Vec<Vec<TargetId>> = Vec::new();
    let mut leaves: Vec<TargetId> = Vec::new();
    let mut stack: Vec<(usize, TargetId)> = vec![(0, root)];

    while let Some((depth, id)) = stack.pop() {
        while buckets.len() <= depth {
            buckets.push(Vec::new());
        }

        if dependencies_have_work(registry, id) {
            if actionable(registry, id) {
                buckets[depth].push(id);
            }
            for &dependency in registry.target(id).dependencies() {
                stack.push((depth + 1, dependency));
            }
        } else if actionable(registry, id) {
            // nothing actionable below it: schedule with the other leaves
            leaves.push(id);
        }
    }

    let mut seen = HashSet::new();
    leaves.retain(|&id| seen.insert(id));
    buckets.push(leaves);
    buckets
}

fn normalize(buckets: Vec<Vec<TargetId>>) -> Vec<Vec<TargetId>> {
    let mut retained: HashSet<TargetId> = HashSet::new();
    let mut levels = Vec::new();

    for bucket in buckets.into_iter().rev() {
        let mut level: Vec<TargetId> = Vec::new();
        for id in bucket {
            if retained.insert(id) {
                level.push(id);
            }
        }
        if !level.is_empty() {
            levels.push(level);
        }
    }
    levels
}
