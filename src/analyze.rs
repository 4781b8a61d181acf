//! Incremental staleness analysis over the dependency graph.
//!
//! `analyze` decides, per target, whether its build step must run. Results
//! are memoized by target id for the lifetime of the invocation; diamond
//! dependencies would otherwise cause exponential re-evaluation. A gray
//! back-edge during the walk is a structural error, not a crash.

use crate::model::{ModelError, Registry, TargetId};

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    White,
    Gray,
    Black,
}

/// Walk the graph rooted at `root` and mark every target whose build step
/// must run. Returns whether the root itself needs to run.
///
/// With `force_all`, every visited target that has dependencies is marked
/// regardless of timestamps.
pub fn analyze(
    registry: &mut Registry,
    root: TargetId,
    force_all: bool,
) -> Result<bool, ModelError> {
    let mut marks = vec![Mark::White; registry.len()];
    visit(registry, root, force_all, &mut marks)
}

fn visit(
    registry: &mut Registry,
    id: TargetId,
    force_all: bool,
    marks: &mut [Mark],
) -> Result<bool, ModelError> {
    if let Some(cached) = registry.cached_analysis(id) {
        return Ok(cached);
    }
    marks[id.index()] = Mark::Gray;

    let dependencies = registry.target(id).dependencies().to_vec();

    let result = if dependencies.is_empty() {
        registry.target(id).execute()
    } else {
        // visit every dependency, also for cache completeness
        let mut any_dependency_stale = false;
        for &dependency in &dependencies {
            if marks[dependency.index()] == Mark::Gray {
                return Err(ModelError::DependencyCycle(
                    registry.target(id).name().to_string(),
                    registry.target(dependency).name().to_string(),
                ));
            }
            any_dependency_stale |= visit(registry, dependency, force_all, marks)?;
        }

        if any_dependency_stale || force_all {
            registry.target_mut(id).set_execute(true);
            true
        } else if registry.target(id).filename().is_some() {
            let timestamp = registry.target(id).timestamp();
            match timestamp {
                // no timestamp means no file, the step must run
                None => {
                    registry.target_mut(id).set_execute(true);
                    true
                }
                Some(own) => {
                    let newest = registry.max_dependency_stamp(id);
                    if newest.is_some_and(|max| own < max) {
                        // a dependency file is newer
                        registry.target_mut(id).set_execute(true);
                        true
                    } else {
                        registry.target(id).execute()
                    }
                }
            }
        } else {
            // file-less target with fresh dependencies: runs only if
            // something external already flagged it
            registry.target(id).execute()
        }
    };

    marks[id.index()] = Mark::Black;
    registry.cache_analysis(id, result);
    Ok(result)
}
