//! Target registry and build-graph model.
//!
//! Every node in the build graph is a [`Target`] owned by a [`Registry`].
//! Targets are interned: registering the same (name, filename) pair twice
//! returns the same [`TargetId`], so all dependency edges reference one
//! canonical instance. The registry is constructed fresh per invocation and
//! passed explicitly through graph construction, analysis and scheduling.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::recipe::Recipe;

/// Interned target identifier. Small, copyable, and usable as a map or
/// channel key across worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u32);

impl TargetId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Structural graph errors. These abort before any execution.
#[derive(Debug)]
pub enum ModelError {
    /// A target cannot be registered without a name.
    AnonymousTarget,
    /// The caller asked for a target that was never declared.
    UnknownTarget(String),
    /// A dependency edge closes a cycle (from -> to).
    DependencyCycle(String, String),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::AnonymousTarget => write!(f, "can't create target without a name"),
            ModelError::UnknownTarget(name) => write!(f, "{} not known", name),
            ModelError::DependencyCycle(from, to) => {
                write!(f, "dependency cycle detected: {} -> {}", from, to)
            }
        }
    }
}

impl std::error::Error for ModelError {}

/// A node in the build graph: one buildable or logical artifact.
#[derive(Debug)]
pub struct Target {
    name: String,
    filename: Option<PathBuf>,
    script: Option<PathBuf>,
    dependencies: Vec<TargetId>,
    recipes: Vec<Recipe>,
    execute: bool,
    serial: bool,
    timestamp: Option<SystemTime>,
    // write-once memo, valid because dependencies freeze before analysis
    max_dependency_stamp: Option<SystemTime>,
    max_stamp_cached: bool,
}

impl Target {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// The build-description file that declared this target, if any.
    pub fn script(&self) -> Option<&Path> {
        self.script.as_deref()
    }

    pub fn dependencies(&self) -> &[TargetId] {
        &self.dependencies
    }

    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    pub fn has_recipes(&self) -> bool {
        !self.recipes.is_empty()
    }

    /// Cached modification time of the associated file. `None` means the
    /// file is absent or the target is purely logical; it always compares
    /// as oldest.
    pub fn timestamp(&self) -> Option<SystemTime> {
        self.timestamp
    }

    pub fn execute(&self) -> bool {
        self.execute
    }

    pub fn set_execute(&mut self, execute: bool) {
        self.execute = execute;
    }

    pub fn serial(&self) -> bool {
        self.serial
    }

    pub fn set_serial(&mut self, serial: bool) {
        self.serial = serial;
    }

    pub fn add_dependency(&mut self, dependency: TargetId) {
        self.dependencies.push(dependency);
    }

    pub fn add_dependencies(&mut self, dependencies: &[TargetId]) {
        self.dependencies.extend_from_slice(dependencies);
    }

    pub fn add_recipe(&mut self, recipe: Recipe) {
        self.recipes.push(recipe);
    }

    /// Stable key used to order targets deterministically for scheduling.
    pub fn sort_key(&self) -> (String, String) {
        (
            self.name.clone(),
            self.filename
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
        )
    }
}

/// Canonical store of graph nodes, keyed by identity.
///
/// Also carries the per-run caches: the analyzer's memoized results and the
/// per-script include/library path declarations.
#[derive(Debug, Default)]
pub struct Registry {
    targets: Vec<Target>,
    identity: HashMap<(String, Option<PathBuf>), TargetId>,
    by_name: HashMap<String, Vec<TargetId>>,
    analyze_cache: HashMap<TargetId, bool>,
    include_paths: HashMap<PathBuf, Vec<PathBuf>>,
    library_paths: HashMap<PathBuf, Vec<PathBuf>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn target(&self, id: TargetId) -> &Target {
        &self.targets[id.index()]
    }

    pub fn target_mut(&mut self, id: TargetId) -> &mut Target {
        &mut self.targets[id.index()]
    }

    pub fn ids(&self) -> impl Iterator<Item = TargetId> + '_ {
        (0..self.targets.len()).map(|i| TargetId(i as u32))
    }

    /// Create and register a target, or return the existing one unchanged.
    ///
    /// A relative `filename` is resolved against the directory of the owning
    /// `script`. The `execute` flag starts out true when the target names a
    /// file that does not currently exist on disk.
    pub fn register(
        &mut self,
        name: &str,
        filename: Option<&Path>,
        script: Option<&Path>,
    ) -> Result<TargetId, ModelError> {
        if name.is_empty() {
            return Err(ModelError::AnonymousTarget);
        }

        let script = script.map(absolute);
        let filename = filename.map(|f| {
            let directory = script
                .as_deref()
                .and_then(Path::parent)
                .map(Path::to_path_buf)
                .unwrap_or_default();
            if f.is_absolute() {
                f.to_path_buf()
            } else {
                absolute(&directory.join(f))
            }
        });

        let key = (name.to_string(), filename.clone());
        if let Some(&id) = self.identity.get(&key) {
            return Ok(id);
        }

        let timestamp = filename
            .as_deref()
            .and_then(|f| fs::metadata(f).and_then(|m| m.modified()).ok());
        let execute = filename.is_some() && timestamp.is_none();

        let id = TargetId(self.targets.len() as u32);
        self.targets.push(Target {
            name: name.to_string(),
            filename,
            script,
            dependencies: Vec::new(),
            recipes: Vec::new(),
            execute,
            serial: false,
            timestamp,
            max_dependency_stamp: None,
            max_stamp_cached: false,
        });
        self.identity.insert(key, id);
        self.by_name.entry(name.to_string()).or_default().push(id);
        Ok(id)
    }

    /// Tiered target resolution.
    ///
    /// First an exact match on (name, filename), then - given candidate
    /// paths - the first target under that name whose file path contains one
    /// of them, then the first target registered under the bare name.
    /// Dependency names (library short-names in particular) are declared
    /// before their resolved location is known, hence the fallback chain.
    pub fn get(
        &self,
        name: &str,
        filename: Option<&Path>,
        candidate_paths: Option<&[PathBuf]>,
    ) -> Option<TargetId> {
        if let Some(file) = filename {
            let key = (name.to_string(), Some(file.to_path_buf()));
            if let Some(&id) = self.identity.get(&key) {
                return Some(id);
            }
        }

        let ids = self.by_name.get(name)?;
        if let Some(paths) = candidate_paths {
            for prefix in paths {
                let prefix = prefix.to_string_lossy();
                for &id in ids {
                    if let Some(file) = self.target(id).filename()
                        && file.to_string_lossy().contains(prefix.as_ref())
                    {
                        return Some(id);
                    }
                }
            }
        }

        if filename.is_none() {
            return ids.first().copied();
        }
        None
    }

    pub(crate) fn cached_analysis(&self, id: TargetId) -> Option<bool> {
        self.analyze_cache.get(&id).copied()
    }

    pub(crate) fn cache_analysis(&mut self, id: TargetId, result: bool) {
        self.analyze_cache.insert(id, result);
    }

    /// Maximum file timestamp among this target's dependencies, memoized
    /// once since the dependency list is frozen after construction.
    pub(crate) fn max_dependency_stamp(&mut self, id: TargetId) -> Option<SystemTime> {
        if self.target(id).max_stamp_cached {
            return self.target(id).max_dependency_stamp;
        }
        let value = self
            .target(id)
            .dependencies
            .iter()
            .filter_map(|&dep| self.target(dep).timestamp)
            .max();
        let target = self.target_mut(id);
        target.max_dependency_stamp = value;
        target.max_stamp_cached = true;
        value
    }

    pub fn set_include_paths(&mut self, script: &Path, paths: Vec<PathBuf>) {
        self.include_paths
            .insert(absolute(script), absolute_paths(paths, script));
    }

    pub fn include_paths(&self, script: &Path) -> Vec<PathBuf> {
        self.include_paths
            .get(&absolute(script))
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_library_paths(&mut self, script: &Path, paths: Vec<PathBuf>) {
        self.library_paths
            .insert(absolute(script), absolute_paths(paths, script));
    }

    pub fn library_paths(&self, script: &Path) -> Vec<PathBuf> {
        self.library_paths
            .get(&absolute(script))
            .cloned()
            .unwrap_or_default()
    }
}

/// Lexical absolutization; does not touch the filesystem, so paths to
/// not-yet-built artifacts normalize the same way as existing ones.
pub fn absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

fn absolute_paths(paths: Vec<PathBuf>, script: &Path) -> Vec<PathBuf> {
    let directory = absolute(script)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    paths
        .into_iter()
        .map(|p| {
            if p.is_absolute() {
                p
            } else {
                absolute(&directory.join(p))
            }
        })
        .collect()
}
