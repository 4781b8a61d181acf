//! Recipe model and the dispatch seam towards the toolchain backend.
//!
//! A recipe is one build-step invocation attached to a target: a closed set
//! of step kinds, each carrying a small argument record of target ids and
//! resolved paths. The scheduler never interprets what a step does; it hands
//! the owning target to a [`Dispatch`] implementation and only observes
//! success or failure.

use std::path::PathBuf;

use anyhow::Result;

use crate::model::{Registry, Target, TargetId};

/// One build-step invocation. Recipes execute in registration order when
/// their target is dispatched.
#[derive(Debug, Clone)]
pub enum Recipe {
    /// Regenerate the header dependency file for a source file.
    Generate(GenerateArgs),
    /// Compile one source file to an object file.
    Compile(CompileArgs),
    /// Link objects into a shared library.
    LinkLibrary(LinkArgs),
    /// Link objects into a static archive.
    LinkArchive(ArchiveArgs),
    /// Link objects into an executable.
    LinkExecutable(LinkArgs),
    /// Copy an artifact into an install destination.
    Install(InstallArgs),
    /// Remove build artifacts.
    Clean(CleanArgs),
    /// Run a linked test executable.
    Test(TestArgs),
}

impl Recipe {
    pub fn kind(&self) -> &'static str {
        match self {
            Recipe::Generate(_) => "dependency",
            Recipe::Compile(_) => "compile",
            Recipe::LinkLibrary(_) => "link-library",
            Recipe::LinkArchive(_) => "link-archive",
            Recipe::LinkExecutable(_) => "link-executable",
            Recipe::Install(_) => "install",
            Recipe::Clean(_) => "clean",
            Recipe::Test(_) => "test",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerateArgs {
    pub source: TargetId,
    pub dependency_file: PathBuf,
    pub include_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CompileArgs {
    pub source: TargetId,
    pub object: TargetId,
    pub include_paths: Vec<PathBuf>,
    pub directives: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LinkArgs {
    pub destination: TargetId,
    pub objects: Vec<TargetId>,
    pub libraries: Vec<String>,
    pub library_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ArchiveArgs {
    pub destination: TargetId,
    pub objects: Vec<TargetId>,
}

#[derive(Debug, Clone)]
pub struct InstallArgs {
    pub source: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CleanArgs {
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct TestArgs {
    pub executable: TargetId,
    pub library_paths: Vec<PathBuf>,
}

/// Recipe dispatcher contract.
///
/// Implementations run every recipe of `target` in registration order,
/// signalling failure by returning an error. `Sync` because dispatch happens
/// from worker threads; the registry is read-only during execution.
pub trait Dispatch: Sync {
    fn dispatch(&self, registry: &Registry, target: &Target) -> Result<()>;
}

/// Resolve a list of object-target ids to their artifact paths.
pub fn object_files(registry: &Registry, objects: &[TargetId]) -> Vec<PathBuf> {
    objects
        .iter()
        .filter_map(|&id| registry.target(id).filename().map(PathBuf::from))
        .collect()
}
