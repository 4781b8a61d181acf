//! Toolchain discovery and the concrete recipe dispatcher.
//!
//! The core schedules abstract recipes; this module turns them into real
//! tool invocations. Discovery probes PATH for clang++ or g++ (honoring an
//! explicit preference or `CXX`); [`ToolDispatcher`] implements the
//! [`Dispatch`](crate::recipe::Dispatch) contract by matching on the recipe
//! kind and handing argv to the executor.

pub mod types;

pub use types::{CompilerType, Toolchain, ToolchainError};

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};

use crate::executor::Executor;
use crate::model::{Registry, Target, TargetId};
use crate::output;
use crate::recipe::{Dispatch, Recipe, object_files};

/// Detect the best available toolchain.
///
/// Preference order: the explicit `preferred` command, the `CXX`
/// environment variable, clang++, g++.
pub fn detect_toolchain(preferred: Option<&str>) -> Result<Toolchain, ToolchainError> {
    let mut candidates: Vec<String> = Vec::new();
    if let Some(name) = preferred {
        candidates.push(name.to_string());
    }
    if let Ok(cxx) = std::env::var("CXX")
        && !cxx.is_empty()
    {
        candidates.push(cxx);
    }
    candidates.push("clang++".to_string());
    candidates.push("g++".to_string());

    for candidate in candidates {
        if let Ok(output) = Command::new("which").arg(&candidate).output()
            && output.status.success()
        {
            let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let cxx_path = PathBuf::from(&path_str);

            let version = Command::new(&candidate)
                .arg("--version")
                .output()
                .map(|o| {
                    String::from_utf8_lossy(&o.stdout)
                        .lines()
                        .next()
                        .unwrap_or("unknown")
                        .to_string()
                })
                .unwrap_or_else(|_| "unknown".to_string());

            let compiler_type = if candidate.contains("clang") || version.contains("clang") {
                CompilerType::Clang
            } else {
                CompilerType::Gcc
            };
            return Ok(Toolchain::new(compiler_type, cxx_path, version));
        }
    }

    Err(ToolchainError::NotFound(
        "No C++ compiler found. Please install clang or gcc.".to_string(),
    ))
}

/// `src/main.cpp` -> `obj/main.o`
pub fn object_name(source: &str) -> String {
    let stem = Path::new(source)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string());
    format!("obj/{stem}.o")
}

/// `obj/main.o` -> `obj/main.d`
pub fn dependency_name(object: &str) -> String {
    object
        .strip_suffix(".o")
        .map(|base| format!("{base}.d"))
        .unwrap_or_else(|| format!("{object}.d"))
}

pub fn library_filename(name: &str) -> String {
    format!("lib{name}.so")
}

pub fn archive_filename(name: &str) -> String {
    format!("lib{name}.a")
}

/// The real recipe dispatcher: toolchain command construction plus direct
/// file operations for install/clean, all routed through the executor so
/// dry-run and output formatting apply uniformly.
pub struct ToolDispatcher {
    toolchain: Toolchain,
    executor: Executor,
}

impl ToolDispatcher {
    pub fn new(toolchain: Toolchain, executor: Executor) -> Self {
        Self {
            toolchain,
            executor,
        }
    }

    fn filename(&self, registry: &Registry, id: TargetId) -> Result<PathBuf> {
        registry
            .target(id)
            .filename()
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("target {} has no file", registry.target(id).name()))
    }

    fn run_recipe(&self, registry: &Registry, target: &Target, recipe: &Recipe) -> Result<()> {
        let directory = target
            .script()
            .and_then(Path::parent)
            .map(Path::to_path_buf);
        let directory = directory.as_deref();

        match recipe {
            Recipe::Generate(args) => {
                let source = self.filename(registry, args.source)?;
                if !dependency_file_is_stale(&source, &args.dependency_file) {
                    return Ok(());
                }
                prepare_parent(&args.dependency_file, self.executor.dry_run)?;
                let cmd = self.toolchain.dependency_command(
                    &source,
                    &args.dependency_file,
                    &args.include_paths,
                );
                self.executor.run(
                    &cmd,
                    directory,
                    &[],
                    &output::action("dependency", &source.display().to_string()),
                )
            }
            Recipe::Compile(args) => {
                let source = self.filename(registry, args.source)?;
                let object = self.filename(registry, args.object)?;
                prepare_parent(&object, self.executor.dry_run)?;
                let cmd = self.toolchain.compile_command(
                    &source,
                    &object,
                    &args.include_paths,
                    &args.directives,
                );
                self.executor.run(
                    &cmd,
                    directory,
                    &[],
                    &output::action("compile", &source.display().to_string()),
                )
            }
            Recipe::LinkLibrary(args) => {
                let destination = self.filename(registry, args.destination)?;
                prepare_parent(&destination, self.executor.dry_run)?;
                let cmd = self.toolchain.link_library_command(
                    &destination,
                    &object_files(registry, &args.objects),
                    &args.library_paths,
                    &args.libraries,
                );
                self.executor.run(
                    &cmd,
                    directory,
                    &[],
                    &output::action("link", &destination.display().to_string()),
                )
            }
            Recipe::LinkArchive(args) => {
                let destination = self.filename(registry, args.destination)?;
                prepare_parent(&destination, self.executor.dry_run)?;
                let cmd = self
                    .toolchain
                    .link_archive_command(&destination, &object_files(registry, &args.objects));
                self.executor.run(
                    &cmd,
                    directory,
                    &[],
                    &output::action("archive", &destination.display().to_string()),
                )
            }
            Recipe::LinkExecutable(args) => {
                let destination = self.filename(registry, args.destination)?;
                prepare_parent(&destination, self.executor.dry_run)?;
                let cmd = self.toolchain.link_executable_command(
                    &destination,
                    &object_files(registry, &args.objects),
                    &args.library_paths,
                    &args.libraries,
                );
                self.executor.run(
                    &cmd,
                    directory,
                    &[],
                    &output::action("link", &destination.display().to_string()),
                )
            }
            Recipe::Install(args) => self.executor.copy(&args.source, &args.destination),
            Recipe::Clean(args) => {
                for file in &args.files {
                    self.executor.remove(file)?;
                }
                Ok(())
            }
            Recipe::Test(args) => {
                let executable = self.filename(registry, args.executable)?;
                let library_path = std::env::join_paths(
                    std::iter::once(PathBuf::from("./bin")).chain(args.library_paths.clone()),
                )
                .context("invalid library path")?;
                let env = vec![(
                    "LD_LIBRARY_PATH".to_string(),
                    library_path.to_string_lossy().into_owned(),
                )];
                let cmd = vec![executable.to_string_lossy().into_owned()];
                self.executor.run(
                    &cmd,
                    directory,
                    &env,
                    &output::action("unittest", &executable.display().to_string()),
                )
            }
        }
    }
}

impl Dispatch for ToolDispatcher {
    fn dispatch(&self, registry: &Registry, target: &Target) -> Result<()> {
        for recipe in target.recipes() {
            self.run_recipe(registry, target, recipe)?;
        }
        Ok(())
    }
}

/// Regenerate when the dependency file is missing or older than its source.
fn dependency_file_is_stale(source: &Path, dependency_file: &Path) -> bool {
    let Ok(dep_meta) = fs::metadata(dependency_file) else {
        return true;
    };
    match (
        fs::metadata(source).and_then(|m| m.modified()),
        dep_meta.modified(),
    ) {
        (Ok(source_time), Ok(dep_time)) => source_time > dep_time,
        _ => true,
    }
}

fn prepare_parent(file: &Path, dry_run: bool) -> Result<()> {
    if dry_run {
        return Ok(());
    }
    if let Some(parent) = file.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

/// Export a `compile_commands.json` for every compile recipe in the graph.
pub fn write_compile_commands(
    registry: &Registry,
    toolchain: &Toolchain,
    destination: &Path,
) -> Result<()> {
    let mut entries = Vec::new();
    for id in registry.ids() {
        let target = registry.target(id);
        for recipe in target.recipes() {
            if let Recipe::Compile(args) = recipe {
                let Some(source) = registry.target(args.source).filename() else {
                    continue;
                };
                let Some(object) = registry.target(args.object).filename() else {
                    continue;
                };
                let directory = target
                    .script()
                    .and_then(Path::parent)
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| ".".to_string());
                let cmd =
                    toolchain.compile_command(source, object, &args.include_paths, &args.directives);
                entries.push(serde_json::json!({
                    "directory": directory,
                    "command": cmd.join(" "),
                    "file": source.display().to_string(),
                }));
            }
        }
    }

    let json = serde_json::to_string_pretty(&entries)?;
    fs::write(destination, json)
        .with_context(|| format!("Failed to write {}", destination.display()))?;
    Ok(())
}
