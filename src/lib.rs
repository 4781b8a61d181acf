//! # camake - Casual Build Orchestration
//!
//! camake (binary `cmk`) is a build orchestrator for C/C++ projects whose
//! structure is described by thin imperative Rhai scripts instead of a
//! declarative makefile dialect.
//!
//! ## How a build runs
//!
//! 1. The top-level `makefile.rhai` (and any scripts it pulls in with
//!    `build(...)`) executes; every DSL call registers targets, dependency
//!    edges and recipes in the [`model::Registry`].
//! 2. [`analyze`] walks the graph from the requested target and marks every
//!    target whose build step must run, by file timestamps.
//! 3. [`plan`] flattens the marked graph into ordered levels where every
//!    dependency's level precedes its dependents'.
//! 4. [`schedule`] executes the levels on a worker-thread pool, handing each
//!    target to the [`toolchain`] dispatcher.
//!
//! ## Module Organization
//!
//! - [`model`] - Target registry and build-graph model
//! - [`script`] - The Rhai build-description DSL
//! - [`analyze`] - Staleness analysis
//! - [`plan`] - Action list construction
//! - [`schedule`] - Worker-pool execution
//! - [`toolchain`] - Compiler detection and recipe dispatch

/// Staleness analysis over the dependency graph.
pub mod analyze;

/// Process and file-operation execution with dry-run support.
pub mod executor;

/// Target registry and build-graph model.
pub mod model;

/// Terminal output: colored action lines, errors, progress.
pub mod output;

/// Action list construction from an analyzed graph.
pub mod plan;

/// Recipe model and the dispatch seam towards the toolchain.
pub mod recipe;

/// Level-by-level execution on a worker-thread pool.
pub mod schedule;

/// The build-description DSL, hosted on a Rhai engine.
pub mod script;

/// Invocation settings (`camake.toml` plus command line).
pub mod settings;

/// Toolchain detection and the concrete recipe dispatcher.
pub mod toolchain;
