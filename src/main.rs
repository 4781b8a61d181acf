//! # cmk CLI Entry Point
//!
//! Parses the command line, evaluates the build scripts, analyzes the graph
//! and hands the action plan to the scheduler. Every failure funnels through
//! one exit path so the process code is reliable for CI callers.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::{Shell, generate};

use camake::analyze::analyze;
use camake::executor::Executor;
use camake::model::ModelError;
use camake::output;
use camake::plan::build_action_list;
use camake::schedule::{self, ExecuteOptions};
use camake::script::ScriptHost;
use camake::settings::{self, Settings};
use camake::toolchain::{ToolDispatcher, detect_toolchain, write_compile_commands};

#[derive(Parser)]
#[command(name = "cmk")]
#[command(about = "Build orchestrator for script-described C/C++ projects", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Target to build
    #[arg(default_value = "link")]
    target: String,

    /// Top-level build-description file
    #[arg(long = "file", default_value = "makefile.rhai")]
    file: PathBuf,

    /// Rebuild everything regardless of timestamps
    #[arg(short, long)]
    force: bool,

    /// Run everything in one thread, in deterministic order
    #[arg(short, long)]
    serial: bool,

    /// Worker pool size [default: one per processor]
    #[arg(short, long, default_value_t = 0)]
    jobs: usize,

    /// Keep going after failures
    #[arg(short, long)]
    ignore_errors: bool,

    /// Echo commands without executing anything
    #[arg(long)]
    dry_run: bool,

    /// Echo full command lines instead of one-line summaries
    #[arg(short, long)]
    raw_format: bool,

    /// Disable colored output
    #[arg(long)]
    no_colors: bool,

    /// Suppress per-action echo lines
    #[arg(short, long)]
    quiet: bool,

    /// Report scripts and the action plan alongside failures
    #[arg(short, long)]
    verbose: bool,

    /// Show a progress bar while executing
    #[arg(long)]
    statistics: bool,

    /// Preferred compiler command (e.g. g++, clang++)
    #[arg(short, long)]
    compiler: Option<String>,

    /// Write compile_commands.json to this path after graph construction
    #[arg(long, value_name = "PATH")]
    compile_commands: Option<PathBuf>,

    /// Generate shell completion scripts
    #[arg(long, value_name = "SHELL")]
    completions: Option<Shell>,
}

fn main() {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut command = Cli::command();
        let name = command.get_name().to_string();
        generate(shell, &mut command, name, &mut std::io::stdout());
        return;
    }

    if let Err(error) = run(cli) {
        output::error(&format!("{error:#}"));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings {
        target: cli.target,
        script: cli.file,
        force: cli.force,
        serial: cli.serial,
        jobs: cli.jobs,
        ignore_errors: cli.ignore_errors,
        dry_run: cli.dry_run,
        raw_format: cli.raw_format,
        no_colors: cli.no_colors,
        quiet: cli.quiet,
        verbose: cli.verbose,
        statistics: cli.statistics,
        compiler: cli.compiler,
        compile_commands: cli.compile_commands,
    };

    let project_dir = settings
        .script
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    if let Some(config) = settings::load_file_config(&project_dir)? {
        settings.apply_file_config(config);
    }
    output::init(settings.no_colors);

    if !settings.quiet {
        output::status(&format!("building model: {}", settings.script.display()));
    }
    let host = ScriptHost::new()?;
    host.run_file(&settings.script)?;
    let mut registry = host.finish()?;

    let root = registry
        .get(&settings.target, None, None)
        .ok_or_else(|| ModelError::UnknownTarget(settings.target.clone()))?;
    analyze(&mut registry, root, settings.force)?;
    let plan = build_action_list(&registry, root);

    let toolchain = detect_toolchain(settings.compiler.as_deref())?;
    if let Some(path) = &settings.compile_commands {
        write_compile_commands(&registry, &toolchain, path)?;
    }
    if settings.verbose {
        output::print_plan(&registry, &plan);
    }
    if plan.is_empty() {
        if !settings.quiet {
            output::status(&format!("nothing to do for {}", settings.target));
        }
        return Ok(());
    }

    let executor = Executor {
        dry_run: settings.dry_run,
        quiet: settings.quiet,
        raw_format: settings.raw_format,
    };
    let dispatcher = ToolDispatcher::new(toolchain, executor);
    let options = ExecuteOptions {
        serial: settings.serial,
        jobs: settings.jobs,
        ignore_errors: settings.ignore_errors,
        verbose: settings.verbose,
        statistics: settings.statistics,
        ..Default::default()
    };
    schedule::execute(&registry, &plan, &dispatcher, &options)
}
