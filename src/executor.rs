//! Process and file-operation execution with dry-run and echo policy.
//!
//! Every recipe effect funnels through [`Executor`]: spawning toolchain
//! commands, copying install artifacts, deleting clean targets. That keeps
//! dry-run, quiet and raw-format handling in one place instead of in every
//! dispatcher arm.

use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};

use crate::output;

#[derive(Debug, Clone, Copy, Default)]
pub struct Executor {
    /// Echo commands without executing anything.
    pub dry_run: bool,
    /// Suppress the per-action echo lines.
    pub quiet: bool,
    /// Echo full argv instead of the one-line summary.
    pub raw_format: bool,
}

impl Executor {
    fn echo(&self, command: &[String], summary: &str) {
        if self.quiet {
            return;
        }
        if self.raw_format {
            println!("{}", command.join(" "));
        } else {
            println!("{summary}");
        }
    }

    /// Spawn `command` with inherited stdio and wait for it.
    ///
    /// IO errors from the spawn propagate untouched so callers can still
    /// distinguish permission problems; a non-zero exit becomes a plain
    /// failure.
    pub fn run(
        &self,
        command: &[String],
        directory: Option<&Path>,
        env: &[(String, String)],
        summary: &str,
    ) -> Result<()> {
        let Some((program, arguments)) = command.split_first() else {
            bail!("empty command");
        };
        self.echo(command, summary);
        if self.dry_run {
            return Ok(());
        }

        let mut child = Command::new(program);
        child.args(arguments);
        if let Some(directory) = directory {
            child.current_dir(directory);
        }
        for (key, value) in env {
            child.env(key, value);
        }

        let status = child
            .status()
            .with_context(|| format!("failed to spawn {program}"))?;
        if !status.success() {
            bail!("{program} exited with {status}");
        }
        Ok(())
    }

    /// Install-style copy into a directory, skipped when the destination is
    /// already at least as new as the source.
    pub fn copy(&self, source: &Path, destination: &Path) -> Result<()> {
        let Some(file_name) = source.file_name() else {
            bail!("cannot install {}", source.display());
        };
        let target = destination.join(file_name);

        if !copy_needed(source, &target) {
            return Ok(());
        }

        let command = vec![
            "cp".to_string(),
            source.display().to_string(),
            target.display().to_string(),
        ];
        let summary = output::action(
            "copy",
            &format!("{} --> {}", source.display(), target.display()),
        );
        self.echo(&command, &summary);
        if self.dry_run {
            return Ok(());
        }

        fs::create_dir_all(destination)
            .with_context(|| format!("failed to create {}", destination.display()))?;
        fs::copy(source, &target)
            .with_context(|| format!("failed to install {}", source.display()))?;
        Ok(())
    }

    /// Delete one file if it exists.
    pub fn remove(&self, file: &Path) -> Result<()> {
        if !file.exists() {
            return Ok(());
        }
        let command = vec!["rm".to_string(), file.display().to_string()];
        self.echo(&command, &output::action("delete", &file.display().to_string()));
        if self.dry_run {
            return Ok(());
        }
        fs::remove_file(file).with_context(|| format!("failed to delete {}", file.display()))?;
        Ok(())
    }
}

fn copy_needed(source: &Path, target: &Path) -> bool {
    let Ok(target_meta) = fs::metadata(target) else {
        return true;
    };
    match (
        fs::metadata(source).and_then(|m| m.modified()),
        target_meta.modified(),
    ) {
        (Ok(source_time), Ok(target_time)) => source_time > target_time,
        _ => true,
    }
}
