//! Invocation settings: command-line values merged with the optional
//! `camake.toml` project file. Command-line flags always win; the file only
//! fills in what the user left unset.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "camake.toml";

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Target to build.
    pub target: String,
    /// Top-level build-description file.
    pub script: PathBuf,
    /// Rebuild everything regardless of timestamps.
    pub force: bool,
    /// Disable the worker pool.
    pub serial: bool,
    /// Worker pool size; 0 means one worker per available processor.
    pub jobs: usize,
    /// Keep going after failures.
    pub ignore_errors: bool,
    /// Echo commands without executing them.
    pub dry_run: bool,
    /// Echo full argv instead of summaries.
    pub raw_format: bool,
    pub no_colors: bool,
    pub quiet: bool,
    pub verbose: bool,
    /// Show the progress bar.
    pub statistics: bool,
    /// Preferred compiler command.
    pub compiler: Option<String>,
    /// Write compile_commands.json here after graph construction.
    pub compile_commands: Option<PathBuf>,
}

impl Settings {
    /// Fold the project file into settings the command line left at their
    /// defaults.
    pub fn apply_file_config(&mut self, config: FileConfig) {
        if self.compiler.is_none() {
            self.compiler = config.compiler;
        }
        if self.jobs == 0
            && let Some(jobs) = config.jobs
        {
            self.jobs = jobs;
        }
        if !self.no_colors
            && let Some(no_colors) = config.no_colors
        {
            self.no_colors = no_colors;
        }
    }
}

/// Project-level defaults, read from `camake.toml` next to the top-level
/// build script.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub compiler: Option<String>,
    pub jobs: Option<usize>,
    pub no_colors: Option<bool>,
}

/// Load the project file from `directory`, if present.
pub fn load_file_config(directory: &Path) -> Result<Option<FileConfig>> {
    let path = directory.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let config: FileConfig = toml::from_str(&contents)
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: FileConfig = toml::from_str(
            r#"
            compiler = "g++"
            jobs = 4
            no_colors = true
            "#,
        )
        .unwrap();
        assert_eq!(config.compiler.as_deref(), Some("g++"));
        assert_eq!(config.jobs, Some(4));
        assert_eq!(config.no_colors, Some(true));
    }

    #[test]
    fn test_parse_partial_config() {
        let config: FileConfig = toml::from_str("jobs = 2").unwrap();
        assert!(config.compiler.is_none());
        assert_eq!(config.jobs, Some(2));
    }

    #[test]
    fn test_command_line_wins_over_file() {
        let mut settings = Settings {
            jobs: 8,
            compiler: Some("clang++".to_string()),
            ..Default::default()
        };
        settings.apply_file_config(FileConfig {
            compiler: Some("g++".to_string()),
            jobs: Some(2),
            no_colors: Some(true),
        });
        assert_eq!(settings.jobs, 8);
        assert_eq!(settings.compiler.as_deref(), Some("clang++"));
        assert!(settings.no_colors);
    }

    #[test]
    fn test_file_fills_unset_values() {
        let mut settings = Settings::default();
        settings.apply_file_config(FileConfig {
            compiler: Some("g++".to_string()),
            jobs: Some(2),
            no_colors: None,
        });
        assert_eq!(settings.jobs, 2);
        assert_eq!(settings.compiler.as_deref(), Some("g++"));
        assert!(!settings.no_colors);
    }

    #[test]
    fn test_missing_config_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_file_config(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "jobs = 3").unwrap();
        let config = load_file_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.jobs, Some(3));
    }
}
