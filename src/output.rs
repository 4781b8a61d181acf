//! Terminal output: colored action lines, error reporting, progress.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::model::Registry;
use crate::plan::ActionPlan;

/// Apply the global color policy before any output happens.
pub fn init(no_colors: bool) {
    if no_colors {
        colored::control::set_override(false);
        console::set_colors_enabled(false);
    }
}

pub fn error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}

pub fn status(message: &str) {
    println!("{}", message.magenta());
}

/// One-line summary of a build action, colored by action family.
pub fn action(label: &str, detail: &str) -> String {
    let label = format!("{label}:");
    let label = match label.as_str() {
        "compile:" | "dependency:" => label.green(),
        "link:" | "archive:" | "copy:" => label.blue(),
        "unittest:" => label.cyan(),
        "delete:" | "create:" => label.magenta(),
        _ => label.normal(),
    };
    format!("{label} {detail}")
}

pub fn progress(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

/// Dump the action plan level by level, wrapped to the terminal width.
pub fn print_plan(registry: &Registry, plan: &ActionPlan) {
    let width = console::Term::stdout().size().1 as usize;
    for (index, level) in plan.levels().iter().enumerate() {
        let names = level.iter().map(|&id| registry.target(id).name());
        println!("{}", format!("level {index}:").magenta());
        let mut line = String::new();
        for name in names {
            if !line.is_empty() && line.len() + name.len() + 1 > width.max(20) {
                println!("  {line}");
                line.clear();
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(name);
        }
        if !line.is_empty() {
            println!("  {line}");
        }
    }
}
