use std::path::PathBuf;

use {
    anyhow::Result,
    clap::Subcommand,
    courier_config::{Severity, validate},
};

use crate::load_config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration and report errors/warnings.
    Check,
    /// Print the effective configuration (secrets included) as TOML.
    Show,
}

pub fn handle_config(action: ConfigAction, config_path: Option<&PathBuf>) -> Result<()> {
    match action {
        ConfigAction::Check => check(config_path),
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        },
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(config_path: Option<&PathBuf>) -> Result<()> {
    match config_path {
        Some(path) => eprintln!("Checking {}\n", path.display()),
        None => eprintln!("Checking discovered configuration\n"),
    }
    let config = load_config(config_path)?;
    let result = validate(&config);

    for d in &result.diagnostics {
        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
        };
        eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if !result.diagnostics.is_empty() {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}
