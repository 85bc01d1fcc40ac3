//! Subcommands module for Playscan CLI
//!
//! This module contains all the subcommand implementations.

pub mod snippets;
pub mod tags;
pub mod tasks;

use crate::cli::output::OutputFormatter;
use crate::cli::Cli;
use crate::config::Config;
use playscan::resolver::{BlockPolicy, Resolution, Resolver};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration, with command-line overrides applied
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
    /// Explicit role base directory
    pub base_dir: Option<PathBuf>,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &Cli, mut config: Config) -> Self {
        let output = OutputFormatter::new(!cli.no_color, cli.is_json(), cli.verbosity());

        if cli.block_only {
            config.resolve.block_policy = BlockPolicy::BlockOnly;
        }
        if !cli.roles_path.is_empty() {
            config.resolve.roles_path = cli.roles_path.clone();
        }
        if cli.parallel {
            config.scan.parallel = true;
        }

        Self {
            config,
            output,
            base_dir: cli.base_dir.clone(),
        }
    }

    /// A resolver for `path`, looking roles up next to it unless a base
    /// directory was given
    pub fn resolver_for(&self, path: &Path) -> Resolver {
        let base_dir = self
            .base_dir
            .clone()
            .unwrap_or_else(|| default_base_dir(path));
        debug!("Using role base directory {}", base_dir.display());
        Resolver::new(base_dir).with_options(self.config.resolve_options())
    }

    /// Resolve a playbook file, or every playbook directly inside a directory.
    ///
    /// On failure the message has already been printed and the exit code is
    /// returned as the error.
    pub fn resolve_path(&self, path: &Path) -> Result<Vec<Resolution>, i32> {
        if !path.exists() {
            self.output.error("Path does not exist");
            return Err(1);
        }

        let resolver = self.resolver_for(path);

        if path.is_file() {
            return match resolver.resolve_playbook(path) {
                Ok(resolution) => Ok(vec![resolution]),
                Err(e) => {
                    self.output.error(&e.to_string());
                    Err(e.exit_code())
                }
            };
        }

        if path.is_dir() {
            let report = match resolver.scan_directory(path, &self.config.scan_options()) {
                Ok(report) => report,
                Err(e) => {
                    self.output.error(&e.to_string());
                    return Err(e.exit_code());
                }
            };
            for (file, _) in &report.failed {
                self.output.warning(&format!(
                    "Failed to parse file {} – skipping",
                    file.display()
                ));
            }
            self.output.info(&format!(
                "Resolved {} playbook(s) in {}",
                report.resolved.len(),
                path.display()
            ));
            return Ok(report.resolved.into_iter().map(|(_, r)| r).collect());
        }

        self.output.error("Invalid path or file does not exist");
        Err(1)
    }
}

/// Roles live next to the playbook; for a directory scan, inside it
fn default_base_dir(path: &Path) -> PathBuf {
    if path.is_dir() {
        return path.to_path_buf();
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
