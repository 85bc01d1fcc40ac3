//! CLI module for Playscan
//!
//! This module provides the command-line interface for Playscan,
//! including argument parsing and subcommand handling.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Playscan - static reachability analysis for playbooks
///
/// Resolves includes, roles and role dependencies without running anything.
#[derive(Parser, Debug, Clone)]
#[command(name = "playscan")]
#[command(version)]
#[command(about = "List reachable tags and tasks of a playbook", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub format: OutputFormat,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "PLAYSCAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Directory roles are looked up from (defaults to the playbook's directory)
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// Only treat the `block` section of blocks as reachable
    #[arg(long, global = true)]
    pub block_only: bool,

    /// Extra role search directory (repeatable)
    #[arg(long = "roles-path", global = true, action = clap::ArgAction::Append)]
    pub roles_path: Vec<PathBuf>,

    /// Resolve the files of a directory in parallel
    #[arg(long, global = true)]
    pub parallel: bool,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// JSON output for scripting
    Json,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print every reachable tag
    Tags(commands::tags::TagsArgs),

    /// Write editor snippets built from argument usage
    Snippets(commands::snippets::SnippetsArgs),

    /// List the flattened tasks
    Tasks(commands::tasks::TasksArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }

    /// Check if JSON output is requested
    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }
}
