//! Configuration module for Playscan
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - User configuration (~/.playscan.toml)
//! - Project configuration (./playscan.toml)
//! - Environment variables
//! - Command-line arguments (applied by the command context)

use anyhow::{Context, Result};
use playscan::resolver::{BlockPolicy, ResolveOptions, ScanOptions};
use playscan::snippets::SnippetFilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How references are resolved
    pub resolve: ResolveConfig,

    /// Which files a directory scan picks up
    pub scan: ScanConfig,

    /// Snippet generation
    pub snippets: SnippetsConfig,
}

/// Resolution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// Which block sections are reachable
    pub block_policy: BlockPolicy,

    /// Extra role search directories
    pub roles_path: Vec<PathBuf>,

    /// Extensions tried for role entry files
    pub extensions: Vec<String>,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        let options = ResolveOptions::default();
        Self {
            block_policy: options.block_policy,
            roles_path: options.roles_path,
            extensions: options.extensions,
        }
    }
}

/// Directory scan settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Resolve files in parallel
    pub parallel: bool,

    /// Skip files whose stem contains this string; empty disables the check
    pub skip_stem_containing: String,

    /// Skip dot files
    pub skip_hidden: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            skip_stem_containing: "test".to_string(),
            skip_hidden: true,
        }
    }
}

/// Snippet settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnippetsConfig {
    /// Filtering applies to action types with more arguments than this
    pub filter_if_more_than: usize,

    /// Minimum use count for arguments of filtered types
    pub filter_threshold: usize,

    /// Output file
    pub output: PathBuf,
}

impl Default for SnippetsConfig {
    fn default() -> Self {
        let filter = SnippetFilter::default();
        Self {
            filter_if_more_than: filter.filter_if_more_than,
            filter_threshold: filter.filter_threshold,
            output: PathBuf::from("snips"),
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = config_path {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
        }

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                config = config.merge_from_file(&path)?;
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());

        Ok(config)
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        // Explicit path takes priority
        if let Some(path) = explicit_path {
            return vec![path.clone()];
        }

        let mut paths = Vec::new();
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".playscan.toml"));
        }
        paths.push(PathBuf::from("playscan.toml"));
        paths
    }

    /// Merge configuration from a file
    fn merge_from_file(&self, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let file_config = Self::parse(path, &content)?;
        Ok(self.merge(file_config))
    }

    /// Parse a config document, choosing the format by extension
    fn parse(path: &Path, content: &str) -> Result<Self> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let context = || format!("Failed to parse config file: {}", path.display());

        let config: Config = match extension {
            "yml" | "yaml" => serde_yaml::from_str(content).with_context(context)?,
            "json" => serde_json::from_str(content).with_context(context)?,
            "toml" => toml::from_str(content).with_context(context)?,
            _ => {
                // Try TOML first, then YAML
                toml::from_str(content)
                    .or_else(|_| serde_yaml::from_str(content))
                    .with_context(context)?
            }
        };
        Ok(config)
    }

    /// Merge another config into this one; non-default values in `other` win
    fn merge(&self, other: Config) -> Config {
        let resolve_defaults = ResolveConfig::default();
        let scan_defaults = ScanConfig::default();
        let snippet_defaults = SnippetsConfig::default();

        Config {
            resolve: ResolveConfig {
                block_policy: if other.resolve.block_policy != resolve_defaults.block_policy {
                    other.resolve.block_policy
                } else {
                    self.resolve.block_policy
                },
                roles_path: if other.resolve.roles_path.is_empty() {
                    self.resolve.roles_path.clone()
                } else {
                    other.resolve.roles_path
                },
                extensions: if other.resolve.extensions != resolve_defaults.extensions {
                    other.resolve.extensions
                } else {
                    self.resolve.extensions.clone()
                },
            },
            scan: ScanConfig {
                parallel: other.scan.parallel || self.scan.parallel,
                skip_stem_containing: if other.scan.skip_stem_containing
                    != scan_defaults.skip_stem_containing
                {
                    other.scan.skip_stem_containing
                } else {
                    self.scan.skip_stem_containing.clone()
                },
                skip_hidden: if other.scan.skip_hidden != scan_defaults.skip_hidden {
                    other.scan.skip_hidden
                } else {
                    self.scan.skip_hidden
                },
            },
            snippets: SnippetsConfig {
                filter_if_more_than: if other.snippets.filter_if_more_than
                    != snippet_defaults.filter_if_more_than
                {
                    other.snippets.filter_if_more_than
                } else {
                    self.snippets.filter_if_more_than
                },
                filter_threshold: if other.snippets.filter_threshold
                    != snippet_defaults.filter_threshold
                {
                    other.snippets.filter_threshold
                } else {
                    self.snippets.filter_threshold
                },
                output: if other.snippets.output != snippet_defaults.output {
                    other.snippets.output
                } else {
                    self.snippets.output.clone()
                },
            },
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // PLAYSCAN_ROLES_PATH
        if let Some(paths) = var("PLAYSCAN_ROLES_PATH") {
            self.resolve.roles_path = paths
                .split(':')
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
        }

        // PLAYSCAN_BLOCK_POLICY
        if let Some(policy) = var("PLAYSCAN_BLOCK_POLICY") {
            match policy.parse() {
                Ok(policy) => self.resolve.block_policy = policy,
                Err(e) => tracing::warn!("Ignoring PLAYSCAN_BLOCK_POLICY: {}", e),
            }
        }

        // PLAYSCAN_PARALLEL
        if let Some(parallel) = var("PLAYSCAN_PARALLEL") {
            self.scan.parallel = matches!(
                parallel.to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
    }

    /// Resolution options for the library
    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            block_policy: self.resolve.block_policy,
            roles_path: self.resolve.roles_path.clone(),
            extensions: self.resolve.extensions.clone(),
        }
    }

    /// Directory scan options for the library
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            skip_stem_containing: Some(self.scan.skip_stem_containing.clone())
                .filter(|s| !s.is_empty()),
            skip_hidden: self.scan.skip_hidden,
            parallel: self.scan.parallel,
            ..ScanOptions::default()
        }
    }

    /// Snippet filter thresholds
    pub fn snippet_filter(&self) -> SnippetFilter {
        SnippetFilter {
            filter_if_more_than: self.snippets.filter_if_more_than,
            filter_threshold: self.snippets.filter_threshold,
        }
    }
}
