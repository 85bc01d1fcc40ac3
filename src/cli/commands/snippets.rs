//! Snippets command

use super::CommandContext;
use anyhow::{Context, Result};
use clap::Parser;
use playscan::snippets::{ArgumentStats, SnippetCatalog};
use std::path::PathBuf;

/// Arguments for the snippets command
#[derive(Parser, Debug, Clone)]
pub struct SnippetsArgs {
    /// Playbook file, or a directory of playbooks
    pub path: PathBuf,

    /// File to write the snippets to (defaults to `snips`)
    #[arg(short = 'o', long)]
    pub output_file: Option<PathBuf>,
}

impl SnippetsArgs {
    /// Execute the snippets command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let resolutions = match ctx.resolve_path(&self.path) {
            Ok(resolutions) => resolutions,
            Err(code) => return Ok(code),
        };

        let stats =
            ArgumentStats::from_tasks(resolutions.iter().flat_map(|resolution| &resolution.tasks));
        let catalog = SnippetCatalog::build(&stats, &ctx.config.snippet_filter());

        let output_file = self
            .output_file
            .clone()
            .unwrap_or_else(|| ctx.config.snippets.output.clone());
        std::fs::write(&output_file, catalog.render())
            .with_context(|| format!("Failed to write {}", output_file.display()))?;

        if ctx.output.is_json() {
            ctx.output.json(&serde_json::json!({
                "file": output_file,
                "snippets": catalog.snippets(),
            }));
        } else {
            ctx.output
                .plain(&format!("Written snips to file {}", output_file.display()));
        }
        Ok(0)
    }
}
