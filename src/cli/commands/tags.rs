//! Tags command

use super::CommandContext;
use anyhow::Result;
use clap::Parser;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Arguments for the tags command
#[derive(Parser, Debug, Clone)]
pub struct TagsArgs {
    /// Playbook file, or a directory of playbooks
    pub path: PathBuf,
}

impl TagsArgs {
    /// Execute the tags command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let resolutions = match ctx.resolve_path(&self.path) {
            Ok(resolutions) => resolutions,
            Err(code) => return Ok(code),
        };

        let tags: BTreeSet<String> = resolutions
            .into_iter()
            .flat_map(|resolution| resolution.tags)
            .collect();

        if ctx.output.is_json() {
            ctx.output.json(&serde_json::json!(tags));
        } else {
            ctx.output.plain(&format_tags(&tags));
        }
        ctx.output.flush();
        Ok(0)
    }
}

/// Sorted, space separated
pub fn format_tags(tags: &BTreeSet<String>) -> String {
    tags.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
}
