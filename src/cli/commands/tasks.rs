//! Tasks command

use super::CommandContext;
use anyhow::Result;
use clap::Parser;
use playscan::task::TaskNode;
use serde_json::{json, Value};
use std::path::PathBuf;

/// Arguments for the tasks command
#[derive(Parser, Debug, Clone)]
pub struct TasksArgs {
    /// Playbook file, or a directory of playbooks
    pub path: PathBuf,
}

impl TasksArgs {
    /// Execute the tasks command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        let resolutions = match ctx.resolve_path(&self.path) {
            Ok(resolutions) => resolutions,
            Err(code) => return Ok(code),
        };
        let tasks: Vec<&TaskNode> = resolutions.iter().flat_map(|r| &r.tasks).collect();

        if ctx.output.is_json() {
            let items: Vec<Value> = tasks.iter().map(|task| task_json(task)).collect();
            ctx.output.json(&Value::Array(items));
            return Ok(0);
        }

        let rows: Vec<Vec<String>> = tasks
            .iter()
            .enumerate()
            .map(|(idx, task)| task_row(idx + 1, task))
            .collect();
        ctx.output.table(&["#", "ACTION", "NAME", "TAGS"], &rows);
        ctx.output.info(&format!("{} task(s)", tasks.len()));
        Ok(0)
    }
}

fn action_label(task: &TaskNode) -> String {
    task.action_type().unwrap_or_else(|_| "?".to_string())
}

fn task_row(index: usize, task: &TaskNode) -> Vec<String> {
    vec![
        index.to_string(),
        action_label(task),
        task.name().unwrap_or("").to_string(),
        task.tags().iter().cloned().collect::<Vec<_>>().join(","),
    ]
}

fn task_json(task: &TaskNode) -> Value {
    json!({
        "action": task.action_type().ok(),
        "name": task.name(),
        "tags": task.tags(),
    })
}
