//! Argument statistics and the snippet catalog.
//!
//! [`ArgumentStats`] counts, per inferred action type, how often each argument
//! key is used across a set of flattened tasks. [`SnippetCatalog`] turns those
//! counts into editor snippets, one per action type:
//!
//! ```text
//! snippet apt
//! apt:
//!   name: $1
//!   state: $2
//! endsnippet
//! ```

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::trace;

use crate::task::{scalar_to_string, TaskNode};

/// Thresholds for dropping rarely used arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnippetFilter {
    /// Filtering only applies to action types with more distinct arguments
    /// than this
    pub filter_if_more_than: usize,
    /// Minimum use count for an argument to survive filtering
    pub filter_threshold: usize,
}

impl Default for SnippetFilter {
    fn default() -> Self {
        Self {
            filter_if_more_than: 10,
            filter_threshold: 2,
        }
    }
}

/// The first two arguments of a type are never filtered
const ALWAYS_KEPT: usize = 2;

/// Per action type argument usage counts, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentStats {
    types: IndexMap<String, IndexMap<String, usize>>,
}

impl ArgumentStats {
    /// Create empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every task in `tasks`
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a TaskNode>) -> Self {
        let mut stats = Self::new();
        for task in tasks {
            stats.record(task);
        }
        stats
    }

    /// Count the arguments of one task.
    ///
    /// Returns false if the task was skipped: control blocks, tasks whose
    /// action type cannot be inferred, and actions without mapping arguments.
    pub fn record(&mut self, task: &TaskNode) -> bool {
        if task.is_control_block() {
            return false;
        }
        let Ok(action) = task.action_type() else {
            return false;
        };
        let Some(Value::Mapping(args)) = task.action_args() else {
            trace!(action = %action, "no mapping arguments, not counted");
            return false;
        };

        let counts = self.types.entry(action).or_default();
        for key in args.keys().filter_map(scalar_to_string) {
            *counts.entry(key).or_insert(0) += 1;
        }
        true
    }

    /// Action types in first-seen order
    pub fn action_types(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Argument counts for `action`, in first-seen order
    pub fn arguments(&self, action: &str) -> Option<&IndexMap<String, usize>> {
        self.types.get(action)
    }

    /// Number of action types seen
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True if no task was counted
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// A snippet for one action type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snippet {
    /// Action type, used as the snippet trigger
    pub action: String,
    /// Kept arguments with their placeholder ordinal
    pub arguments: Vec<(String, usize)>,
}

impl fmt::Display for Snippet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "snippet {}", self.action)?;
        writeln!(f, "{}:", self.action)?;
        for (arg, ordinal) in &self.arguments {
            writeln!(f, "  {}: ${}", arg, ordinal)?;
        }
        writeln!(f, "endsnippet")?;
        writeln!(f)
    }
}

/// Snippets for every counted action type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnippetCatalog {
    snippets: Vec<Snippet>,
}

impl SnippetCatalog {
    /// Build snippets from `stats`.
    ///
    /// Placeholder ordinals are the 1-based first-seen position of the
    /// argument, so they keep their value when earlier arguments are
    /// filtered out.
    pub fn build(stats: &ArgumentStats, filter: &SnippetFilter) -> Self {
        let snippets = stats
            .types
            .iter()
            .map(|(action, counts)| {
                let large = counts.len() > filter.filter_if_more_than;
                let arguments = counts
                    .iter()
                    .enumerate()
                    .map(|(idx, (arg, count))| (idx + 1, arg, *count))
                    .filter(|(ordinal, _, count)| {
                        !(large && *ordinal > ALWAYS_KEPT && *count < filter.filter_threshold)
                    })
                    .map(|(ordinal, arg, _)| (arg.clone(), ordinal))
                    .collect();
                Snippet {
                    action: action.clone(),
                    arguments,
                }
            })
            .collect();
        Self { snippets }
    }

    /// Snippets in first-seen action order
    pub fn snippets(&self) -> &[Snippet] {
        &self.snippets
    }

    /// Number of snippets
    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    /// True if there are no snippets
    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    /// The catalog as snippet file text
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SnippetCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for snippet in &self.snippets {
            write!(f, "{}", snippet)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tasks(yaml: &str) -> Vec<TaskNode> {
        let values: Vec<Value> = serde_yaml::from_str(yaml).unwrap();
        values.iter().filter_map(TaskNode::from_value).collect()
    }

    #[test]
    fn test_counts_in_first_seen_order() {
        let tasks = tasks(
            r#"
- apt: {name: nginx, state: present}
- copy: {src: a, dest: b}
- apt: {name: git, update_cache: true}
"#,
        );
        let stats = ArgumentStats::from_tasks(&tasks);

        assert_eq!(stats.action_types().collect::<Vec<_>>(), vec!["apt", "copy"]);
        let apt = stats.arguments("apt").unwrap();
        assert_eq!(
            apt.iter().map(|(k, v)| (k.as_str(), *v)).collect::<Vec<_>>(),
            vec![("name", 2), ("state", 1), ("update_cache", 1)]
        );
    }

    #[test]
    fn test_skipped_tasks() {
        let tasks = tasks(
            r#"
- block:
    - ping:
- shell: echo hi
- ping:
- name: two actions
  apt: {name: x}
  yum: {name: x}
- file: {path: /tmp}
"#,
        );
        let mut stats = ArgumentStats::new();
        let counted: Vec<bool> = tasks.iter().map(|t| stats.record(t)).collect();

        assert_eq!(counted, vec![false, false, false, false, true]);
        assert_eq!(stats.len(), 1);
        assert!(stats.arguments("file").is_some());
    }

    #[test]
    fn test_render_format() {
        let tasks = tasks("- apt: {name: nginx, state: present}\n");
        let catalog = SnippetCatalog::build(
            &ArgumentStats::from_tasks(&tasks),
            &SnippetFilter::default(),
        );
        assert_eq!(
            catalog.render(),
            "snippet apt\napt:\n  name: $1\n  state: $2\nendsnippet\n\n"
        );
    }

    #[test]
    fn test_large_types_drop_rare_arguments() {
        // eleven distinct arguments, only a5 used twice; a0 and a1 are always kept
        let mut yaml = String::from("- mod: {");
        yaml.push_str(&(0..11).map(|i| format!("a{}: 1", i)).collect::<Vec<_>>().join(", "));
        yaml.push_str("}\n- mod: {a5: 1}\n");
        let stats = ArgumentStats::from_tasks(&tasks(&yaml));

        let catalog = SnippetCatalog::build(&stats, &SnippetFilter::default());
        let snippet = &catalog.snippets()[0];
        assert_eq!(
            snippet.arguments,
            vec![("a0".to_string(), 1), ("a1".to_string(), 2), ("a5".to_string(), 6)]
        );
    }

    #[test]
    fn test_small_types_keep_everything() {
        let tasks = tasks("- mod: {a: 1, b: 2, c: 3}\n");
        let catalog = SnippetCatalog::build(
            &ArgumentStats::from_tasks(&tasks),
            &SnippetFilter::default(),
        );
        assert_eq!(catalog.snippets()[0].arguments.len(), 3);
    }

    #[test]
    fn test_empty_catalog_renders_nothing() {
        let catalog = SnippetCatalog::build(&ArgumentStats::new(), &SnippetFilter::default());
        assert!(catalog.is_empty());
        assert_eq!(catalog.render(), "");
    }
}
