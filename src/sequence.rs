//! Task sequences and their expansion.
//!
//! A [`TaskSequence`] is an ordered list of task nodes that all share one base
//! directory: the directory relative includes are resolved against. Expanding
//! it replaces every `include_tasks`/`import_tasks` directive with the
//! expanded contents of the referenced file, every `block` with its
//! `block`/`rescue`/`always` children, and every role directive with the
//! role's tasks. Expansion is depth first and keeps document order at every
//! splice point. Nothing is de-duplicated: a file included twice shows up
//! twice.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_yaml::Value;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::resolver::{ResolveStack, Resolution, Resolver};
use crate::roles::RoleInvocation;
use crate::task::{TaskKind, TaskNode};

/// An ordered list of task entries scoped to one directory.
#[derive(Debug)]
pub struct TaskSequence {
    base_dir: PathBuf,
    source: Option<PathBuf>,
    nodes: Vec<TaskNode>,
    resolved: OnceCell<Arc<Resolution>>,
}

impl TaskSequence {
    /// Create a sequence from already-built nodes
    pub fn new(base_dir: impl Into<PathBuf>, nodes: Vec<TaskNode>) -> Self {
        Self {
            base_dir: base_dir.into(),
            source: None,
            nodes,
            resolved: OnceCell::new(),
        }
    }

    /// Create an empty sequence
    pub fn empty(base_dir: impl Into<PathBuf>) -> Self {
        Self::new(base_dir, Vec::new())
    }

    /// Create a sequence from raw task entries; non-mapping entries are skipped
    pub fn from_values(base_dir: impl Into<PathBuf>, values: &[Value]) -> Self {
        Self::new(base_dir, nodes_from_values(values))
    }

    /// Create a sequence from a deserialized task file.
    ///
    /// An empty document is an empty sequence; anything other than a list is
    /// rejected.
    pub fn from_document(path: &Path, document: &Value) -> Result<Self> {
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let nodes = match document {
            Value::Null => Vec::new(),
            Value::Sequence(values) => nodes_from_values(values),
            _ => {
                return Err(Error::invalid_structure(
                    path,
                    "a task file must contain a list of tasks",
                ))
            }
        };
        Ok(Self {
            base_dir,
            source: Some(path.to_path_buf()),
            nodes,
            resolved: OnceCell::new(),
        })
    }

    /// Directory relative includes are resolved against
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// File this sequence was read from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// The nodes as written, before expansion
    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    /// Number of nodes before expansion
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if there are no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Fully expanded leaf tasks
    pub fn expand(&self, resolver: &Resolver) -> Result<Vec<TaskNode>> {
        let resolution = self.resolve(resolver, &mut ResolveStack::new())?;
        Ok(resolution.tasks.clone())
    }

    /// Every tag reachable from this sequence
    pub fn find_all_tags(&self, resolver: &Resolver) -> Result<BTreeSet<String>> {
        let resolution = self.resolve(resolver, &mut ResolveStack::new())?;
        Ok(resolution.tags.clone())
    }

    /// Expand the sequence, memoizing the result on this instance.
    ///
    /// The memo assumes one sequence is only ever resolved by one resolver.
    pub(crate) fn resolve(
        &self,
        resolver: &Resolver,
        stack: &mut ResolveStack,
    ) -> Result<Arc<Resolution>> {
        if let Some(resolution) = self.resolved.get() {
            return Ok(Arc::clone(resolution));
        }

        let resolution = Arc::new(expand_nodes(resolver, &self.base_dir, &self.nodes, stack)?);
        Ok(Arc::clone(self.resolved.get_or_init(|| resolution)))
    }
}

fn nodes_from_values(values: &[Value]) -> Vec<TaskNode> {
    values
        .iter()
        .filter_map(|value| {
            let node = TaskNode::from_value(value);
            if node.is_none() {
                debug!(entry = ?value, "ignoring task entry that is not a mapping");
            }
            node
        })
        .collect()
}

/// Expand `nodes` in order, splicing directives and blocks in place.
pub(crate) fn expand_nodes(
    resolver: &Resolver,
    base_dir: &Path,
    nodes: &[TaskNode],
    stack: &mut ResolveStack,
) -> Result<Resolution> {
    let mut out = Resolution::default();

    for node in nodes {
        // Tags on a directive or block are call-site tags and count as well.
        out.tags.extend(node.tags().iter().cloned());

        match node.kind() {
            TaskKind::Include(target) | TaskKind::Import(target) => {
                let Some(file) = target.file.as_deref() else {
                    warn!(directive = %target.directive, "include directive without a file");
                    continue;
                };
                if file.contains("{{") {
                    debug!(file, "skipping templated include");
                    continue;
                }
                trace!(file, base = %base_dir.display(), "expanding include");
                let included = resolver.include_tasks(base_dir, file, stack)?;
                out.extend(&included);
            }
            TaskKind::Block => {
                for section in resolver.options().block_policy.sections() {
                    let children = nodes_from_values(node.section(section));
                    let expanded = expand_nodes(resolver, base_dir, &children, stack)?;
                    out.extend(&expanded);
                }
            }
            TaskKind::IncludeRole(target) | TaskKind::ImportRole(target) => {
                let Some(name) = target.name.as_deref() else {
                    warn!(directive = %target.directive, "role directive without a name");
                    continue;
                };
                if name.contains("{{") {
                    debug!(role = name, "skipping templated role directive");
                    continue;
                }
                let invocation = RoleInvocation::new(name, resolver.base_dir())
                    .with_tasks_from(target.tasks_from.clone());
                let expanded = invocation.resolve(resolver, stack)?;
                out.extend(&expanded);
            }
            TaskKind::Action => out.tasks.push(node.clone()),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;
    use crate::resolver::{BlockPolicy, ResolveOptions};
    use pretty_assertions::assert_eq;

    fn names(tasks: &[TaskNode]) -> Vec<&str> {
        tasks.iter().map(|t| t.name().unwrap_or("?")).collect()
    }

    fn resolver(loader: MemoryLoader) -> Resolver {
        Resolver::new("/p").with_loader(Arc::new(loader))
    }

    fn sequence(yaml: &str) -> TaskSequence {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        TaskSequence::from_document(Path::new("/p/site.yml"), &value).unwrap()
    }

    #[test]
    fn test_include_preserves_order() {
        let loader = MemoryLoader::new().with_file(
            "/p/f.yml",
            "- name: C\n  debug: {}\n- name: D\n  debug: {}\n",
        );
        let resolver = resolver(loader);
        let seq = sequence(
            "- name: A\n  debug: {}\n- include_tasks: f.yml\n- name: B\n  debug: {}\n",
        );

        let tasks = seq.expand(&resolver).unwrap();
        assert_eq!(names(&tasks), vec!["A", "C", "D", "B"]);
    }

    #[test]
    fn test_block_sections_in_order() {
        let resolver = resolver(MemoryLoader::new());
        let seq = sequence(
            "- block:\n    - name: X\n      debug: {}\n  rescue:\n    - name: Y\n      debug: {}\n  always:\n    - name: Z\n      debug: {}\n",
        );

        let tasks = seq.expand(&resolver).unwrap();
        assert_eq!(names(&tasks), vec!["X", "Y", "Z"]);
        assert!(tasks.iter().all(|t| !t.is_control_block()));
    }

    #[test]
    fn test_block_only_policy() {
        let resolver = resolver(MemoryLoader::new()).with_options(ResolveOptions {
            block_policy: BlockPolicy::BlockOnly,
            ..ResolveOptions::default()
        });
        let seq = sequence(
            "- block:\n    - name: X\n      debug: {}\n      tags: x\n  rescue:\n    - name: Y\n      debug: {}\n      tags: y\n",
        );

        assert_eq!(names(&seq.expand(&resolver).unwrap()), vec!["X"]);
        assert_eq!(
            seq.find_all_tags(&resolver).unwrap(),
            BTreeSet::from(["x".to_string()])
        );
    }

    #[test]
    fn test_same_file_included_twice_appears_twice() {
        let loader = MemoryLoader::new().with_file("/p/common.yml", "- name: C\n  ping:\n");
        let resolver = resolver(loader);
        let seq = sequence("- import_tasks: common.yml\n- include_tasks:\n    file: common.yml\n");

        assert_eq!(names(&seq.expand(&resolver).unwrap()), vec!["C", "C"]);
        assert_eq!(resolver.task_file_cache().len(), 1);
    }

    #[test]
    fn test_missing_include_contributes_nothing() {
        let resolver = resolver(MemoryLoader::new());
        let seq = sequence("- include_tasks: nowhere.yml\n  tags: [setup]\n- name: A\n  ping:\n");

        assert_eq!(names(&seq.expand(&resolver).unwrap()), vec!["A"]);
        // directive tags are still reachable
        assert!(seq.find_all_tags(&resolver).unwrap().contains("setup"));
    }

    #[test]
    fn test_malformed_include_contributes_nothing() {
        let loader = MemoryLoader::new().with_file("/p/bad.yml", "- name: [oops\n");
        let resolver = resolver(loader);
        let seq = sequence("- include_tasks: bad.yml\n- name: A\n  ping:\n");

        assert_eq!(names(&seq.expand(&resolver).unwrap()), vec!["A"]);
    }

    #[test]
    fn test_nested_include_relative_to_including_file() {
        let loader = MemoryLoader::new()
            .with_file("/p/tasks/outer.yml", "- include_tasks: inner.yml\n")
            .with_file("/p/tasks/inner.yml", "- name: I\n  ping:\n");
        let resolver = resolver(loader);
        let seq = sequence("- include_tasks: tasks/outer.yml\n");

        assert_eq!(names(&seq.expand(&resolver).unwrap()), vec!["I"]);
    }

    #[test]
    fn test_include_cycle_is_detected() {
        let loader = MemoryLoader::new()
            .with_file("/p/a.yml", "- include_tasks: b.yml\n")
            .with_file("/p/b.yml", "- include_tasks: a.yml\n");
        let resolver = resolver(loader);
        let seq = sequence("- include_tasks: a.yml\n");

        assert!(matches!(
            seq.expand(&resolver),
            Err(Error::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_templated_include_skipped() {
        let resolver = resolver(MemoryLoader::new());
        let seq = sequence("- include_tasks: \"{{ os }}.yml\"\n");
        assert!(seq.expand(&resolver).unwrap().is_empty());
    }

    #[test]
    fn test_non_list_task_file_rejected() {
        let value: Value = serde_yaml::from_str("name: not a list").unwrap();
        let err = TaskSequence::from_document(Path::new("/p/x.yml"), &value).unwrap_err();
        assert!(matches!(err, Error::InvalidStructure { .. }));
    }
}
