//! Task nodes.
//!
//! A task entry in a playbook is a plain mapping. Which key names the action
//! is never stated explicitly: it is whatever is left once every reserved
//! keyword (`name`, `when`, `tags`, `register`, ...) has been removed. The
//! same elimination also tells directives (`include_tasks`, `block`, ...)
//! apart from ordinary actions, and that classification is computed once when
//! the node is built.

use crate::error::{Error, Result};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Keys that configure how a task runs rather than what it runs.
///
/// Keys starting with `with_` (legacy loop syntax) are reserved as well.
pub const RESERVED_KEYS: &[&str] = &[
    "name",
    "when",
    "tags",
    "loop",
    "loop_control",
    "register",
    "notify",
    "listen",
    "retries",
    "delay",
    "until",
    "ignore_errors",
    "ignore_unreachable",
    "changed_when",
    "failed_when",
    "become",
    "become_method",
    "become_user",
    "become_flags",
    "become_exe",
    "delegate_to",
    "delegate_facts",
    "run_once",
    "async",
    "poll",
    "environment",
    "vars",
    "args",
    "rescue",
    "always",
    "connection",
    "throttle",
    "timeout",
    "no_log",
    "diff",
    "check_mode",
    "module_defaults",
    "any_errors_fatal",
    "debugger",
    "collections",
    "remote_user",
    "port",
];

const INCLUDE_TASKS: &[&str] = &[
    "include_tasks",
    "ansible.builtin.include_tasks",
    "include",
    "ansible.builtin.include",
];
const IMPORT_TASKS: &[&str] = &["import_tasks", "ansible.builtin.import_tasks"];
const INCLUDE_ROLE: &[&str] = &["include_role", "ansible.builtin.include_role"];
const IMPORT_ROLE: &[&str] = &["import_role", "ansible.builtin.import_role"];

/// Returns true if `key` is a control/meta option rather than an action.
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key) || key.starts_with("with_")
}

/// Normalize a `tags` field into a set.
///
/// A bare string becomes a one-element set, a sequence the set of its scalar
/// elements. Anything else (including a missing field) yields the empty set.
pub fn tags_from_value(value: Option<&Value>) -> BTreeSet<String> {
    match value {
        Some(Value::Sequence(items)) => items.iter().filter_map(scalar_to_string).collect(),
        Some(value) => scalar_to_string(value).into_iter().collect(),
        None => BTreeSet::new(),
    }
}

/// Render a scalar YAML value as a string.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

/// Target of an `include_tasks`/`import_tasks` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeTarget {
    /// The directive key as written (e.g. `ansible.builtin.include_tasks`)
    pub directive: String,
    /// Referenced file, if the directive names one
    pub file: Option<String>,
}

/// Target of an `include_role`/`import_role` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTarget {
    /// The directive key as written
    pub directive: String,
    /// Role name, if present
    pub name: Option<String>,
    /// Alternative entry file inside the role's `tasks/` directory
    pub tasks_from: Option<String>,
}

/// Shape of a task node, decided once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// An ordinary action (possibly with an ambiguous type)
    Action,
    /// `include_tasks` (or legacy `include`)
    Include(IncludeTarget),
    /// `import_tasks`
    Import(IncludeTarget),
    /// `block` with optional `rescue`/`always`
    Block,
    /// `include_role`
    IncludeRole(RoleTarget),
    /// `import_role`
    ImportRole(RoleTarget),
}

/// A single task entry.
///
/// Cloning is cheap: the underlying mapping is shared.
#[derive(Debug, Clone)]
pub struct TaskNode {
    data: Arc<Mapping>,
    kind: TaskKind,
    tags: BTreeSet<String>,
}

impl TaskNode {
    /// Build a node from a task mapping
    pub fn new(data: Mapping) -> Self {
        let tags = tags_from_value(data.get("tags"));
        let kind = classify(&data);
        Self {
            data: Arc::new(data),
            kind,
            tags,
        }
    }

    /// Build a node from any YAML value; `None` unless it is a mapping
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Mapping(map) => Some(Self::new(map.clone())),
            _ => None,
        }
    }

    /// The raw mapping
    pub fn data(&self) -> &Mapping {
        &self.data
    }

    /// Node shape
    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    /// Task name, if given
    pub fn name(&self) -> Option<&str> {
        self.data.get("name").and_then(Value::as_str)
    }

    /// Tags attached directly to this node
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Keys left after removing every reserved key, in document order
    pub fn action_keys(&self) -> Vec<String> {
        action_keys(&self.data)
    }

    /// The inferred action type.
    ///
    /// Fails with [`Error::AmbiguousType`] unless exactly one non-reserved
    /// key is present.
    pub fn action_type(&self) -> Result<String> {
        let mut keys = self.action_keys();
        if keys.len() == 1 {
            Ok(keys.remove(0))
        } else {
            Err(Error::AmbiguousType { keys })
        }
    }

    /// Arguments of the inferred action; `None` if inference fails or the
    /// action was given no value
    pub fn action_args(&self) -> Option<&Value> {
        let action = self.action_type().ok()?;
        match self.data.get(action.as_str()) {
            Some(Value::Null) | None => None,
            Some(value) => Some(value),
        }
    }

    /// True if this node is a `block` construct
    pub fn is_control_block(&self) -> bool {
        self.kind == TaskKind::Block
    }

    /// Child entries of one block section (`block`, `rescue` or `always`)
    pub fn section(&self, key: &str) -> &[Value] {
        match self.data.get(key) {
            Some(Value::Sequence(items)) => items,
            _ => &[],
        }
    }
}

impl PartialEq for TaskNode {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

fn action_keys(data: &Mapping) -> Vec<String> {
    data.keys()
        .filter_map(scalar_to_string)
        .filter(|key| !is_reserved_key(key))
        .collect()
}

fn classify(data: &Mapping) -> TaskKind {
    let keys = action_keys(data);
    let find = |names: &[&str]| keys.iter().find(|key| names.contains(&key.as_str())).cloned();

    if let Some(directive) = find(INCLUDE_TASKS) {
        let file = file_target(data.get(directive.as_str()));
        return TaskKind::Include(IncludeTarget { directive, file });
    }
    if let Some(directive) = find(IMPORT_TASKS) {
        let file = file_target(data.get(directive.as_str()));
        return TaskKind::Import(IncludeTarget { directive, file });
    }
    if keys.iter().any(|key| key == "block") {
        return TaskKind::Block;
    }
    if let Some(directive) = find(INCLUDE_ROLE) {
        let target = role_target(&directive, data.get(directive.as_str()));
        return TaskKind::IncludeRole(target);
    }
    if let Some(directive) = find(IMPORT_ROLE) {
        let target = role_target(&directive, data.get(directive.as_str()));
        return TaskKind::ImportRole(target);
    }
    TaskKind::Action
}

fn file_target(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Mapping(map) => map.get("file").and_then(scalar_to_string),
        other => scalar_to_string(other),
    }
}

fn role_target(directive: &str, value: Option<&Value>) -> RoleTarget {
    let (name, tasks_from) = match value {
        Some(Value::Mapping(map)) => (
            map.get("name").and_then(scalar_to_string),
            map.get("tasks_from").and_then(scalar_to_string),
        ),
        Some(other) => (scalar_to_string(other), None),
        None => (None, None),
    };
    RoleTarget {
        directive: directive.to_string(),
        name,
        tasks_from,
    }
}
