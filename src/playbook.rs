//! Plays and playbooks.
//!
//! A playbook is a list of plays. A play contributes, in this order, its
//! `tasks`, `pre_tasks` and `post_tasks` sections, then the roles listed under
//! `roles`, then the contents of an `import_playbook` directive. Sub-playbooks
//! are structural children and are loaded fresh each time, unlike roles.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::resolver::{absorb, Frame, ResolveStack, Resolution, Resolver};
use crate::roles::RoleInvocation;
use crate::sequence::{expand_nodes, TaskSequence};
use crate::task::{scalar_to_string, tags_from_value, TaskNode};

/// Task list sections of a play, in the order they are aggregated
pub const TASK_SECTIONS: &[&str] = &["tasks", "pre_tasks", "post_tasks"];

const IMPORT_PLAYBOOK: &[&str] = &["import_playbook", "ansible.builtin.import_playbook"];

/// A single play.
#[derive(Debug, Clone)]
pub struct Play {
    data: Mapping,
    base_dir: PathBuf,
}

impl Play {
    /// Wrap a play mapping; `base_dir` is the directory of the playbook file
    pub fn new(data: Mapping, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            data,
            base_dir: base_dir.into(),
        }
    }

    /// Play name, if given
    pub fn name(&self) -> Option<&str> {
        self.data.get("name").and_then(Value::as_str)
    }

    /// Tags set on the play itself
    pub fn tags(&self) -> BTreeSet<String> {
        tags_from_value(self.data.get("tags"))
    }

    /// Directory relative task includes are resolved against
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// One task list section (`tasks`, `pre_tasks`, ...); empty when absent
    pub fn task_section(&self, key: &str) -> TaskSequence {
        match self.data.get(key) {
            Some(Value::Sequence(entries)) => TaskSequence::from_values(&self.base_dir, entries),
            Some(Value::Null) | None => TaskSequence::empty(&self.base_dir),
            Some(_) => {
                warn!(play = ?self.name(), section = key, "section is not a list, ignoring");
                TaskSequence::empty(&self.base_dir)
            }
        }
    }

    /// Role invocations in declared order; roles are looked up from `roles_base`
    pub fn roles(&self, roles_base: &Path) -> Vec<RoleInvocation> {
        let Some(Value::Sequence(entries)) = self.data.get("roles") else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|entry| {
                let invocation = RoleInvocation::from_value(entry, roles_base);
                if invocation.is_none() {
                    warn!(play = ?self.name(), entry = ?entry, "role entry without a name");
                }
                invocation
            })
            .collect()
    }

    /// Target of an `import_playbook` directive, if present
    pub fn import_playbook(&self) -> Option<String> {
        IMPORT_PLAYBOOK
            .iter()
            .find_map(|key| self.data.get(*key))
            .and_then(scalar_to_string)
    }

    /// All leaf tasks of the play, in order
    pub fn find_all_tasks(&self, resolver: &Resolver) -> Result<Vec<TaskNode>> {
        Ok(self.resolve(resolver, &mut ResolveStack::new())?.tasks)
    }

    /// All tags reachable from the play
    pub fn find_all_tags(&self, resolver: &Resolver) -> Result<BTreeSet<String>> {
        Ok(self.resolve(resolver, &mut ResolveStack::new())?.tags)
    }

    pub(crate) fn resolve(
        &self,
        resolver: &Resolver,
        stack: &mut ResolveStack,
    ) -> Result<Resolution> {
        let mut out = Resolution::default();
        out.tags.extend(self.tags());

        // Play sections are not shared, so they are expanded without the
        // per-instance memo.
        for section in TASK_SECTIONS {
            let sequence = self.task_section(section);
            out.extend(&expand_nodes(resolver, &self.base_dir, sequence.nodes(), stack)?);
        }

        for invocation in self.roles(resolver.base_dir()) {
            out.extend(&invocation.resolve(resolver, stack)?);
        }

        if let Some(file) = self.import_playbook() {
            if file.contains("{{") {
                debug!(file = %file, "skipping templated playbook import");
            } else {
                let path = self.base_dir.join(&file);
                match Playbook::load(resolver, &path) {
                    Ok(playbook) => out.extend(&playbook.resolve(resolver, stack)?),
                    Err(e) => absorb(e, &path)?,
                }
            }
        }

        Ok(out)
    }
}

/// A playbook document.
#[derive(Debug, Clone)]
pub struct Playbook {
    path: PathBuf,
    base_dir: PathBuf,
    plays: Vec<Play>,
}

impl Playbook {
    /// Load the playbook at `path` through the resolver's loader.
    ///
    /// Unlike task files and roles, a missing or malformed playbook is an
    /// error; callers below the root decide whether to absorb it.
    pub fn load(resolver: &Resolver, path: &Path) -> Result<Self> {
        let document = resolver.loader().load(path)?;
        Self::from_document(path, &document)
    }

    /// Build a playbook from a deserialized document.
    ///
    /// A list is a sequence of plays, a single mapping is one play and an
    /// empty document has no plays.
    pub fn from_document(path: &Path, document: &Value) -> Result<Self> {
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let plays = match document {
            Value::Null => Vec::new(),
            Value::Mapping(map) => vec![Play::new(map.clone(), &base_dir)],
            Value::Sequence(entries) => {
                let mut plays = Vec::with_capacity(entries.len());
                for entry in entries {
                    match entry {
                        Value::Mapping(map) => plays.push(Play::new(map.clone(), &base_dir)),
                        other => {
                            return Err(Error::invalid_structure(
                                path,
                                format!("expected a play mapping, found {:?}", other),
                            ))
                        }
                    }
                }
                plays
            }
            _ => {
                return Err(Error::invalid_structure(
                    path,
                    "a playbook must contain a list of plays",
                ))
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            base_dir,
            plays,
        })
    }

    /// Source file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory of the source file
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Plays in document order
    pub fn plays(&self) -> &[Play] {
        &self.plays
    }

    /// All leaf tasks of every play, in order
    pub fn find_all_tasks(&self, resolver: &Resolver) -> Result<Vec<TaskNode>> {
        Ok(self.resolve(resolver, &mut ResolveStack::new())?.tasks)
    }

    /// Union of the tags of every play
    pub fn find_all_tags(&self, resolver: &Resolver) -> Result<BTreeSet<String>> {
        Ok(self.resolve(resolver, &mut ResolveStack::new())?.tags)
    }

    pub(crate) fn resolve(
        &self,
        resolver: &Resolver,
        stack: &mut ResolveStack,
    ) -> Result<Resolution> {
        let path = std::path::absolute(&self.path).unwrap_or_else(|_| self.path.clone());
        stack.within(Frame::Playbook(path), |stack| {
            let mut out = Resolution::default();
            for play in &self.plays {
                out.extend(&play.resolve(resolver, stack)?);
            }
            Ok(out)
        })
    }
}
