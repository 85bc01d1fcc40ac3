//! Roles and role invocations.
//!
//! A role `R` lives at `<base>/roles/R`. Its own tasks come from
//! `tasks/main.<ext>` and its dependencies from the `dependencies` list in
//! `meta/main.<ext>`. Either file may be absent. Roles are loaded through the
//! resolver's role cache, so a role referenced from many plays or as a
//! dependency of many other roles is parsed once.
//!
//! A [`RoleInvocation`] is one reference to a role: an entry in a play's
//! `roles:` list, in a role's `dependencies:`, or an `include_role` /
//! `import_role` directive. Invocations are never cached; the tags written at
//! the call site belong to the invocation, not to the role.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_yaml::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::resolver::{absorb, Frame, ResolveStack, Resolution, Resolver};
use crate::sequence::TaskSequence;
use crate::task::{scalar_to_string, tags_from_value, TaskNode};

/// Stem of the default task and meta entry files
const MAIN_ENTRY: &str = "main";

/// A loaded role.
#[derive(Debug)]
pub struct Role {
    name: String,
    base_dir: PathBuf,
    path: PathBuf,
    tasks: Option<Arc<TaskSequence>>,
    dependencies: Vec<RoleInvocation>,
    resolved: OnceCell<Arc<Resolution>>,
}

impl Role {
    /// Load role `name` from `base_dir`.
    ///
    /// Missing or unreadable `tasks/main` and `meta/main` files are not
    /// errors; the role simply has no tasks or no dependencies.
    pub fn load(resolver: &Resolver, base_dir: &Path, name: &str) -> Result<Self> {
        let path = resolver.locate_role(base_dir, name);
        if !resolver.loader().is_dir(&path) {
            debug!(role = name, path = %path.display(), "role directory not found");
        }

        let tasks_dir = path.join("tasks");
        let tasks = match resolver.task_file_with_extensions(&tasks_dir, MAIN_ENTRY) {
            Ok(sequence) => Some(sequence),
            Err(e) => {
                absorb(e, &tasks_dir.join(MAIN_ENTRY))?;
                None
            }
        };

        let meta_dir = path.join("meta");
        let dependencies = match resolver.document_with_extensions(&meta_dir, MAIN_ENTRY) {
            Ok((meta_path, document)) => parse_dependencies(&meta_path, &document, base_dir),
            Err(e) => {
                absorb(e, &meta_dir.join(MAIN_ENTRY))?;
                Vec::new()
            }
        };

        Ok(Self {
            name: name.to_string(),
            base_dir: base_dir.to_path_buf(),
            path,
            tasks,
            dependencies,
            resolved: OnceCell::new(),
        })
    }

    /// Role name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory the role was looked up from
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Role directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entry-point task sequence, if the role has one
    pub fn tasks(&self) -> Option<&Arc<TaskSequence>> {
        self.tasks.as_ref()
    }

    /// Declared dependencies, in order
    pub fn dependencies(&self) -> &[RoleInvocation] {
        &self.dependencies
    }

    /// Dependency tasks followed by the role's own tasks
    pub fn find_all_tasks(&self, resolver: &Resolver) -> Result<Vec<TaskNode>> {
        Ok(self.resolve(resolver, &mut ResolveStack::new())?.tasks.clone())
    }

    /// All tags reachable through the role and its dependencies
    pub fn find_all_tags(&self, resolver: &Resolver) -> Result<BTreeSet<String>> {
        Ok(self.resolve(resolver, &mut ResolveStack::new())?.tags.clone())
    }

    pub(crate) fn resolve(
        &self,
        resolver: &Resolver,
        stack: &mut ResolveStack,
    ) -> Result<Arc<Resolution>> {
        if let Some(resolution) = self.resolved.get() {
            return Ok(Arc::clone(resolution));
        }

        let resolution = stack.within(self.frame(MAIN_ENTRY), |stack| {
            let mut out = self.resolve_dependencies(resolver, stack)?;
            if let Some(tasks) = &self.tasks {
                let own = resolver.resolve_file(tasks, stack)?;
                out.extend(&own);
            }
            Ok(out)
        })?;

        Ok(Arc::clone(self.resolved.get_or_init(|| Arc::new(resolution))))
    }

    /// Like [`Role::resolve`] but with `tasks/<tasks_from>` as the entry point
    pub(crate) fn resolve_from(
        &self,
        resolver: &Resolver,
        tasks_from: &str,
        stack: &mut ResolveStack,
    ) -> Result<Resolution> {
        stack.within(self.frame(tasks_from), |stack| {
            let mut out = self.resolve_dependencies(resolver, stack)?;
            let tasks_dir = self.path.join("tasks");
            match resolver.task_file_with_extensions(&tasks_dir, tasks_from) {
                Ok(tasks) => {
                    let own = resolver.resolve_file(&tasks, stack)?;
                    out.extend(&own);
                }
                Err(e) => absorb(e, &tasks_dir.join(tasks_from))?,
            }
            Ok(out)
        })
    }

    fn resolve_dependencies(
        &self,
        resolver: &Resolver,
        stack: &mut ResolveStack,
    ) -> Result<Resolution> {
        let mut out = Resolution::default();
        for dependency in &self.dependencies {
            out.extend(&dependency.resolve(resolver, stack)?);
        }
        Ok(out)
    }

    fn frame(&self, entry: &str) -> Frame {
        Frame::Role {
            name: self.name.clone(),
            path: self.path.clone(),
            entry: entry.to_string(),
        }
    }
}

fn parse_dependencies(path: &Path, document: &Value, base_dir: &Path) -> Vec<RoleInvocation> {
    let entries = match document.get("dependencies") {
        Some(Value::Sequence(entries)) => entries,
        Some(Value::Null) | None => return Vec::new(),
        Some(_) => {
            warn!(path = %path.display(), "'dependencies' is not a list, ignoring");
            return Vec::new();
        }
    };

    entries
        .iter()
        .filter_map(|entry| {
            let invocation = RoleInvocation::from_value(entry, base_dir);
            if invocation.is_none() {
                warn!(path = %path.display(), entry = ?entry, "dependency without a role name");
            }
            invocation
        })
        .collect()
}

/// One reference to a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInvocation {
    name: String,
    tags: BTreeSet<String>,
    base_dir: PathBuf,
    tasks_from: Option<String>,
}

impl RoleInvocation {
    /// Invoke role `name` from `base_dir` with no call-site tags
    pub fn new(name: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            tags: BTreeSet::new(),
            base_dir: base_dir.into(),
            tasks_from: None,
        }
    }

    /// Attach call-site tags
    pub fn with_tags(mut self, tags: BTreeSet<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Use `tasks/<file>` instead of `tasks/main` as the entry point
    pub fn with_tasks_from(mut self, tasks_from: Option<String>) -> Self {
        self.tasks_from = tasks_from;
        self
    }

    /// Parse a `roles:` or `dependencies:` entry.
    ///
    /// Accepts a bare role name or a mapping with `role:` (or `name:`).
    pub fn from_value(value: &Value, base_dir: &Path) -> Option<Self> {
        match value {
            Value::Mapping(map) => {
                let name = map
                    .get("role")
                    .or_else(|| map.get("name"))
                    .and_then(scalar_to_string)?;
                Some(
                    Self::new(name, base_dir)
                        .with_tags(tags_from_value(map.get("tags")))
                        .with_tasks_from(map.get("tasks_from").and_then(scalar_to_string)),
                )
            }
            other => scalar_to_string(other).map(|name| Self::new(name, base_dir)),
        }
    }

    /// Role name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tags written at the call site
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Directory the role is looked up from
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Alternative entry file, if any
    pub fn tasks_from(&self) -> Option<&str> {
        self.tasks_from.as_deref()
    }

    /// The invoked role
    pub fn role(&self, resolver: &Resolver) -> Result<Arc<Role>> {
        resolver.role(&self.base_dir, &self.name)
    }

    /// Tasks of the invoked role
    pub fn find_all_tasks(&self, resolver: &Resolver) -> Result<Vec<TaskNode>> {
        Ok(self.resolve(resolver, &mut ResolveStack::new())?.tasks)
    }

    /// Call-site tags plus every tag reachable through the role
    pub fn find_all_tags(&self, resolver: &Resolver) -> Result<BTreeSet<String>> {
        Ok(self.resolve(resolver, &mut ResolveStack::new())?.tags)
    }

    pub(crate) fn resolve(
        &self,
        resolver: &Resolver,
        stack: &mut ResolveStack,
    ) -> Result<Resolution> {
        let mut out = Resolution::default();
        out.tags.extend(self.tags.iter().cloned());

        if self.name.contains("{{") {
            debug!(role = %self.name, "skipping templated role name");
            return Ok(out);
        }

        let role = self.role(resolver)?;
        match &self.tasks_from {
            Some(tasks_from) => {
                let resolution = role.resolve_from(resolver, tasks_from, stack)?;
                out.extend(&resolution);
            }
            None => {
                let resolution = role.resolve(resolver, stack)?;
                out.extend(&resolution);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::loader::MemoryLoader;
    use pretty_assertions::assert_eq;

    fn resolver(loader: MemoryLoader) -> Resolver {
        Resolver::new("/p").with_loader(Arc::new(loader))
    }

    fn names(tasks: &[TaskNode]) -> Vec<&str> {
        tasks.iter().map(|t| t.name().unwrap_or("?")).collect()
    }

    #[test]
    fn test_invocation_forms() {
        let base = Path::new("/p");
        let bare: Value = serde_yaml::from_str("web").unwrap();
        assert_eq!(RoleInvocation::from_value(&bare, base).unwrap().name(), "web");

        let mapped: Value = serde_yaml::from_str("{role: db, tags: [data, sql]}").unwrap();
        let invocation = RoleInvocation::from_value(&mapped, base).unwrap();
        assert_eq!(invocation.name(), "db");
        assert_eq!(invocation.tags().len(), 2);

        let named: Value = serde_yaml::from_str("{name: cache}").unwrap();
        assert_eq!(RoleInvocation::from_value(&named, base).unwrap().name(), "cache");

        let nameless: Value = serde_yaml::from_str("{tags: x}").unwrap();
        assert!(RoleInvocation::from_value(&nameless, base).is_none());
    }

    #[test]
    fn test_dependencies_precede_own_tasks() {
        let loader = MemoryLoader::new()
            .with_file("/p/roles/p/tasks/main.yml", "- name: T\n  ping:\n")
            .with_file("/p/roles/p/meta/main.yml", "dependencies:\n  - q\n")
            .with_file("/p/roles/q/tasks/main.yml", "- name: Q1\n  ping:\n- name: Q2\n  ping:\n");
        let resolver = resolver(loader);

        let p = resolver.role(Path::new("/p"), "p").unwrap();
        let q = resolver.role(Path::new("/p"), "q").unwrap();

        let mut expected = q.find_all_tasks(&resolver).unwrap();
        expected.extend(
            resolver
                .task_file(Path::new("/p/roles/p/tasks"), "main.yml")
                .unwrap()
                .nodes()
                .iter()
                .cloned(),
        );
        assert_eq!(p.find_all_tasks(&resolver).unwrap(), expected);
        assert_eq!(names(&expected), vec!["Q1", "Q2", "T"]);
    }

    #[test]
    fn test_role_without_task_file() {
        let resolver = resolver(MemoryLoader::new());
        let role = resolver.role(Path::new("/p"), "empty_role").unwrap();
        assert!(role.tasks().is_none());
        assert!(role.find_all_tasks(&resolver).unwrap().is_empty());
        assert!(role.find_all_tags(&resolver).unwrap().is_empty());
    }

    #[test]
    fn test_role_with_only_dependencies() {
        let loader = MemoryLoader::new()
            .with_file("/p/roles/meta_only/meta/main.yml", "dependencies:\n  - {role: base, tags: boot}\n")
            .with_file("/p/roles/base/tasks/main.yml", "- name: B\n  ping:\n  tags: [core]\n");
        let resolver = resolver(loader);

        let role = resolver.role(Path::new("/p"), "meta_only").unwrap();
        assert_eq!(names(&role.find_all_tasks(&resolver).unwrap()), vec!["B"]);
        assert_eq!(
            role.find_all_tags(&resolver).unwrap(),
            BTreeSet::from(["boot".to_string(), "core".to_string()])
        );
    }

    #[test]
    fn test_role_is_memoized() {
        let loader = MemoryLoader::new().with_file("/p/roles/web/tasks/main.yml", "- ping:\n");
        let resolver = resolver(loader);

        let a = resolver.role(Path::new("/p"), "web").unwrap();
        let b = resolver.role(Path::new("/p"), "web").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(resolver.role_cache().len(), 1);
    }

    #[test]
    fn test_role_dependency_cycle() {
        let loader = MemoryLoader::new()
            .with_file("/p/roles/a/meta/main.yml", "dependencies: [b]\n")
            .with_file("/p/roles/b/meta/main.yml", "dependencies: [a]\n");
        let resolver = resolver(loader);

        let role = resolver.role(Path::new("/p"), "a").unwrap();
        match role.find_all_tasks(&resolver) {
            Err(Error::CyclicDependency { chain }) => {
                assert_eq!(chain, "role a -> role b -> role a")
            }
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_diamond_dependencies_are_not_cycles() {
        let loader = MemoryLoader::new()
            .with_file("/p/roles/top/meta/main.yml", "dependencies: [left, right]\n")
            .with_file("/p/roles/left/meta/main.yml", "dependencies: [common]\n")
            .with_file("/p/roles/right/meta/main.yml", "dependencies: [common]\n")
            .with_file("/p/roles/common/tasks/main.yml", "- name: C\n  ping:\n");
        let resolver = resolver(loader);

        let role = resolver.role(Path::new("/p"), "top").unwrap();
        assert_eq!(names(&role.find_all_tasks(&resolver).unwrap()), vec!["C", "C"]);
        assert_eq!(resolver.role_cache().len(), 4);
    }

    #[test]
    fn test_tasks_from_entry_point() {
        let loader = MemoryLoader::new()
            .with_file("/p/roles/web/tasks/main.yml", "- name: main\n  ping:\n")
            .with_file("/p/roles/web/tasks/install.yml", "- name: install\n  ping:\n");
        let resolver = resolver(loader);

        let invocation = RoleInvocation::new("web", "/p").with_tasks_from(Some("install".into()));
        assert_eq!(
            names(&invocation.find_all_tasks(&resolver).unwrap()),
            vec!["install"]
        );
    }

    #[test]
    fn test_role_can_include_its_own_task_file() {
        let loader = MemoryLoader::new()
            .with_file(
                "/p/roles/web/tasks/main.yml",
                "- name: main\n  ping:\n- include_role:\n    name: web\n    tasks_from: helpers\n",
            )
            .with_file("/p/roles/web/tasks/helpers.yml", "- name: helper\n  ping:\n");
        let resolver = resolver(loader);

        let role = resolver.role(Path::new("/p"), "web").unwrap();
        assert_eq!(
            names(&role.find_all_tasks(&resolver).unwrap()),
            vec!["main", "helper"]
        );
    }

    #[test]
    fn test_role_including_itself_from_main_is_a_cycle() {
        let loader = MemoryLoader::new()
            .with_file("/p/roles/web/tasks/main.yml", "- include_role:\n    name: web\n");
        let resolver = resolver(loader);

        let role = resolver.role(Path::new("/p"), "web").unwrap();
        assert!(matches!(
            role.find_all_tasks(&resolver),
            Err(Error::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_malformed_meta_means_no_dependencies() {
        let loader = MemoryLoader::new()
            .with_file("/p/roles/web/meta/main.yml", "dependencies: [unclosed\n")
            .with_file("/p/roles/web/tasks/main.yml", "- name: W\n  ping:\n");
        let resolver = resolver(loader);

        let role = resolver.role(Path::new("/p"), "web").unwrap();
        assert!(role.dependencies().is_empty());
        assert_eq!(names(&role.find_all_tasks(&resolver).unwrap()), vec!["W"]);
    }
}
