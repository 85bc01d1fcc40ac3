//! The resolution context.
//!
//! A [`Resolver`] owns everything that lives for the duration of one analysis
//! run: the document loader, the resolution options and the task-file and
//! role caches. Every component that needs to load or expand something is
//! handed the resolver explicitly, so two resolvers in one process never
//! share state.
//!
//! # Example
//!
//! ```rust,no_run
//! use playscan::resolver::Resolver;
//!
//! let resolver = Resolver::new("deploy");
//! let tags = resolver.find_all_tags("deploy/site.yml")?;
//! println!("{}", tags.into_iter().collect::<Vec<_>>().join(" "));
//! # Ok::<(), playscan::error::Error>(())
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

use crate::cache::{RoleCache, RoleKey, TaskFileCache, TaskFileKey};
use crate::error::{Error, Result};
use crate::loader::{DocumentLoader, YamlLoader};
use crate::playbook::Playbook;
use crate::roles::Role;
use crate::sequence::TaskSequence;
use crate::task::TaskNode;

/// Which sections of a `block` count as reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockPolicy {
    /// `block`, `rescue` and `always`
    #[default]
    #[serde(alias = "all-sections")]
    All,
    /// Only the `block` section
    BlockOnly,
}

impl BlockPolicy {
    /// Section keys to expand, in order
    pub fn sections(self) -> &'static [&'static str] {
        match self {
            BlockPolicy::All => &["block", "rescue", "always"],
            BlockPolicy::BlockOnly => &["block"],
        }
    }
}

impl std::str::FromStr for BlockPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" | "all-sections" => Ok(BlockPolicy::All),
            "block-only" | "block_only" | "block" => Ok(BlockPolicy::BlockOnly),
            other => Err(format!("unknown block policy '{}'", other)),
        }
    }
}

/// Options controlling how references are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Which block sections are expanded
    pub block_policy: BlockPolicy,
    /// Extra directories searched for roles after `<base>/roles`
    pub roles_path: Vec<PathBuf>,
    /// Extensions tried for `main` entry files, in order
    pub extensions: Vec<String>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            block_policy: BlockPolicy::All,
            roles_path: Vec::new(),
            extensions: vec!["yml".to_string(), "yaml".to_string()],
        }
    }
}

/// Which files a directory scan picks up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Accepted file extensions
    pub extensions: Vec<String>,
    /// Skip files whose stem contains this string
    pub skip_stem_containing: Option<String>,
    /// Skip dot files
    pub skip_hidden: bool,
    /// Resolve files on the rayon thread pool
    pub parallel: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["yml".to_string(), "yaml".to_string()],
            skip_stem_containing: Some("test".to_string()),
            skip_hidden: true,
            parallel: false,
        }
    }
}

impl ScanOptions {
    /// Whether `path` is a playbook candidate
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if self.skip_hidden && file_name.starts_with('.') {
            return false;
        }
        let extension_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext));
        if !extension_ok {
            return false;
        }
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        match &self.skip_stem_containing {
            Some(needle) if !needle.is_empty() => !stem.contains(needle.as_str()),
            _ => true,
        }
    }
}

/// Flattened tasks and reachable tags of some resolved unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Leaf tasks in execution order
    pub tasks: Vec<TaskNode>,
    /// All reachable tags
    pub tags: BTreeSet<String>,
}

impl Resolution {
    /// Append another resolution after this one
    pub fn extend(&mut self, other: &Resolution) {
        self.tasks.extend(other.tasks.iter().cloned());
        self.tags.extend(other.tags.iter().cloned());
    }
}

/// A unit currently being resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A task file
    TaskFile(PathBuf),
    /// A role entered through one of its task files
    Role {
        /// Role name
        name: String,
        /// Role directory
        path: PathBuf,
        /// Stem of the entry task file, `main` unless `tasks_from` was given
        entry: String,
    },
    /// A playbook
    Playbook(PathBuf),
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::TaskFile(path) => write!(f, "tasks {}", path.display()),
            Frame::Role { name, entry, .. } if entry == "main" => write!(f, "role {}", name),
            Frame::Role { name, entry, .. } => write!(f, "role {} (tasks_from {})", name, entry),
            Frame::Playbook(path) => write!(f, "playbook {}", path.display()),
        }
    }
}

/// The chain of units being resolved, used to detect cycles.
#[derive(Debug, Default)]
pub struct ResolveStack {
    frames: Vec<Frame>,
}

impl ResolveStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Current depth
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Run `f` with `frame` pushed, failing if `frame` is already on the stack
    pub fn within<T>(
        &mut self,
        frame: Frame,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if let Some(pos) = self.frames.iter().position(|existing| *existing == frame) {
            let chain = self.frames[pos..]
                .iter()
                .chain(std::iter::once(&frame))
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(Error::CyclicDependency { chain });
        }

        self.frames.push(frame);
        let result = f(self);
        self.frames.pop();
        result
    }
}

/// Outcome of scanning a directory of playbooks.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Playbooks that resolved, in file name order
    pub resolved: Vec<(PathBuf, Resolution)>,
    /// Playbooks that failed and were skipped
    pub failed: Vec<(PathBuf, Error)>,
}

impl ScanReport {
    /// Every task of every resolved playbook, in file order
    pub fn all_tasks(&self) -> Vec<TaskNode> {
        self.resolved
            .iter()
            .flat_map(|(_, resolution)| resolution.tasks.iter().cloned())
            .collect()
    }

    /// Union of all tags of every resolved playbook
    pub fn all_tags(&self) -> BTreeSet<String> {
        self.resolved
            .iter()
            .flat_map(|(_, resolution)| resolution.tags.iter().cloned())
            .collect()
    }
}

/// The resolution context: loader, options and caches.
pub struct Resolver {
    base_dir: PathBuf,
    loader: Arc<dyn DocumentLoader>,
    options: ResolveOptions,
    task_files: TaskFileCache,
    roles: RoleCache,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("base_dir", &self.base_dir)
            .field("options", &self.options)
            .field("task_files", &self.task_files)
            .field("roles", &self.roles)
            .finish()
    }
}

impl Resolver {
    /// Create a resolver for the project rooted at `base_dir`.
    ///
    /// Roles referenced from playbooks are looked up in `<base_dir>/roles`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            loader: Arc::new(YamlLoader::new()),
            options: ResolveOptions::default(),
            task_files: TaskFileCache::new(),
            roles: RoleCache::new(),
        }
    }

    /// Use a different document loader
    pub fn with_loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Use different resolution options
    pub fn with_options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }

    /// Project base directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolution options
    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    /// Document loader
    pub fn loader(&self) -> &dyn DocumentLoader {
        self.loader.as_ref()
    }

    /// Parsed task files
    pub fn task_file_cache(&self) -> &TaskFileCache {
        &self.task_files
    }

    /// Loaded roles
    pub fn role_cache(&self) -> &RoleCache {
        &self.roles
    }

    /// Load a playbook; a missing or malformed root file is an error
    pub fn load_playbook(&self, path: impl AsRef<Path>) -> Result<Playbook> {
        Playbook::load(self, path.as_ref())
    }

    /// Flattened tasks and tags of the playbook at `path`
    pub fn resolve_playbook(&self, path: impl AsRef<Path>) -> Result<Resolution> {
        let playbook = self.load_playbook(path)?;
        let resolution = playbook.resolve(self, &mut ResolveStack::new())?;
        debug!(
            tasks = resolution.tasks.len(),
            tags = resolution.tags.len(),
            files = %self.task_files.metrics().summary(),
            roles = %self.roles.metrics().summary(),
            "resolved playbook"
        );
        Ok(resolution)
    }

    /// Every tag reachable from the playbook at `path`
    pub fn find_all_tags(&self, path: impl AsRef<Path>) -> Result<BTreeSet<String>> {
        Ok(self.resolve_playbook(path)?.tags)
    }

    /// Every leaf task reachable from the playbook at `path`, in order
    pub fn find_all_tasks(&self, path: impl AsRef<Path>) -> Result<Vec<TaskNode>> {
        Ok(self.resolve_playbook(path)?.tasks)
    }

    /// The task file `file` relative to `base_dir`, parsed once per resolver
    pub fn task_file(&self, base_dir: &Path, file: &str) -> Result<Arc<TaskSequence>> {
        let key = TaskFileKey::new(base_dir, file);
        self.task_files.get_or_load(&key, || {
            let path = key.path();
            let document = self.loader.load(&path)?;
            TaskSequence::from_document(&path, &document)
        })
    }

    /// The task file `stem` in `dir`, trying each configured extension when
    /// `stem` has none
    pub fn task_file_with_extensions(&self, dir: &Path, stem: &str) -> Result<Arc<TaskSequence>> {
        let mut last = None;
        for candidate in self.candidates(stem) {
            match self.task_file(dir, &candidate) {
                Err(e) if e.is_not_found() => last = Some(e),
                other => return other,
            }
        }
        Err(last.unwrap_or_else(|| Error::FileNotFound(dir.join(stem))))
    }

    /// Load `<dir>/<stem>.<ext>` as a raw document, trying each extension
    pub(crate) fn document_with_extensions(
        &self,
        dir: &Path,
        stem: &str,
    ) -> Result<(PathBuf, serde_yaml::Value)> {
        let mut last = None;
        for candidate in self.candidates(stem) {
            let path = dir.join(&candidate);
            match self.loader.load(&path) {
                Ok(document) => return Ok((path, document)),
                Err(e) if e.is_not_found() => last = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or_else(|| Error::FileNotFound(dir.join(stem))))
    }

    fn candidates(&self, stem: &str) -> Vec<String> {
        if Path::new(stem).extension().is_some() || self.options.extensions.is_empty() {
            vec![stem.to_string()]
        } else {
            self.options
                .extensions
                .iter()
                .map(|ext| format!("{}.{}", stem, ext))
                .collect()
        }
    }

    /// The role `name` under `base_dir`, loaded once per resolver
    pub fn role(&self, base_dir: &Path, name: &str) -> Result<Arc<Role>> {
        let key = RoleKey::new(base_dir, name);
        self.roles
            .get_or_load(&key, || Role::load(self, &key.base_dir, name))
    }

    /// Directory of role `name`: `<base_dir>/roles/<name>`, else the first
    /// configured search directory that has it, else the default location
    pub fn locate_role(&self, base_dir: &Path, name: &str) -> PathBuf {
        let default = base_dir.join("roles").join(name);
        if self.loader.is_dir(&default) {
            return default;
        }
        self.options
            .roles_path
            .iter()
            .map(|dir| dir.join(name))
            .find(|dir| self.loader.is_dir(dir))
            .unwrap_or(default)
    }

    /// Expand an included task file, treating a missing or broken file as
    /// empty
    pub(crate) fn include_tasks(
        &self,
        base_dir: &Path,
        file: &str,
        stack: &mut ResolveStack,
    ) -> Result<Arc<Resolution>> {
        if self.task_files.has_failed(&TaskFileKey::new(base_dir, file)) {
            trace!(file, base = %base_dir.display(), "previously unreadable, contributes nothing");
            return Ok(Arc::default());
        }
        match self.task_file(base_dir, file) {
            Ok(sequence) => self.resolve_file(&sequence, stack),
            Err(e) => {
                absorb(e, &base_dir.join(file))?;
                Ok(Arc::default())
            }
        }
    }

    /// Expand a sequence read from a file, guarding against include cycles
    pub(crate) fn resolve_file(
        &self,
        sequence: &TaskSequence,
        stack: &mut ResolveStack,
    ) -> Result<Arc<Resolution>> {
        match sequence.source() {
            Some(path) => stack.within(Frame::TaskFile(path.to_path_buf()), |stack| {
                sequence.resolve(self, stack)
            }),
            None => sequence.resolve(self, stack),
        }
    }

    /// Resolve every playbook directly inside `dir`.
    ///
    /// Files that fail to load or resolve are logged and reported in
    /// [`ScanReport::failed`]; the scan continues.
    pub fn scan_directory(&self, dir: &Path, scan: &ScanOptions) -> Result<ScanReport> {
        let mut candidates = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| match e.into_io_error() {
                Some(io) => Error::Io(io),
                None => Error::invalid_structure(dir, "directory walk failed"),
            })?;
            if entry.file_type().is_file() && scan.accepts(entry.path()) {
                candidates.push(entry.into_path());
            }
        }
        info!(dir = %dir.display(), files = candidates.len(), "scanning playbooks");

        let outcomes: Vec<(PathBuf, Result<Resolution>)> = if scan.parallel {
            candidates
                .into_par_iter()
                .map(|path| {
                    let outcome = self.resolve_playbook(&path);
                    (path, outcome)
                })
                .collect()
        } else {
            candidates
                .into_iter()
                .map(|path| {
                    let outcome = self.resolve_playbook(&path);
                    (path, outcome)
                })
                .collect()
        };

        let mut report = ScanReport::default();
        for (path, outcome) in outcomes {
            match outcome {
                Ok(resolution) => report.resolved.push((path, resolution)),
                Err(e) => {
                    debug!(file = %path.display(), error = %e, "failed to resolve playbook, skipping");
                    report.failed.push((path, e));
                }
            }
        }
        Ok(report)
    }
}

/// Swallow errors that mean "this file contributes nothing".
pub(crate) fn absorb(error: Error, path: &Path) -> Result<()> {
    match error {
        Error::FileNotFound(_) => {
            debug!(path = %path.display(), "file not found, contributes nothing");
            Ok(())
        }
        e if e.is_recoverable() => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable file");
            Ok(())
        }
        e => Err(e),
    }
}
