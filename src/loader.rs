//! Document loading.
//!
//! The resolution engine never touches the filesystem directly. Every file it
//! needs goes through a [`DocumentLoader`], which turns a path into a generic
//! YAML tree or fails with [`Error::FileNotFound`] / [`Error::MalformedConfig`].

use crate::error::{Error, Result};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_yaml::Value;
use std::path::{Path, PathBuf};

/// Parses one file into a generic tree.
pub trait DocumentLoader: Send + Sync {
    /// Load and deserialize the document at `path`.
    fn load(&self, path: &Path) -> Result<Value>;

    /// Whether a directory exists at `path`.
    fn is_dir(&self, path: &Path) -> bool;
}

/// Reads YAML files from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlLoader;

impl YamlLoader {
    /// Create a new loader
    pub fn new() -> Self {
        Self
    }
}

impl DocumentLoader for YamlLoader {
    fn load(&self, path: &Path) -> Result<Value> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::FileNotFound(path.to_path_buf()));
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(Error::malformed(path, "file is not valid UTF-8"));
            }
            Err(e) => return Err(Error::Io(e)),
        };
        parse_document(path, &content)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

/// In-memory documents keyed by path.
///
/// Useful for embedding the resolver where playbooks do not live on disk.
/// Directories are implied by the stored file paths.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    files: RwLock<IndexMap<PathBuf, String>>,
}

impl MemoryLoader {
    /// Create an empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document, replacing any previous content at the same path
    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.write().insert(path.into(), content.into());
    }

    /// Builder-style variant of [`MemoryLoader::insert`]
    pub fn with_file(self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }
}

impl DocumentLoader for MemoryLoader {
    fn load(&self, path: &Path) -> Result<Value> {
        let files = self.files.read();
        let content = files
            .get(path)
            .ok_or_else(|| Error::FileNotFound(path.to_path_buf()))?;
        parse_document(path, content)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.files
            .read()
            .keys()
            .any(|file| file != path && file.starts_with(path))
    }
}

/// Deserialize YAML text, attributing failures to `path`.
pub fn parse_document(path: &Path, content: &str) -> Result<Value> {
    if content.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_yaml::from_str(content).map_err(|e| Error::malformed(path, e.to_string()))
}
