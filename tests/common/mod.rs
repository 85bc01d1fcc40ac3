//! Shared test utilities and fixtures for the Playscan test suite.
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use playscan::resolver::{ResolveOptions, Resolver};

/// A project tree in a temporary directory.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    /// Create an empty project
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    /// Write `content` to `relative`, creating parent directories
    pub fn file(&self, relative: &str, content: &str) -> &Self {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(&path, content).expect("write fixture");
        self
    }

    /// Write a role's `tasks/main.yml`
    pub fn role_tasks(&self, role: &str, content: &str) -> &Self {
        self.file(&format!("roles/{}/tasks/main.yml", role), content)
    }

    /// Write a role's `meta/main.yml`
    pub fn role_meta(&self, role: &str, content: &str) -> &Self {
        self.file(&format!("roles/{}/meta/main.yml", role), content)
    }

    /// Create an empty directory
    pub fn dir(&self, relative: &str) -> &Self {
        std::fs::create_dir_all(self.path(relative)).expect("create dir");
        self
    }

    /// Absolute path of `relative`
    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Project root
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// A resolver rooted at the project
    pub fn resolver(&self) -> Resolver {
        Resolver::new(self.root())
    }

    /// A resolver rooted at the project with custom options
    pub fn resolver_with(&self, options: ResolveOptions) -> Resolver {
        Resolver::new(self.root()).with_options(options)
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Task names, `?` for unnamed tasks
pub fn names(tasks: &[playscan::task::TaskNode]) -> Vec<String> {
    tasks
        .iter()
        .map(|t| t.name().unwrap_or("?").to_string())
        .collect()
}

/// Build a tag set from string literals
pub fn tags(items: &[&str]) -> std::collections::BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}
