//! # Playscan - Static Reachability Analysis for Playbooks
//!
//! Playscan reads an automation playbook and everything it references (task
//! files, roles, role dependencies, imported playbooks and nested control
//! blocks) and computes the flattened list of actions and the set of tags that
//! a run could reach. Nothing is executed and no templating is evaluated.
//!
//! ## Core Concepts
//!
//! - **Playbooks**: YAML documents holding an ordered list of plays
//! - **Plays**: task lists, role invocations and playbook imports
//! - **Roles**: reusable task bundles with dependencies on other roles
//! - **Task nodes**: actions, include/import directives and `block` constructs
//! - **Tags**: labels on tasks, blocks, plays and role invocations
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      CLI Interface                        │
//! │             (tags / snippets / tasks commands)            │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Resolver                          │
//! │        (options, visited stack, task file + role caches)  │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!         ┌────────────────────┼────────────────────┐
//!         ▼                    ▼                    ▼
//! ┌────────────────┐  ┌────────────────┐  ┌────────────────────┐
//! │   Playbooks    │  │     Roles      │  │   Task sequences   │
//! │   and plays    │  │  (+ meta deps) │  │ (includes, blocks) │
//! └────────────────┘  └────────────────┘  └────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Document loader                       │
//! │                  (serde_yaml, in-memory)                  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use playscan::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let resolver = Resolver::new("deploy");
//!
//!     let tags = resolver.find_all_tags("deploy/site.yml")?;
//!     println!("{}", tags.into_iter().collect::<Vec<_>>().join(" "));
//!
//!     let stats = ArgumentStats::from_tasks(&resolver.find_all_tasks("deploy/site.yml")?);
//!     print!("{}", SnippetCatalog::build(&stats, &SnippetFilter::default()));
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types.

    // Error handling
    pub use crate::error::{Error, Result};

    // Loading
    pub use crate::loader::{DocumentLoader, MemoryLoader, YamlLoader};

    // Resolution
    pub use crate::resolver::{
        BlockPolicy, Resolution, ResolveOptions, Resolver, ScanOptions, ScanReport,
    };

    // Document model
    pub use crate::playbook::{Play, Playbook};
    pub use crate::roles::{Role, RoleInvocation};
    pub use crate::sequence::TaskSequence;
    pub use crate::task::{TaskKind, TaskNode};

    // Statistics
    pub use crate::snippets::{ArgumentStats, SnippetCatalog, SnippetFilter};

    // Caching
    pub use crate::cache::CacheMetrics;
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error types and result aliases.
///
/// [`Error`](error::Error) separates failures that only mean "this file
/// contributes nothing" from those that abort resolution.
pub mod error;

/// Reading configuration documents into YAML values.
pub mod loader;

/// The resolution context and its options.
pub mod resolver;

/// Memoization caches owned by the resolver.
pub mod cache;

// ============================================================================
// Document Model
// ============================================================================

/// Task nodes, action type inference and tag normalization.
pub mod task;

/// Ordered task lists and include/block expansion.
pub mod sequence;

/// Roles, role dependencies and role invocations.
pub mod roles;

/// Plays and playbooks.
pub mod playbook;

// ============================================================================
// Reporting
// ============================================================================

/// Argument usage statistics and snippet rendering.
pub mod snippets;

/// Returns the version of Playscan.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
