//! Memoization caches for the resolution engine.
//!
//! Two caches are owned by every [`Resolver`](crate::resolver::Resolver):
//!
//! - **Task files**: `(absolute base directory, filename)` to the parsed
//!   [`TaskSequence`]. A task file included from many call sites is read and
//!   parsed once, and every call site receives the same `Arc`.
//! - **Roles**: `(base directory, role name)` to the loaded [`Role`].
//!
//! Both are built on [`Memo`], a mutex-guarded map of set-once slots. The map
//! lock is only held long enough to find or create a slot; the slot itself
//! provides single-flight initialization, so concurrent first access to the
//! same key loads it exactly once. [`Memo`] never caches failures; the task
//! file cache remembers recoverable ones separately, so a broken file
//! referenced from many call sites is read and parsed once.

use std::collections::HashMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::{Error, Result};
use crate::roles::Role;
use crate::sequence::TaskSequence;

/// Cache hit/miss counters
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Number of cache hits
    pub hits: AtomicU64,
    /// Number of cache misses
    pub misses: AtomicU64,
}

impl CacheMetrics {
    /// Record a cache hit
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache miss
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        let total = hits + misses;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }

    /// Get summary as a string
    pub fn summary(&self) -> String {
        format!(
            "Hits: {}, Misses: {}, Hit Rate: {:.2}%",
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.hit_rate() * 100.0,
        )
    }
}

/// A keyed set-once memo table.
pub struct Memo<K, V> {
    slots: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
    metrics: CacheMetrics,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            metrics: CacheMetrics::default(),
        }
    }
}

impl<K, V> std::fmt::Debug for Memo<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("slots", &self.slots.lock().len())
            .field("metrics", &self.metrics)
            .finish()
    }
}

impl<K, V> Memo<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty memo table
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the value stored for `key`, running `init` if there is none.
    ///
    /// `init` must not re-enter the same memo with the same key.
    pub fn get_or_try_init<F>(&self, key: &K, init: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        if let Some(value) = slot.get() {
            self.metrics.record_hit();
            return Ok(value.clone());
        }

        self.metrics.record_miss();
        slot.get_or_try_init(init).cloned()
    }

    /// The value stored for `key`, if it has been initialized
    pub fn get(&self, key: &K) -> Option<V> {
        let slot = self.slots.lock().get(key).cloned()?;
        slot.get().cloned()
    }

    /// Number of initialized entries
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    /// True if no entry has been initialized
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit/miss counters
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }
}

/// Key for task file cache entries
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskFileKey {
    /// Absolute directory the filename is relative to
    pub base_dir: PathBuf,
    /// Filename as written at the call site
    pub file: String,
}

impl TaskFileKey {
    /// Create a key, making `base_dir` absolute
    pub fn new(base_dir: &Path, file: impl Into<String>) -> Self {
        Self {
            base_dir: absolute(base_dir),
            file: file.into(),
        }
    }

    /// Full path of the referenced file
    pub fn path(&self) -> PathBuf {
        self.base_dir.join(&self.file)
    }
}

/// Key for role cache entries
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleKey {
    /// Directory containing the `roles/` tree
    pub base_dir: PathBuf,
    /// Role name
    pub name: String,
}

impl RoleKey {
    /// Create a key, making `base_dir` absolute
    pub fn new(base_dir: &Path, name: impl Into<String>) -> Self {
        Self {
            base_dir: absolute(base_dir),
            name: name.into(),
        }
    }
}

/// Parsed task files
#[derive(Debug, Default)]
pub struct TaskFileCache {
    memo: Memo<TaskFileKey, Arc<TaskSequence>>,
    failures: Mutex<HashMap<TaskFileKey, Error>>,
}

impl TaskFileCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached sequence for `key`, loading it with `load` on first use
    pub fn get_or_load<F>(&self, key: &TaskFileKey, load: F) -> Result<Arc<TaskSequence>>
    where
        F: FnOnce() -> Result<TaskSequence>,
    {
        if let Some(failure) = self.failure(key) {
            self.memo.metrics().record_hit();
            return Err(failure);
        }

        let result = self.memo.get_or_try_init(key, || {
            trace!(path = %key.path().display(), "parsing task file");
            load().map(Arc::new)
        });
        if let Err(e) = &result {
            if let Some(failure) = e.try_clone() {
                self.failures.lock().insert(key.clone(), failure);
            }
        }
        result
    }

    /// The cached sequence for `key`, if loaded
    pub fn get(&self, key: &TaskFileKey) -> Option<Arc<TaskSequence>> {
        self.memo.get(key)
    }

    /// The recorded load failure for `key`, if loading it failed before
    pub fn failure(&self, key: &TaskFileKey) -> Option<Error> {
        self.failures.lock().get(key).and_then(Error::try_clone)
    }

    /// True if loading `key` failed before
    pub fn has_failed(&self, key: &TaskFileKey) -> bool {
        self.failures.lock().contains_key(key)
    }

    /// Number of parsed files
    pub fn len(&self) -> usize {
        self.memo.len()
    }

    /// True if nothing has been parsed yet
    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }

    /// Hit/miss counters
    pub fn metrics(&self) -> &CacheMetrics {
        self.memo.metrics()
    }
}

/// Loaded roles
#[derive(Debug, Default)]
pub struct RoleCache {
    memo: Memo<RoleKey, Arc<Role>>,
}

impl RoleCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached role for `key`, loading it with `load` on first use
    pub fn get_or_load<F>(&self, key: &RoleKey, load: F) -> Result<Arc<Role>>
    where
        F: FnOnce() -> Result<Role>,
    {
        self.memo.get_or_try_init(key, || {
            trace!(role = %key.name, base = %key.base_dir.display(), "loading role");
            load().map(Arc::new)
        })
    }

    /// The cached role for `key`, if loaded
    pub fn get(&self, key: &RoleKey) -> Option<Arc<Role>> {
        self.memo.get(key)
    }

    /// Number of loaded roles
    pub fn len(&self) -> usize {
        self.memo.len()
    }

    /// True if no role has been loaded yet
    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }

    /// Hit/miss counters
    pub fn metrics(&self) -> &CacheMetrics {
        self.memo.metrics()
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_memo_initializes_once() {
        let memo: Memo<String, Arc<String>> = Memo::new();
        let calls = AtomicUsize::new(0);
        let key = "site".to_string();

        let first = memo
            .get_or_try_init(&key, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new("value".to_string()))
            })
            .unwrap();
        let second = memo
            .get_or_try_init(&key, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new("other".to_string()))
            })
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(memo.metrics().hits.load(Ordering::Relaxed), 1);
        assert_eq!(memo.metrics().misses.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_memo_does_not_cache_errors() {
        let memo: Memo<u32, u32> = Memo::new();
        let err = memo.get_or_try_init(&1, || Err(Error::FileNotFound(PathBuf::from("x"))));
        assert!(err.is_err());
        assert!(memo.is_empty());

        assert_eq!(memo.get_or_try_init(&1, || Ok(7)).unwrap(), 7);
        assert_eq!(memo.get(&1), Some(7));
        assert_eq!(memo.len(), 1);
    }

    #[test]
    fn test_task_file_failures_are_remembered() {
        let cache = TaskFileCache::new();
        let key = TaskFileKey::new(Path::new("/p/tasks"), "broken.yml");
        let calls = AtomicUsize::new(0);
        let load = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::malformed("/p/tasks/broken.yml", "bad indent"))
        };

        assert!(cache.get_or_load(&key, load).is_err());
        let replayed = cache.get_or_load(&key, load).unwrap_err();
        assert!(matches!(replayed, Error::MalformedConfig { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.has_failed(&key));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_keys_are_value_equal() {
        let a = TaskFileKey::new(Path::new("/srv/play/tasks"), "main.yml");
        let b = TaskFileKey::new(&PathBuf::from("/srv/play/tasks"), String::from("main.yml"));
        assert_eq!(a, b);
        assert_eq!(a.path(), PathBuf::from("/srv/play/tasks/main.yml"));
    }

    #[test]
    fn test_relative_base_made_absolute() {
        let key = RoleKey::new(Path::new("project"), "web");
        assert!(key.base_dir.is_absolute());
    }

    #[test]
    fn test_metrics_summary() {
        let metrics = CacheMetrics::default();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        assert!((metrics.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(metrics.summary(), "Hits: 3, Misses: 1, Hit Rate: 75.00%");
    }
}
