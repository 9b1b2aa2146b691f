//! Compiled-output cache.
//!
//! Compiled templates are stored with the set of templates they were built
//! from. Invalidating a template walks those dependency edges backwards so
//! every page that inlined it (directly or through another layout, partial
//! or component) is invalidated too.

use crate::error::CompileError;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

/// Name of the cache index file.
pub const INDEX_FILE: &str = "index.json";

/// What a cached template was compiled from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Templates inlined into the compiled output.
    pub dependencies: Vec<Utf8PathBuf>,
    /// Expanded component names.
    pub components: Vec<String>,
    /// Source modification time, in milliseconds since the epoch.
    pub source_timestamp: u64,
    /// When the template was compiled, in milliseconds since the epoch.
    pub compiled_timestamp: u64,
}

/// A cache hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTemplate {
    pub code: String,
    pub metadata: CacheMetadata,
}

/// Storage for compiled templates keyed by logical template path.
pub trait TemplateCache: Send + Sync {
    /// Returns the cached template for `key`.
    fn get(&self, key: &str) -> Option<CachedTemplate>;

    /// Stores compiled code for `key`.
    fn put(&self, key: &str, code: &str, metadata: CacheMetadata) -> Result<(), CompileError>;

    /// Removes `key` and everything that depends on it, transitively.
    ///
    /// Returns the removed keys in the order they were reached.
    fn invalidate(&self, key: &str) -> Result<Vec<String>, CompileError>;
}

/// Returns the keys depending on `key`, breadth first, each exactly once.
///
/// `key` itself comes first. Cycles and diamonds in the dependency graph are
/// walked with a visited set.
pub fn dependents<'a>(
    entries: impl IntoIterator<Item = (&'a str, &'a CacheMetadata)>,
    key: &str,
) -> Vec<String> {
    let mut reverse: IndexMap<&str, Vec<&str>> = IndexMap::new();
    for (dependent, metadata) in entries {
        for dependency in &metadata.dependencies {
            reverse.entry(dependency.as_str()).or_default().push(dependent);
        }
    }

    let mut visited: IndexSet<String> = IndexSet::new();
    let mut queue = VecDeque::from([key.to_string()]);
    while let Some(current) = queue.pop_front() {
        if !visited.insert(current.clone()) {
            continue;
        }
        for &dependent in reverse.get(current.as_str()).into_iter().flatten() {
            if !visited.contains(dependent) {
                queue.push_back(dependent.to_string());
            }
        }
    }
    visited.into_iter().collect()
}

/// Current time in milliseconds since the epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Modification time of `path` in milliseconds since the epoch.
pub fn modified_millis(path: &Utf8Path) -> Option<u64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    modified
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_millis() as u64)
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheIndex {
    entries: IndexMap<String, CacheMetadata>,
}

/// A cache directory holding `<blake3(key)>.php` files and a JSON index.
#[derive(Debug)]
pub struct FileCache {
    dir: Utf8PathBuf,
    index: Mutex<CacheIndex>,
}

impl FileCache {
    /// Opens (or creates) a cache directory.
    ///
    /// An unreadable index starts the cache empty.
    pub fn open(dir: impl Into<Utf8PathBuf>) -> Result<Self, CompileError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| CompileError::io(&dir, e))?;

        let index_path = dir.join(INDEX_FILE);
        let index = match std::fs::read_to_string(&index_path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|error| {
                tracing::warn!(path = %index_path, %error, "discarding corrupt cache index");
                CacheIndex::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CacheIndex::default(),
            Err(e) => return Err(CompileError::io(&index_path, e)),
        };

        Ok(Self {
            dir,
            index: Mutex::new(index),
        })
    }

    /// Returns the cache directory.
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Returns the file holding the compiled code for `key`.
    pub fn code_path(&self, key: &str) -> Utf8PathBuf {
        let hash = blake3::hash(key.as_bytes());
        self.dir.join(format!("{}.php", hash.to_hex()))
    }

    /// Returns the stored metadata for `key`.
    pub fn metadata(&self, key: &str) -> Option<CacheMetadata> {
        self.lock().entries.get(key).cloned()
    }

    /// Returns every cached key.
    pub fn keys(&self) -> Vec<String> {
        self.lock().entries.keys().cloned().collect()
    }

    /// Returns the number of cached templates.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true when `key` is cached and neither it nor any dependency
    /// changed since it was compiled. Logical paths resolve against `root`.
    pub fn is_fresh(&self, key: &str, root: &Utf8Path) -> bool {
        let Some(metadata) = self.metadata(key) else {
            return false;
        };
        if !self.code_path(key).is_file() {
            return false;
        }
        std::iter::once(Utf8Path::new(key))
            .chain(metadata.dependencies.iter().map(Utf8PathBuf::as_path))
            .all(|path| {
                modified_millis(&root.join(path))
                    .is_some_and(|modified| modified <= metadata.compiled_timestamp)
            })
    }

    /// Removes every entry and code file.
    pub fn clear(&self) -> Result<(), CompileError> {
        let mut index = self.lock();
        for key in index.entries.keys() {
            self.remove_code(key)?;
        }
        index.entries.clear();
        self.persist(&index)
    }

    fn lock(&self) -> MutexGuard<'_, CacheIndex> {
        self.index.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remove_code(&self, key: &str) -> Result<(), CompileError> {
        let path = self.code_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CompileError::io(&path, e)),
        }
    }

    fn persist(&self, index: &CacheIndex) -> Result<(), CompileError> {
        let path = self.dir.join(INDEX_FILE);
        let json = serde_json::to_string_pretty(index)
            .map_err(|e| CompileError::io(&path, std::io::Error::other(e)))?;
        // write then rename so readers never see a partial index
        let tmp = self.dir.join(format!("{INDEX_FILE}.tmp"));
        std::fs::write(&tmp, json).map_err(|e| CompileError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| CompileError::io(&path, e))
    }
}

impl TemplateCache for FileCache {
    fn get(&self, key: &str) -> Option<CachedTemplate> {
        let metadata = self.metadata(key)?;
        let code = std::fs::read_to_string(self.code_path(key)).ok()?;
        Some(CachedTemplate { code, metadata })
    }

    fn put(&self, key: &str, code: &str, metadata: CacheMetadata) -> Result<(), CompileError> {
        let path = self.code_path(key);
        std::fs::write(&path, code).map_err(|e| CompileError::io(&path, e))?;
        let mut index = self.lock();
        index.entries.insert(key.to_string(), metadata);
        self.persist(&index)
    }

    fn invalidate(&self, key: &str) -> Result<Vec<String>, CompileError> {
        let mut index = self.lock();
        let reached = dependents(index.entries.iter().map(|(k, v)| (k.as_str(), v)), key);

        let mut removed = Vec::new();
        for key in reached {
            if index.entries.shift_remove(&key).is_some() {
                self.remove_code(&key)?;
                removed.push(key);
            }
        }
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "invalidated cached templates");
            self.persist(&index)?;
        }
        Ok(removed)
    }
}
