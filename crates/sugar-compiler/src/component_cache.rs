//! Parsed component templates shared across compiles.

use crate::error::CompileError;
use crate::loader::TemplateLoader;
use camino::Utf8Path;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use sugar_parser::{parse_with_options, Ast, ParseOptions};

/// One cache entry; its lock is held while the template is first parsed.
type Slot = Arc<Mutex<Option<Arc<Ast>>>>;

/// Caches component ASTs by component name and template path.
///
/// Entries are immutable: expansion imports a copy of the cached tree, so a
/// failed expansion never affects later lookups. Templates that fail to parse
/// are not cached. Concurrent first lookups of the same component wait for a
/// single parse.
#[derive(Debug, Default)]
pub struct ComponentCache {
    entries: Mutex<FxHashMap<String, Slot>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ComponentCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str, path: &Utf8Path) -> String {
        format!("{name}@{path}")
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<String, Slot>> {
        // entries are only ever inserted whole, so a poisoned map is still valid
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the parsed template for a component, parsing it on first use.
    pub fn get_or_parse(
        &self,
        name: &str,
        path: &Utf8Path,
        loader: &dyn TemplateLoader,
        options: &ParseOptions,
    ) -> Result<Arc<Ast>, CompileError> {
        let slot = Arc::clone(self.lock().entry(Self::key(name, path)).or_default());
        let mut entry = slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(ast) = entry.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(ast));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(component = name, %path, "parsing component");
        let file = loader.load(path)?;
        let result = parse_with_options(Arc::clone(&file), options);
        if let Some(error) = result.errors.first() {
            return Err(CompileError::from_parse(&file, error));
        }

        let ast = Arc::new(result.ast);
        *entry = Some(Arc::clone(&ast));
        Ok(ast)
    }

    /// Drops every entry parsed from `path`. Returns the number removed.
    pub fn invalidate(&self, path: &Utf8Path) -> usize {
        let suffix = format!("@{path}");
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.ends_with(&suffix));
        before - entries.len()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Returns the number of cached components.
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| slot.lock().unwrap_or_else(|e| e.into_inner()).is_some())
            .count()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of lookups served from the cache.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of lookups that had to parse.
    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryTemplateLoader;
    use pretty_assertions::assert_eq;

    fn loader() -> MemoryTemplateLoader {
        MemoryTemplateLoader::new()
            .with_template("components/button.sugar.php", "<button><?= $slot ?></button>")
            .with_template("components/broken.sugar.php", "<div><?= $x </div>")
    }

    #[test]
    fn test_second_lookup_hits() {
        let cache = ComponentCache::new();
        let loader = loader();
        let path = Utf8Path::new("components/button.sugar.php");
        let first = cache.get_or_parse("button", path, &loader, &ParseOptions::default());
        let second = cache.get_or_parse("button", path, &loader, &ParseOptions::default());
        assert!(matches!((&first, &second), (Ok(a), Ok(b)) if Arc::ptr_eq(a, b)));
        assert_eq!((cache.misses(), cache.hits()), (1, 1));
    }

    #[test]
    fn test_parse_failure_not_cached() {
        let cache = ComponentCache::new();
        let loader = loader();
        let path = Utf8Path::new("components/broken.sugar.php");
        assert!(cache
            .get_or_parse("broken", path, &loader, &ParseOptions::default())
            .is_err());
        assert!(cache.is_empty());
        assert!(cache
            .get_or_parse("broken", path, &loader, &ParseOptions::default())
            .is_err());
        assert_eq!(cache.misses(), 2);
    }

    #[test]
    fn test_invalidate_by_path() {
        let cache = ComponentCache::new();
        let loader = loader();
        let path = Utf8Path::new("components/button.sugar.php");
        assert!(cache
            .get_or_parse("button", path, &loader, &ParseOptions::default())
            .is_ok());
        assert_eq!(cache.invalidate(Utf8Path::new("components/other.sugar.php")), 0);
        assert_eq!(cache.invalidate(path), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_first_lookups_parse_once() {
        let cache = ComponentCache::new();
        let loader = loader();
        let path = Utf8Path::new("components/button.sugar.php");
        let parsed: Vec<Arc<Ast>> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| cache.get_or_parse("button", path, &loader, &ParseOptions::default())))
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().expect("worker panicked").expect("parse"))
                .collect()
        });
        assert_eq!((cache.misses(), cache.hits()), (1, 7));
        assert!(parsed.iter().all(|ast| Arc::ptr_eq(ast, &parsed[0])));
        assert_eq!(cache.len(), 1);
    }
}
