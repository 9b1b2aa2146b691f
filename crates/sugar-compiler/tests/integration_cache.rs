//! Integration tests for the compiled-output cache.
//!
//! Templates are compiled from a temporary directory, stored with their
//! dependencies, and invalidated the way the watcher does when a layout,
//! partial or component changes.

use camino::{Utf8Path, Utf8PathBuf};
use pretty_assertions::assert_eq;
use std::fs;
use std::sync::Arc;
use sugar_compiler::{
    now_millis, CacheMetadata, CompiledTemplate, Compiler, FileCache, FileTemplateLoader,
    TemplateCache,
};
use tempfile::TempDir;

fn write(root: &Utf8Path, path: &str, text: &str) {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).expect("create template dir");
    }
    fs::write(full, text).expect("write template");
}

fn project() -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().join("templates")).expect("utf-8 temp dir");
    write(&root, "layouts/base.sugar.php", "<main s:block=\"content\">Default</main>");
    write(&root, "components/badge.sugar.php", "<span class=\"badge\"><?= $slot ?></span>");
    write(
        &root,
        "pages/home.sugar.php",
        "<s-template s:extends=\"../layouts/base\"><main s:block=\"content\"><s-badge>New</s-badge></main></s-template>",
    );
    write(
        &root,
        "pages/about.sugar.php",
        "<s-template s:extends=\"/layouts/base\"><s-template s:block=\"content\">About</s-template></s-template>",
    );
    write(&root, "pages/plain.sugar.php", "<p>plain</p>");
    (dir, root)
}

fn store(cache: &FileCache, compiled: &CompiledTemplate) {
    let metadata = CacheMetadata {
        dependencies: compiled.dependencies.clone(),
        components: compiled.components.iter().map(ToString::to_string).collect(),
        source_timestamp: now_millis(),
        compiled_timestamp: now_millis(),
    };
    cache
        .put(compiled.path.as_str(), &compiled.code, metadata)
        .expect("store compiled template");
}

fn compile_all(root: &Utf8Path, cache: &FileCache) {
    let compiler = Compiler::new(Arc::new(FileTemplateLoader::new(root)));
    for page in ["pages/home.sugar.php", "pages/about.sugar.php", "pages/plain.sugar.php"] {
        let compiled = compiler.compile(page).expect("compile page");
        store(cache, &compiled);
    }
}

#[test]
fn layout_change_invalidates_every_page_extending_it() {
    let (dir, root) = project();
    let cache = FileCache::open(Utf8PathBuf::from_path_buf(dir.path().join("cache")).expect("utf-8"))
        .expect("open cache");
    compile_all(&root, &cache);
    assert_eq!(cache.len(), 3);

    let mut removed = cache.invalidate("layouts/base.sugar.php").expect("invalidate");
    removed.sort();
    assert_eq!(removed, vec!["pages/about.sugar.php", "pages/home.sugar.php"]);
    assert_eq!(cache.keys(), vec!["pages/plain.sugar.php".to_string()]);
}

#[test]
fn component_change_invalidates_only_its_users() {
    let (dir, root) = project();
    let cache = FileCache::open(Utf8PathBuf::from_path_buf(dir.path().join("cache")).expect("utf-8"))
        .expect("open cache");
    compile_all(&root, &cache);

    let home = cache.get("pages/home.sugar.php").map(|c| c.metadata.components);
    assert_eq!(home, Some(vec!["badge".to_string()]));

    let removed = cache.invalidate("components/badge.sugar.php").expect("invalidate");
    assert_eq!(removed, vec!["pages/home.sugar.php"]);
    assert!(cache.get("pages/about.sugar.php").is_some());
}

#[test]
fn cached_code_is_fresh_until_a_dependency_changes() {
    let (dir, root) = project();
    let cache = FileCache::open(Utf8PathBuf::from_path_buf(dir.path().join("cache")).expect("utf-8"))
        .expect("open cache");
    compile_all(&root, &cache);
    assert!(cache.is_fresh("pages/about.sugar.php", &root));

    let mut metadata = cache.metadata("pages/about.sugar.php").expect("cached");
    metadata.compiled_timestamp = 0;
    let code = cache.get("pages/about.sugar.php").map(|c| c.code).unwrap_or_default();
    cache.put("pages/about.sugar.php", &code, metadata).expect("store");
    assert!(!cache.is_fresh("pages/about.sugar.php", &root));
}
