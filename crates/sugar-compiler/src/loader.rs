//! Template loaders.
//!
//! Templates are addressed by logical paths relative to the loader root
//! (`pages/home.sugar.php`). References written inside templates
//! (`s:extends="../layouts/base"`) are resolved against the referring
//! template, or against the root when they start with `/`.

use crate::config::DEFAULT_SUFFIX;
use crate::error::{CompileError, ErrorKind};
use crate::suggest::did_you_mean;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use smol_str::SmolStr;
use source_map::SourceFile;
use std::sync::{Arc, Mutex};
use walkdir::WalkDir;

/// Loads template sources and discovers components.
pub trait TemplateLoader: Send + Sync {
    /// Template file suffix (`.sugar.php`).
    fn suffix(&self) -> &str;

    /// Returns true if a template exists at the logical path.
    fn exists(&self, path: &Utf8Path) -> bool;

    /// Loads a template by logical path.
    fn load(&self, path: &Utf8Path) -> Result<Arc<SourceFile>, CompileError>;

    /// Returns discovered components, name to logical path.
    fn components(&self) -> IndexMap<SmolStr, Utf8PathBuf>;

    /// Returns every known template path.
    fn templates(&self) -> Vec<Utf8PathBuf>;

    /// Resolves a reference written in `from` to a logical path.
    ///
    /// Tries the path as written, then with the suffix appended.
    fn resolve(&self, reference: &str, from: &Utf8Path) -> Result<Utf8PathBuf, CompileError> {
        let reference = reference.trim();
        let joined = match reference.strip_prefix('/') {
            Some(rooted) => Utf8PathBuf::from(rooted),
            None => from
                .parent()
                .map(|dir| dir.join(reference))
                .unwrap_or_else(|| Utf8PathBuf::from(reference)),
        };
        let base = normalize(&joined);
        let suffix = self.suffix();

        let mut candidates = vec![base.clone()];
        if !base.as_str().ends_with(suffix) {
            candidates.push(Utf8PathBuf::from(format!("{base}{suffix}")));
        }
        if let Some(found) = candidates.into_iter().find(|c| self.exists(c)) {
            return Ok(found);
        }

        let known: Vec<String> = self
            .templates()
            .iter()
            .map(|t| t.as_str().trim_end_matches(suffix).to_string())
            .collect();
        let wanted = base.as_str().trim_end_matches(suffix);
        Err(CompileError::new(ErrorKind::TemplateNotFound {
            path: reference.to_string(),
            suggestion: did_you_mean(wanted, known.iter().map(String::as_str)),
        }))
    }
}

/// Collapses `.` and `..` components of a logical path.
pub fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.components() {
        match component {
            Utf8Component::Normal(part) => parts.push(part),
            Utf8Component::ParentDir => {
                parts.pop();
            }
            Utf8Component::CurDir | Utf8Component::RootDir | Utf8Component::Prefix(_) => {}
        }
    }
    parts.join("/").into()
}

/// Returns the component name for a template file (`button.sugar.php` →
/// `button`).
fn component_name(path: &Utf8Path, suffix: &str) -> Option<SmolStr> {
    let file = path.file_name()?.strip_suffix(suffix)?;
    (!file.is_empty()).then(|| SmolStr::new(file))
}

fn discover_components<'a>(
    templates: impl IntoIterator<Item = &'a Utf8PathBuf>,
    component_dirs: &[Utf8PathBuf],
    suffix: &str,
) -> IndexMap<SmolStr, Utf8PathBuf> {
    let templates: Vec<&Utf8PathBuf> = templates.into_iter().collect();
    let mut components = IndexMap::new();
    for dir in component_dirs {
        for path in templates.iter().filter(|p| p.starts_with(dir)) {
            if let Some(name) = component_name(path, suffix) {
                // first directory wins
                components.entry(name).or_insert_with(|| (*path).clone());
            }
        }
    }
    components
}

/// Loads templates from a directory tree.
#[derive(Debug)]
pub struct FileTemplateLoader {
    root: Utf8PathBuf,
    suffix: String,
    component_dirs: Vec<Utf8PathBuf>,
    discovered: Mutex<Option<Vec<Utf8PathBuf>>>,
}

impl FileTemplateLoader {
    /// Creates a loader rooted at `root` with the default suffix and a
    /// `components` directory.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            suffix: DEFAULT_SUFFIX.to_string(),
            component_dirs: vec![Utf8PathBuf::from("components")],
            discovered: Mutex::new(None),
        }
    }

    /// Sets the template suffix.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Sets the component directories, relative to the root.
    pub fn with_component_dirs(mut self, dirs: impl IntoIterator<Item = impl Into<Utf8PathBuf>>) -> Self {
        self.component_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the filesystem path of a logical path.
    pub fn full_path(&self, path: &Utf8Path) -> Utf8PathBuf {
        self.root.join(path)
    }

    /// Returns the logical path of a file under the root.
    pub fn logical_path(&self, file: &Utf8Path) -> Option<Utf8PathBuf> {
        file.strip_prefix(&self.root).ok().map(normalize)
    }

    /// Forgets discovered templates so the next lookup walks the tree again.
    pub fn rescan(&self) {
        *self.discovered.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn scan(&self) -> Vec<Utf8PathBuf> {
        let mut found: Vec<Utf8PathBuf> = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.into_path()).ok())
            .filter(|path| path.as_str().ends_with(&self.suffix))
            .filter_map(|path| self.logical_path(&path))
            .collect();
        found.sort();
        found
    }
}

impl TemplateLoader for FileTemplateLoader {
    fn suffix(&self) -> &str {
        &self.suffix
    }

    fn exists(&self, path: &Utf8Path) -> bool {
        self.full_path(path).is_file()
    }

    fn load(&self, path: &Utf8Path) -> Result<Arc<SourceFile>, CompileError> {
        let full = self.full_path(path);
        let text = std::fs::read_to_string(&full).map_err(|e| CompileError::io(&full, e))?;
        Ok(Arc::new(SourceFile::new(path, text)))
    }

    fn components(&self) -> IndexMap<SmolStr, Utf8PathBuf> {
        discover_components(&self.templates(), &self.component_dirs, &self.suffix)
    }

    fn templates(&self) -> Vec<Utf8PathBuf> {
        let mut discovered = self.discovered.lock().unwrap_or_else(|e| e.into_inner());
        discovered.get_or_insert_with(|| self.scan()).clone()
    }
}

/// Serves templates from memory.
#[derive(Debug, Clone)]
pub struct MemoryTemplateLoader {
    templates: IndexMap<Utf8PathBuf, String>,
    suffix: String,
    component_dirs: Vec<Utf8PathBuf>,
}

impl Default for MemoryTemplateLoader {
    fn default() -> Self {
        Self {
            templates: IndexMap::new(),
            suffix: DEFAULT_SUFFIX.to_string(),
            component_dirs: vec![Utf8PathBuf::from("components")],
        }
    }
}

impl MemoryTemplateLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a template.
    pub fn with_template(mut self, path: impl Into<Utf8PathBuf>, source: impl Into<String>) -> Self {
        self.insert(path, source);
        self
    }

    /// Adds or replaces a template.
    pub fn insert(&mut self, path: impl Into<Utf8PathBuf>, source: impl Into<String>) {
        self.templates.insert(normalize(&path.into()), source.into());
    }

    /// Sets the component directories.
    pub fn with_component_dirs(mut self, dirs: impl IntoIterator<Item = impl Into<Utf8PathBuf>>) -> Self {
        self.component_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }
}

impl TemplateLoader for MemoryTemplateLoader {
    fn suffix(&self) -> &str {
        &self.suffix
    }

    fn exists(&self, path: &Utf8Path) -> bool {
        self.templates.contains_key(path)
    }

    fn load(&self, path: &Utf8Path) -> Result<Arc<SourceFile>, CompileError> {
        match self.templates.get(path) {
            Some(text) => Ok(Arc::new(SourceFile::new(path, text.clone()))),
            None => Err(CompileError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "template not found"),
            )),
        }
    }

    fn components(&self) -> IndexMap<SmolStr, Utf8PathBuf> {
        discover_components(self.templates.keys(), &self.component_dirs, &self.suffix)
    }

    fn templates(&self) -> Vec<Utf8PathBuf> {
        self.templates.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn loader() -> MemoryTemplateLoader {
        MemoryTemplateLoader::new()
            .with_template("layouts/base.sugar.php", "<main></main>")
            .with_template("pages/home.sugar.php", "")
            .with_template("partials/nav.sugar.php", "")
            .with_template("components/button.sugar.php", "")
            .with_template("components/forms/input.sugar.php", "")
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Utf8Path::new("pages/../layouts/./base")), "layouts/base");
        assert_eq!(normalize(Utf8Path::new("/a/b")), "a/b");
        assert_eq!(normalize(Utf8Path::new("../../x")), "x");
    }

    #[test]
    fn test_resolve_relative_and_rooted() {
        let loader = loader();
        let from = Utf8Path::new("pages/home.sugar.php");
        assert_eq!(
            loader.resolve("../layouts/base", from).ok(),
            Some(Utf8PathBuf::from("layouts/base.sugar.php"))
        );
        assert_eq!(
            loader.resolve("/partials/nav.sugar.php", from).ok(),
            Some(Utf8PathBuf::from("partials/nav.sugar.php"))
        );
    }

    #[test]
    fn test_resolve_suggests_close_match() {
        let loader = loader();
        let error = loader
            .resolve("/layouts/bse", Utf8Path::new("pages/home.sugar.php"))
            .err()
            .map(|e| e.to_string());
        assert_eq!(
            error.as_deref(),
            Some("Template \"/layouts/bse\" not found. Did you mean \"layouts/base\"?")
        );
    }

    #[test]
    fn test_components_discovered_under_component_dirs() {
        let components = loader().components();
        let names: Vec<&str> = components.keys().map(SmolStr::as_str).collect();
        assert_eq!(names, vec!["button", "input"]);
        assert_eq!(
            components.get("input").map(|p| p.as_str()),
            Some("components/forms/input.sugar.php")
        );
    }

    #[test]
    fn test_file_loader_discovers_templates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
        std::fs::create_dir_all(root.join("components")).expect("mkdir");
        std::fs::write(root.join("home.sugar.php"), "<p>hi</p>").expect("write");
        std::fs::write(root.join("components/card.sugar.php"), "<div></div>").expect("write");
        std::fs::write(root.join("notes.txt"), "ignored").expect("write");

        let loader = FileTemplateLoader::new(&root);
        assert_eq!(
            loader.templates(),
            vec![
                Utf8PathBuf::from("components/card.sugar.php"),
                Utf8PathBuf::from("home.sugar.php")
            ]
        );
        assert!(loader.components().contains_key("card"));

        let file = loader.load(Utf8Path::new("home.sugar.php")).expect("load");
        assert_eq!(file.text(), "<p>hi</p>");
        assert_eq!(file.path(), "home.sugar.php");

        std::fs::write(root.join("about.sugar.php"), "").expect("write");
        assert_eq!(loader.templates().len(), 2);
        loader.rescan();
        assert_eq!(loader.templates().len(), 3);
    }
}
