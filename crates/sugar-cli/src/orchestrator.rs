//! Main orchestration logic.

use crate::cli::Args;
use crate::config::{ConfigError, SugarConfig};
use crate::output::{CompileSummary, Formatter, TemplateFailure};
use camino::{Utf8Path, Utf8PathBuf};
use globset::{Glob, GlobSet, GlobSetBuilder};
use miette::Diagnostic;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sugar_compiler::{
    modified_millis, normalize, now_millis, CacheMetadata, CompileError, CompiledTemplate,
    Compiler, CompilerConfig, ComponentCache, FileCache, FileTemplateLoader, TemplateCache,
    TemplateLoader,
};
use thiserror::Error;

/// Quiet period that groups bursts of file events into one rebuild.
const WATCH_DEBOUNCE: Duration = Duration::from_millis(100);

/// Orchestration errors.
#[derive(Debug, Error, Diagnostic)]
pub enum OrchestratorError {
    /// The template root does not exist.
    #[error("template root {0} is not a directory")]
    #[diagnostic(code(sugar::root))]
    RootNotFound(Utf8PathBuf),

    /// Bad configuration.
    #[error("{0}")]
    #[diagnostic(code(sugar::config))]
    Config(#[from] ConfigError),

    /// Invalid glob pattern.
    #[error("invalid glob pattern: {0}")]
    #[diagnostic(code(sugar::glob))]
    InvalidGlob(String),

    /// The compiled-template cache could not be opened or updated.
    #[error("cache error: {0}")]
    #[diagnostic(code(sugar::cache))]
    Cache(#[from] CompileError),

    /// Watch error.
    #[error("watch error: {0}")]
    #[diagnostic(code(sugar::watch))]
    WatchFailed(String),
}

/// What happened to one template.
enum Outcome {
    Compiled(CompiledTemplate),
    Cached,
    Failed(CompileError),
}

/// The result of compiling a set of templates.
#[derive(Debug, Default)]
pub struct Batch {
    pub summary: CompileSummary,
    pub failures: Vec<TemplateFailure>,
    pub compiled: Vec<CompiledTemplate>,
}

/// A template root with its configuration, loader and caches.
pub struct Project {
    root: Utf8PathBuf,
    config: SugarConfig,
    compiler_config: CompilerConfig,
    loader: Arc<FileTemplateLoader>,
    components: Arc<ComponentCache>,
    cache: FileCache,
    ignore: GlobSet,
    /// Pages whose last compile failed. They have no cache entry, so no
    /// dependency edge leads back to them.
    failed: Mutex<BTreeSet<Utf8PathBuf>>,
}

impl Project {
    /// Opens the project at `args.root`.
    pub fn open(args: &Args) -> Result<Self, OrchestratorError> {
        let root = if args.root.is_relative() {
            std::env::current_dir()
                .ok()
                .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
                .map(|dir| dir.join(&args.root))
                .unwrap_or_else(|| args.root.clone())
        } else {
            args.root.clone()
        };
        if !root.is_dir() {
            return Err(OrchestratorError::RootNotFound(root));
        }

        let mut config = SugarConfig::load(&root, args.config.as_deref())?;
        config.apply_args(args);
        Self::with_config(root, config)
    }

    /// Opens a project with an already loaded configuration.
    pub fn with_config(root: Utf8PathBuf, config: SugarConfig) -> Result<Self, OrchestratorError> {
        let ignore = build_ignore_set(&config.ignore)?;
        let loader = FileTemplateLoader::new(root.clone())
            .with_suffix(config.suffix.clone())
            .with_component_dirs(config.component_dirs.iter().cloned());
        let cache = FileCache::open(config.cache_dir(&root))?;

        Ok(Self {
            compiler_config: config.compiler_config(),
            loader: Arc::new(loader),
            components: Arc::new(ComponentCache::new()),
            cache,
            ignore,
            failed: Mutex::new(BTreeSet::new()),
            config,
            root,
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    /// Creates a compiler sharing this project's loader and component cache.
    ///
    /// Compilers track block nesting per instance, so every worker gets its
    /// own.
    pub fn compiler(&self) -> Compiler {
        let loader: Arc<dyn TemplateLoader> = self.loader.clone();
        Compiler::new(loader)
            .with_config(self.compiler_config.clone())
            .with_component_cache(Arc::clone(&self.components))
    }

    /// Returns true if `path` is a page: a template outside the component
    /// directories, the cache directory and the ignore globs.
    pub fn is_page(&self, path: &Utf8Path) -> bool {
        if !path.as_str().ends_with(&self.config.suffix) {
            return false;
        }
        if self.config.component_dirs.iter().any(|dir| path.starts_with(dir)) {
            return false;
        }
        let cache_dir = self.cache.dir();
        if self
            .loader
            .logical_path(cache_dir)
            .is_some_and(|dir| !dir.as_str().is_empty() && path.starts_with(&dir))
        {
            return false;
        }
        !self.ignore.is_match(path.as_str())
    }

    /// Finds every page under the root, in path order.
    pub fn discover(&self) -> Vec<Utf8PathBuf> {
        let pages: Vec<Utf8PathBuf> = self
            .loader
            .templates()
            .into_iter()
            .filter(|path| self.is_page(path))
            .collect();
        tracing::info!(count = pages.len(), root = %self.root, "discovered templates");
        pages
    }

    /// Compiles `templates` in parallel, skipping fresh cache entries unless
    /// `force` is set.
    pub fn compile(&self, templates: &[Utf8PathBuf], force: bool) -> Batch {
        let start = Instant::now();
        let outcomes: Vec<(Utf8PathBuf, Outcome)> = templates
            .par_iter()
            .map_init(
                || self.compiler(),
                |compiler, path| (path.clone(), self.compile_one(compiler, path, force)),
            )
            .collect();

        let mut batch = Batch::default();
        batch.summary.file_count = templates.len();
        let mut failed = self.failed.lock().unwrap_or_else(|e| e.into_inner());
        for (path, outcome) in outcomes {
            match outcome {
                Outcome::Compiled(template) => {
                    failed.remove(&path);
                    batch.summary.compiled_count += 1;
                    batch.compiled.push(template);
                }
                Outcome::Cached => {
                    failed.remove(&path);
                    batch.summary.cached_count += 1;
                }
                Outcome::Failed(error) => {
                    failed.insert(path.clone());
                    batch.summary.error_count += 1;
                    batch.failures.push(TemplateFailure { path, error });
                }
            }
        }
        drop(failed);
        tracing::info!(
            compiled = batch.summary.compiled_count,
            cached = batch.summary.cached_count,
            errors = batch.summary.error_count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch finished"
        );
        batch
    }

    fn compile_one(&self, compiler: &Compiler, path: &Utf8Path, force: bool) -> Outcome {
        let key = path.as_str();
        if !force && self.cache.is_fresh(key, &self.root) {
            tracing::debug!(template = key, "cache fresh");
            return Outcome::Cached;
        }

        // taken before compiling so an edit during the compile reads as stale
        let compiled_timestamp = now_millis();
        let template = match compiler.compile(path) {
            Ok(template) => template,
            Err(error) => return Outcome::Failed(error),
        };

        let metadata = CacheMetadata {
            dependencies: template.dependencies.clone(),
            components: template.components.iter().map(ToString::to_string).collect(),
            source_timestamp: modified_millis(&self.root.join(path)).unwrap_or_default(),
            compiled_timestamp,
        };
        match self.cache.put(key, &template.code, metadata) {
            Ok(()) => Outcome::Compiled(template),
            Err(error) => Outcome::Failed(error),
        }
    }

    /// Drops everything derived from the changed files and returns the pages
    /// to recompile.
    pub fn invalidate(&self, changed: &[Utf8PathBuf]) -> Result<Vec<Utf8PathBuf>, OrchestratorError> {
        // files may have been created or deleted
        self.loader.rescan();

        let mut targets = Vec::new();
        for path in changed {
            let dropped = self.components.invalidate(path);
            let removed = self.cache.invalidate(path.as_str())?;
            tracing::debug!(%path, components = dropped, templates = removed.len(), "invalidated");
            targets.extend(removed.into_iter().map(Utf8PathBuf::from));
            targets.push(path.clone());
        }
        // a failure may have been caused by a file that did not exist yet
        let mut failed = self.failed.lock().unwrap_or_else(|e| e.into_inner());
        failed.retain(|path| self.loader.exists(path));
        targets.extend(failed.iter().cloned());
        drop(failed);

        let mut pages: Vec<Utf8PathBuf> = targets
            .into_iter()
            .filter(|path| self.is_page(path) && self.loader.exists(path))
            .collect();
        pages.sort();
        pages.dedup();
        Ok(pages)
    }
}

fn build_ignore_set(patterns: &[String]) -> Result<GlobSet, OrchestratorError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| OrchestratorError::InvalidGlob(e.to_string()))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| OrchestratorError::InvalidGlob(e.to_string()))
}

/// Compiles the requested templates, then keeps watching if asked to.
pub fn run(args: Args) -> Result<CompileSummary, OrchestratorError> {
    let project = Project::open(&args)?;
    let templates = if args.templates.is_empty() {
        project.discover()
    } else {
        args.templates.iter().map(|path| normalize(path)).collect()
    };
    let formatter = Formatter::new(args.output).with_root(project.root().to_path_buf());

    let batch = project.compile(&templates, args.force);
    report(&args, &project, &formatter, &batch);

    if args.watch {
        run_watch_mode(&args, &project, &formatter)
    } else {
        Ok(batch.summary)
    }
}

fn report(args: &Args, project: &Project, formatter: &Formatter, batch: &Batch) {
    if args.emit_php {
        for template in &batch.compiled {
            println!("=== PHP for {} ===\n{}", template.path, template.code);
        }
    }
    if matches!(args.output, crate::cli::OutputFormat::Json) {
        println!("{}", formatter.format(&batch.failures));
        return;
    }
    print!("{}", formatter.format(&batch.failures));
    println!("{}", batch.summary.format(project.cache().dir()));
}

/// Runs in watch mode.
fn run_watch_mode(
    args: &Args,
    project: &Project,
    formatter: &Formatter,
) -> Result<CompileSummary, OrchestratorError> {
    use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};

    let (tx, rx) = mpsc::channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        Config::default().with_poll_interval(Duration::from_secs(1)),
    )
    .map_err(|e| OrchestratorError::WatchFailed(e.to_string()))?;

    watcher
        .watch(project.root().as_std_path(), RecursiveMode::Recursive)
        .map_err(|e| OrchestratorError::WatchFailed(e.to_string()))?;

    println!("Watching for changes... (Ctrl+C to stop)\n");

    while let Ok(event) = rx.recv() {
        let mut paths = event.paths;
        loop {
            match rx.recv_timeout(WATCH_DEBOUNCE) {
                Ok(event) => paths.extend(event.paths),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(OrchestratorError::WatchFailed(
                        "watch channel closed unexpectedly".to_string(),
                    ))
                }
            }
        }

        let changed = changed_templates(project, paths);
        if changed.is_empty() {
            continue;
        }

        if !args.preserve_watch_output {
            // Clear screen
            print!("\x1B[2J\x1B[1;1H");
        }
        println!("{} template(s) changed, recompiling...\n", changed.len());

        let targets = project.invalidate(&changed)?;
        let batch = project.compile(&targets, true);
        report(args, project, formatter, &batch);
    }

    Err(OrchestratorError::WatchFailed(
        "watch channel closed unexpectedly".to_string(),
    ))
}

/// Maps raw event paths to logical template paths, ignoring the cache
/// directory's own writes.
fn changed_templates(project: &Project, paths: Vec<std::path::PathBuf>) -> Vec<Utf8PathBuf> {
    let mut changed: Vec<Utf8PathBuf> = paths
        .into_iter()
        .filter_map(|path| Utf8PathBuf::from_path_buf(path).ok())
        .filter(|path| !path.starts_with(project.cache().dir()))
        .filter(|path| path.as_str().ends_with(&project.config.suffix))
        .filter_map(|path| project.loader.logical_path(&path))
        .collect();
    changed.sort();
    changed.dedup();
    changed
}
