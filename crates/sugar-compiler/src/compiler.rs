//! The compiler entry point.

use crate::blocks::BlockManager;
use crate::codegen::{generate, Generated};
use crate::component_cache::ComponentCache;
use crate::config::CompilerConfig;
use crate::error::{CompileError, ErrorKind, Location};
use crate::loader::TemplateLoader;
use crate::passes::{
    ComponentExpansion, ContextAnalysis, DirectiveCompilation, DirectiveExtraction,
    DirectivePairing, InheritanceResolver,
};
use crate::registry::{DirectiveCompiler, DirectiveRegistry};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use smol_str::SmolStr;
use source_map::{SourceFile, SourceMap};
use std::sync::Arc;
use sugar_parser::parse_with_options;

/// A compiled template.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    /// Logical path of the compiled template.
    pub path: Utf8PathBuf,
    /// The generated PHP source.
    pub code: String,
    /// Maps generated offsets back to template locations.
    pub source_map: SourceMap,
    /// Layouts, partials and component templates that were inlined.
    pub dependencies: Vec<Utf8PathBuf>,
    /// Names of the expanded components.
    pub components: Vec<SmolStr>,
}

impl CompiledTemplate {
    /// Wraps a downstream failure at a byte offset of [`Self::code`],
    /// locating it in the template that produced the code.
    pub fn map_error(&self, offset: usize, message: impl Into<String>) -> CompileError {
        let error = CompileError::new(ErrorKind::CompiledOutputParse {
            message: message.into(),
        });
        let offset = u32::try_from(offset).unwrap_or(u32::MAX);
        match self.source_map.original_position(offset.into()) {
            Some((file, span)) => error.with_location(Location::new(&file, span)),
            None => error,
        }
    }

    /// Like [`Self::map_error`] for a 1-based line of the generated code.
    pub fn map_error_at_line(&self, line: usize, message: impl Into<String>) -> CompileError {
        let offset = self
            .code
            .split_inclusive('\n')
            .take(line.saturating_sub(1))
            .map(str::len)
            .sum::<usize>();
        // skip indentation so the offset lands on code
        let indent = self.code[offset..]
            .bytes()
            .take_while(|b| *b == b' ' || *b == b'\t')
            .count();
        self.map_error(offset + indent, message)
    }
}

/// Compiles Sugar templates to PHP.
///
/// A compiler is cheap to clone; clones share the loader and the component
/// cache but each has its own block manager.
#[derive(Clone)]
pub struct Compiler {
    config: CompilerConfig,
    registry: DirectiveRegistry,
    loader: Arc<dyn TemplateLoader>,
    components: Arc<ComponentCache>,
    blocks: BlockManager,
}

impl Compiler {
    /// Creates a compiler with the default syntax and built-in directives.
    pub fn new(loader: Arc<dyn TemplateLoader>) -> Self {
        Self {
            config: CompilerConfig::default(),
            registry: DirectiveRegistry::with_builtins(),
            loader,
            components: Arc::new(ComponentCache::new()),
            blocks: BlockManager::new(),
        }
    }

    /// Sets the syntax configuration.
    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares a component cache with other compilers.
    pub fn with_component_cache(mut self, cache: Arc<ComponentCache>) -> Self {
        self.components = cache;
        self
    }

    /// Registers a custom directive.
    pub fn register(&mut self, name: impl Into<SmolStr>, compiler: impl DirectiveCompiler + 'static) {
        self.registry.register(name, compiler);
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn registry(&self) -> &DirectiveRegistry {
        &self.registry
    }

    pub fn loader(&self) -> &Arc<dyn TemplateLoader> {
        &self.loader
    }

    pub fn component_cache(&self) -> &Arc<ComponentCache> {
        &self.components
    }

    pub fn block_manager(&self) -> &BlockManager {
        &self.blocks
    }

    /// Compiles the template at a logical path.
    pub fn compile(&self, path: impl AsRef<Utf8Path>) -> Result<CompiledTemplate, CompileError> {
        let file = self.loader.load(path.as_ref())?;
        self.compile_file(file)
    }

    /// Compiles template source that does not come from the loader.
    ///
    /// References inside it still resolve through the loader, relative to
    /// `path`.
    pub fn compile_source(
        &self,
        path: impl Into<Utf8PathBuf>,
        source: impl Into<String>,
    ) -> Result<CompiledTemplate, CompileError> {
        self.compile_file(Arc::new(SourceFile::new(path, source)))
    }

    fn compile_file(&self, file: Arc<SourceFile>) -> Result<CompiledTemplate, CompileError> {
        let span = tracing::debug_span!("compile", template = %file.path());
        let _enter = span.enter();

        let parsed = parse_with_options(Arc::clone(&file), &self.config.parse_options());
        if let Some(error) = parsed.errors.first() {
            return Err(CompileError::from_parse(&file, error));
        }

        let mut inheritance = InheritanceResolver::new(&self.config, &*self.loader, &self.blocks);
        let mut ast = inheritance.resolve_document(parsed.ast)?;
        let root = ast.root();
        tracing::trace!("inheritance resolved");

        DirectiveExtraction::new(&self.registry, &self.config).run(&mut ast, root)?;
        DirectivePairing::new(&self.registry).run(&mut ast, root);
        ContextAnalysis::new().run(&mut ast, root);

        let mut expansion =
            ComponentExpansion::new(&self.registry, &self.config, &*self.loader, &self.components);
        expansion.run(&mut ast, root)?;
        tracing::trace!(components = expansion.components().len(), "components expanded");

        DirectiveCompilation::new(&self.registry, &self.config).run(&mut ast, root)?;
        let Generated { code, source_map } = generate(&ast, root);

        let dependencies: IndexSet<Utf8PathBuf> = inheritance
            .dependencies()
            .iter()
            .chain(expansion.dependencies())
            .filter(|dep| dep.as_path() != file.path())
            .cloned()
            .collect();
        tracing::debug!(bytes = code.len(), dependencies = dependencies.len(), "compiled");

        Ok(CompiledTemplate {
            path: file.path().to_path_buf(),
            code,
            source_map,
            dependencies: dependencies.into_iter().collect(),
            components: expansion.components().iter().cloned().collect(),
        })
    }
}
