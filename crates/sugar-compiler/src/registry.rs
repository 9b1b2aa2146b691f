//! The directive registry.
//!
//! Every `s:*` attribute that is not consumed by inheritance or component
//! expansion is looked up here. Third-party directive packs plug in through
//! [`DirectiveRegistry::register`].

use crate::config::CompilerConfig;
use crate::directives;
use crate::error::{CompileError, ErrorKind};
use crate::suggest::did_you_mean;
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use std::fmt;
use std::sync::Arc;
use sugar_parser::{Ast, Directive, NodeId, NodeKind};

/// How a directive participates in extraction and nesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    /// Wraps the element in control structures (`if`, `foreach`). At most
    /// one per element.
    ControlFlow,
    /// Replaces the element's children (`text`, `html`). At most one per
    /// element.
    Content,
    /// Rewrites the element's attributes during extraction (`class`).
    Attribute,
    /// Post-processes the rendered element (`trim`).
    Output,
}

/// A compiler strategy for one directive.
pub trait DirectiveCompiler: Send + Sync {
    /// Returns the directive kind.
    fn kind(&self) -> DirectiveKind;

    /// Names of directives that may follow this one as part of the same
    /// construct.
    fn pairs_with(&self) -> &'static [&'static str] {
        &[]
    }

    /// Compiles `directive` into a flat node sequence.
    ///
    /// Attribute directives run during extraction with the element as their
    /// only child and rewrite it in place.
    fn compile(&self, directive: NodeId, ctx: &mut CompileContext<'_>)
        -> Result<Vec<NodeId>, CompileError>;
}

/// Maps directive names to their compilers.
#[derive(Clone, Default)]
pub struct DirectiveRegistry {
    compilers: IndexMap<SmolStr, Arc<dyn DirectiveCompiler>>,
}

impl fmt::Debug for DirectiveRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.compilers.keys()).finish()
    }
}

impl DirectiveRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in directive.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        directives::register_builtins(&mut registry);
        registry
    }

    /// Registers (or replaces) a directive.
    pub fn register(&mut self, name: impl Into<SmolStr>, compiler: impl DirectiveCompiler + 'static) {
        self.compilers.insert(name.into(), Arc::new(compiler));
    }

    /// Looks up a directive.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn DirectiveCompiler>> {
        self.compilers.get(name)
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.compilers.contains_key(name)
    }

    /// Iterates over registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.compilers.keys().map(SmolStr::as_str)
    }

    /// Builds the error for an unregistered directive.
    pub fn unknown(&self, name: &str, config: &CompilerConfig) -> CompileError {
        let candidates: Vec<String> = self.names().map(|n| config.directive_name(n)).collect();
        let written = config.directive_name(name);
        let suggestion = did_you_mean(&written, candidates.iter().map(String::as_str));
        CompileError::new(ErrorKind::UnknownDirective {
            name: written,
            suggestion,
        })
    }
}

/// State handed to directive compilers.
pub struct CompileContext<'a> {
    /// The tree being compiled.
    pub ast: &'a mut Ast,
    /// Syntax settings.
    pub config: &'a CompilerConfig,
    consumed: FxHashSet<NodeId>,
    next_id: u32,
}

impl<'a> CompileContext<'a> {
    /// Creates a context over `ast`.
    pub fn new(ast: &'a mut Ast, config: &'a CompilerConfig) -> Self {
        Self {
            ast,
            config,
            consumed: FxHashSet::default(),
            next_id: 0,
        }
    }

    /// Returns the directive stored at `id`.
    pub fn directive(&self, id: NodeId) -> Result<&Directive, CompileError> {
        match self.ast.kind(id) {
            NodeKind::Directive(directive) => Ok(directive),
            other => Err(CompileError::syntax(format!(
                "expected a directive, found {}",
                other.name()
            ))
            .at(self.ast.node(id))),
        }
    }

    /// Returns the directive's children.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.ast.children(id).to_vec()
    }

    /// Returns the directive expression, failing when it is missing.
    pub fn expression(&self, id: NodeId) -> Result<String, CompileError> {
        let directive = self.directive(id)?;
        match directive.expression.as_deref().map(str::trim) {
            Some(expression) if !expression.is_empty() => Ok(expression.to_string()),
            _ => Err(self.error(
                format!(
                    "{} requires an expression",
                    self.config.directive_name(&directive.name)
                ),
                id,
            )),
        }
    }

    /// Builds a syntax error located at `at`.
    pub fn error(&self, message: impl Into<String>, at: NodeId) -> CompileError {
        CompileError::syntax(message).at(self.ast.node(at))
    }

    /// Allocates a code node located at `at`.
    pub fn raw(&mut self, code: impl Into<String>, at: NodeId) -> NodeId {
        self.ast.raw_at(code, at)
    }

    /// Returns a fresh PHP variable name (`$__empty_0`).
    pub fn unique_var(&mut self, base: &str) -> String {
        let id = self.next_id;
        self.next_id += 1;
        format!("$__{base}_{id}")
    }

    /// Marks a paired directive as compiled by its chain head.
    pub fn consume(&mut self, id: NodeId) {
        self.consumed.insert(id);
    }

    /// Returns true if `id` was compiled as part of another directive.
    pub fn is_consumed(&self, id: NodeId) -> bool {
        self.consumed.contains(&id)
    }
}
