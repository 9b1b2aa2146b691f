//! Directive compilation.
//!
//! Replaces every directive node with the flat sequence its compiler emits,
//! then keeps going into that sequence so nested and derived directives are
//! compiled too.

use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::registry::{CompileContext, DirectiveRegistry};
use sugar_parser::{Ast, NodeId, NodeKind};

/// The directive compilation pass.
pub struct DirectiveCompilation<'a> {
    registry: &'a DirectiveRegistry,
    config: &'a CompilerConfig,
}

impl<'a> DirectiveCompilation<'a> {
    /// Creates the pass.
    pub fn new(registry: &'a DirectiveRegistry, config: &'a CompilerConfig) -> Self {
        Self { registry, config }
    }

    /// Compiles every directive below `root`.
    pub fn run(&self, ast: &mut Ast, root: NodeId) -> Result<(), CompileError> {
        // expansion and inheritance rebuilt parts of the tree
        ast.link_parents(root);
        let mut ctx = CompileContext::new(ast, self.config);
        self.compile_children(&mut ctx, root)
    }

    fn compile_children(&self, ctx: &mut CompileContext<'_>, id: NodeId) -> Result<(), CompileError> {
        let children = ctx.children(id);
        let mut compiled = Vec::with_capacity(children.len());
        for child in children {
            self.compile_node(ctx, child, &mut compiled)?;
        }
        ctx.ast.set_children(id, compiled);
        Ok(())
    }

    fn compile_node(&self, ctx: &mut CompileContext<'_>, id: NodeId, out: &mut Vec<NodeId>) -> Result<(), CompileError> {
        match ctx.ast.kind(id) {
            NodeKind::Directive(directive) => {
                if ctx.is_consumed(id) {
                    return Ok(());
                }
                let name = directive.name.clone();
                let Some(compiler) = self.registry.get(&name) else {
                    return Err(self.registry.unknown(&name, self.config).at(ctx.ast.node(id)));
                };
                tracing::trace!(directive = %name, "compiling directive");
                for node in compiler.compile(id, ctx)? {
                    self.compile_node(ctx, node, out)?;
                }
            }
            NodeKind::Document(_) | NodeKind::Element(_) | NodeKind::Fragment(_) | NodeKind::Component(_) => {
                self.compile_children(ctx, id)?;
                out.push(id);
            }
            NodeKind::Text(_) | NodeKind::Output(_) | NodeKind::RawCode(_) => out.push(id),
        }
        Ok(())
    }
}
