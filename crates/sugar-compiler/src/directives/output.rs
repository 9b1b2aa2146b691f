//! Output directives.

use crate::error::CompileError;
use crate::registry::{CompileContext, DirectiveCompiler, DirectiveKind};
use sugar_parser::NodeId;

/// `s:trim`: buffers the rendered element and prints it trimmed.
pub struct TrimDirective;

impl DirectiveCompiler for TrimDirective {
    fn kind(&self) -> DirectiveKind {
        DirectiveKind::Output
    }

    fn compile(&self, id: NodeId, ctx: &mut CompileContext<'_>) -> Result<Vec<NodeId>, CompileError> {
        let mut out = vec![ctx.raw("ob_start();", id)];
        out.extend(ctx.children(id));
        out.push(ctx.raw("echo trim((string) ob_get_clean());", id));
        Ok(out)
    }
}
