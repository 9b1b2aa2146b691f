//! Content directives (`s:text`, `s:html`).

use crate::error::CompileError;
use crate::registry::{CompileContext, DirectiveCompiler, DirectiveKind};
use sugar_parser::expression::parse_output_expression;
use sugar_parser::NodeId;

/// Replaces the element's children with a single output.
///
/// The output node is built the first time the directive is compiled, which
/// extraction does eagerly so that context analysis sees it. Later calls
/// only unwrap it.
pub struct ContentDirective {
    /// False for `s:html`.
    pub escape: bool,
}

impl DirectiveCompiler for ContentDirective {
    fn kind(&self) -> DirectiveKind {
        DirectiveKind::Content
    }

    fn compile(&self, id: NodeId, ctx: &mut CompileContext<'_>) -> Result<Vec<NodeId>, CompileError> {
        if ctx.ast.children(id).is_empty() {
            let expression = ctx.expression(id)?;
            let (expression, escape) = parse_output_expression(&expression);
            let output = ctx.ast.output_at(expression, escape && self.escape, id);
            ctx.ast.set_children(id, vec![output]);
        }
        Ok(ctx.children(id))
    }
}
