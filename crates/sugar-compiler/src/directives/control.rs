//! Control-flow directives.
//!
//! Each compiles to PHP's alternative syntax (`if (…):` … `endif;`) so the
//! wrapped markup stays inline HTML.

use crate::error::CompileError;
use crate::registry::{CompileContext, DirectiveCompiler, DirectiveKind};
use sugar_parser::{NodeId, NodeKind};

/// `s:if`, heading an `s:elseif`/`s:else` chain.
pub struct IfDirective;

impl DirectiveCompiler for IfDirective {
    fn kind(&self) -> DirectiveKind {
        DirectiveKind::ControlFlow
    }

    fn pairs_with(&self) -> &'static [&'static str] {
        &["elseif", "else"]
    }

    fn compile(&self, id: NodeId, ctx: &mut CompileContext<'_>) -> Result<Vec<NodeId>, CompileError> {
        let expression = ctx.expression(id)?;
        let mut out = vec![ctx.raw(format!("if ({expression}):"), id)];
        out.extend(ctx.children(id));

        let mut next = ctx.directive(id)?.paired;
        while let Some(member) = next {
            let directive = ctx.directive(member)?;
            let (name, paired) = (directive.name.clone(), directive.paired);
            match name.as_str() {
                "elseif" => {
                    let expression = ctx.expression(member)?;
                    out.push(ctx.raw(format!("elseif ({expression}):"), member));
                    next = paired;
                }
                "else" => {
                    out.push(ctx.raw("else:", member));
                    next = None;
                }
                _ => break,
            }
            ctx.consume(member);
            out.extend(ctx.children(member));
        }

        out.push(ctx.raw("endif;", id));
        Ok(out)
    }
}

/// `s:elseif`; compiled by the chain head.
pub struct ElseIfDirective;

impl DirectiveCompiler for ElseIfDirective {
    fn kind(&self) -> DirectiveKind {
        DirectiveKind::ControlFlow
    }

    fn pairs_with(&self) -> &'static [&'static str] {
        &["elseif", "else"]
    }

    fn compile(&self, id: NodeId, ctx: &mut CompileContext<'_>) -> Result<Vec<NodeId>, CompileError> {
        let name = ctx.config.directive_name("elseif");
        Err(ctx.error(format!("{name} must follow an if or elseif element"), id))
    }
}

/// `s:else`; compiled by the chain head.
pub struct ElseDirective;

impl DirectiveCompiler for ElseDirective {
    fn kind(&self) -> DirectiveKind {
        DirectiveKind::ControlFlow
    }

    fn compile(&self, id: NodeId, ctx: &mut CompileContext<'_>) -> Result<Vec<NodeId>, CompileError> {
        let name = ctx.config.directive_name("else");
        Err(ctx.error(format!("{name} must follow an if or elseif element"), id))
    }
}

/// A single-branch conditional such as `s:unless` or `s:isset`.
pub struct Condition {
    open: &'static str,
    close: &'static str,
}

impl Condition {
    /// Creates a conditional; `{}` in `open` is replaced by the expression.
    pub const fn new(open: &'static str, close: &'static str) -> Self {
        Self { open, close }
    }
}

impl DirectiveCompiler for Condition {
    fn kind(&self) -> DirectiveKind {
        DirectiveKind::ControlFlow
    }

    fn compile(&self, id: NodeId, ctx: &mut CompileContext<'_>) -> Result<Vec<NodeId>, CompileError> {
        let expression = ctx.expression(id)?;
        let mut out = vec![ctx.raw(self.open.replace("{}", &expression), id)];
        out.extend(ctx.children(id));
        out.push(ctx.raw(self.close, id));
        Ok(out)
    }
}

/// `s:empty="$x"` as a conditional; a bare `s:empty` is the `s:forelse`
/// fallback.
pub struct EmptyDirective;

impl DirectiveCompiler for EmptyDirective {
    fn kind(&self) -> DirectiveKind {
        DirectiveKind::ControlFlow
    }

    fn compile(&self, id: NodeId, ctx: &mut CompileContext<'_>) -> Result<Vec<NodeId>, CompileError> {
        if ctx.directive(id)?.expression.is_none() {
            let name = ctx.config.directive_name("empty");
            let forelse = ctx.config.directive_name("forelse");
            return Err(ctx.error(
                format!("{name} without an expression must follow a {forelse} element"),
                id,
            ));
        }
        Condition::new("if (empty({})):", "endif;").compile(id, ctx)
    }
}

/// `s:foreach` and `s:while`.
pub struct LoopDirective {
    keyword: &'static str,
    close: &'static str,
}

impl LoopDirective {
    /// Creates a loop compiled as `keyword (…):` … `close`.
    pub const fn new(keyword: &'static str, close: &'static str) -> Self {
        Self { keyword, close }
    }
}

impl DirectiveCompiler for LoopDirective {
    fn kind(&self) -> DirectiveKind {
        DirectiveKind::ControlFlow
    }

    fn compile(&self, id: NodeId, ctx: &mut CompileContext<'_>) -> Result<Vec<NodeId>, CompileError> {
        let expression = ctx.expression(id)?;
        let mut out = vec![ctx.raw(format!("{} ({expression}):", self.keyword), id)];
        out.extend(ctx.children(id));
        out.push(ctx.raw(self.close, id));
        Ok(out)
    }
}

/// `s:forelse`, optionally followed by a bare `s:empty` fallback.
pub struct ForelseDirective;

impl DirectiveCompiler for ForelseDirective {
    fn kind(&self) -> DirectiveKind {
        DirectiveKind::ControlFlow
    }

    fn pairs_with(&self) -> &'static [&'static str] {
        &["empty"]
    }

    fn compile(&self, id: NodeId, ctx: &mut CompileContext<'_>) -> Result<Vec<NodeId>, CompileError> {
        let expression = ctx.expression(id)?;
        let flag = ctx.unique_var("empty");

        let mut out = vec![ctx.raw(
            format!("{flag} = true; foreach ({expression}): {flag} = false;"),
            id,
        )];
        out.extend(ctx.children(id));
        out.push(ctx.raw("endforeach;", id));

        let fallback = ctx.directive(id)?.paired;
        if let Some(fallback) = fallback {
            // `s:empty="…"` is a conditional of its own, not the fallback
            if ctx.directive(fallback)?.expression.is_none() {
                ctx.consume(fallback);
                out.push(ctx.raw(format!("if ({flag}):"), fallback));
                out.extend(ctx.children(fallback));
                out.push(ctx.raw("endif;", fallback));
            }
        }
        Ok(out)
    }
}

/// `s:switch`, opened inside the element so cases are its direct children.
pub struct SwitchDirective;

impl DirectiveCompiler for SwitchDirective {
    fn kind(&self) -> DirectiveKind {
        DirectiveKind::ControlFlow
    }

    fn compile(&self, id: NodeId, ctx: &mut CompileContext<'_>) -> Result<Vec<NodeId>, CompileError> {
        let expression = ctx.expression(id)?;
        let subjects = ctx.children(id);
        for &subject in &subjects {
            if !matches!(
                ctx.ast.kind(subject),
                NodeKind::Element(_) | NodeKind::Fragment(_)
            ) {
                let name = ctx.config.directive_name("switch");
                return Err(ctx.error(format!("{name} must be placed on an element"), subject));
            }

            // PHP rejects any output between `switch` and the first `case`
            let mut cases = Vec::new();
            for child in ctx.children(subject) {
                match ctx.ast.kind(child) {
                    NodeKind::Text(text) if text.is_whitespace() => {}
                    NodeKind::Directive(d) if d.name == "case" || d.name == "default" => {
                        cases.push(child)
                    }
                    _ => {
                        let case = ctx.config.directive_name("case");
                        let default = ctx.config.directive_name("default");
                        return Err(ctx.error(
                            format!("switch elements may only contain {case} and {default} children"),
                            child,
                        ));
                    }
                }
            }

            let mut children = vec![ctx.raw(format!("switch ({expression}):"), subject)];
            children.extend(cases);
            children.push(ctx.raw("endswitch;", subject));
            ctx.ast.set_children(subject, children);
        }
        Ok(subjects)
    }
}

/// `s:case` and `s:default`.
pub struct CaseDirective {
    /// True for `s:default`.
    pub default: bool,
}

impl DirectiveCompiler for CaseDirective {
    fn kind(&self) -> DirectiveKind {
        DirectiveKind::ControlFlow
    }

    fn pairs_with(&self) -> &'static [&'static str] {
        &["case", "default"]
    }

    fn compile(&self, id: NodeId, ctx: &mut CompileContext<'_>) -> Result<Vec<NodeId>, CompileError> {
        let in_switch = ctx
            .ast
            .parent(id)
            .and_then(|subject| ctx.ast.parent(subject))
            .is_some_and(|p| matches!(ctx.ast.kind(p), NodeKind::Directive(d) if d.name == "switch"));
        if !in_switch {
            let name = ctx.directive(id)?.name.clone();
            let name = ctx.config.directive_name(&name);
            let switch = ctx.config.directive_name("switch");
            return Err(ctx.error(
                format!("{name} must be a direct child of a {switch} element"),
                id,
            ));
        }

        let open = if self.default {
            "default:".to_string()
        } else {
            format!("case {}:", ctx.expression(id)?)
        };
        let mut out = vec![ctx.raw(open, id)];
        out.extend(ctx.children(id));
        out.push(ctx.raw("break;", id));
        Ok(out)
    }
}

/// `s:ifcontent`: renders the element only when its content is not blank.
pub struct IfContentDirective;

impl DirectiveCompiler for IfContentDirective {
    fn kind(&self) -> DirectiveKind {
        DirectiveKind::ControlFlow
    }

    fn compile(&self, id: NodeId, ctx: &mut CompileContext<'_>) -> Result<Vec<NodeId>, CompileError> {
        let subjects = ctx.children(id);
        let element = match subjects.as_slice() {
            [element] if matches!(ctx.ast.kind(*element), NodeKind::Element(_)) => *element,
            _ => {
                let name = ctx.config.directive_name("ifcontent");
                return Err(ctx.error(format!("{name} must be placed on an HTML element"), id));
            }
        };

        let content = ctx.unique_var("content");
        let inner = ctx.children(element);
        let echo = ctx.raw(format!("echo {content};"), element);
        ctx.ast.set_children(element, vec![echo]);

        let mut out = vec![ctx.raw("ob_start();", id)];
        out.extend(inner);
        out.push(ctx.raw(
            format!("{content} = (string) ob_get_clean(); if (trim({content}) !== ''):"),
            id,
        ));
        out.push(element);
        out.push(ctx.raw("endif;", id));
        Ok(out)
    }
}
