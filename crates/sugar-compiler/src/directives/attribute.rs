//! Attribute directives.
//!
//! These run during extraction: the directive wraps exactly one element,
//! rewrites it in place and hands it back unchanged in position.

use crate::error::CompileError;
use crate::registry::{CompileContext, DirectiveCompiler, DirectiveKind};
use smol_str::SmolStr;
use sugar_parser::{Attribute, AttributePart, AttributeValue, NodeId, NodeKind, Quote};

const ATTRIBUTE_HELPER: &str = "\\Sugar\\Runtime\\HtmlAttributeHelper";
const TAG_HELPER: &str = "\\Sugar\\Runtime\\HtmlTagHelper";

fn subject(id: NodeId, ctx: &CompileContext<'_>) -> Result<NodeId, CompileError> {
    match ctx.ast.children(id) {
        [element] if matches!(ctx.ast.kind(*element), NodeKind::Element(_)) => Ok(*element),
        _ => {
            let name = ctx.directive(id)?.name.clone();
            Err(ctx.error(
                format!("{} must be placed on an HTML element", ctx.config.directive_name(&name)),
                id,
            ))
        }
    }
}

/// `s:class`: merges computed class names into the `class` attribute.
pub struct ClassDirective;

impl DirectiveCompiler for ClassDirective {
    fn kind(&self) -> DirectiveKind {
        DirectiveKind::Attribute
    }

    fn compile(&self, id: NodeId, ctx: &mut CompileContext<'_>) -> Result<Vec<NodeId>, CompileError> {
        let element = subject(id, ctx)?;
        let expression = ctx.expression(id)?;
        let output = ctx
            .ast
            .output_at(format!("{ATTRIBUTE_HELPER}::classNames({expression})"), true, id);
        let span = ctx.ast.node(id).span;

        let Some(attributes) = ctx.ast.attributes_mut(element) else {
            return Ok(vec![element]);
        };
        match attributes.iter_mut().find(|a| a.name == "class") {
            Some(class) => {
                let merged = match std::mem::replace(&mut class.value, AttributeValue::Boolean) {
                    AttributeValue::Static(value) if !value.trim().is_empty() => AttributeValue::Parts(vec![
                        AttributePart::Text(format!("{} ", value.trim_end())),
                        AttributePart::Output(output),
                    ]),
                    AttributeValue::Boolean | AttributeValue::Static(_) => AttributeValue::Output(output),
                    AttributeValue::Output(existing) => AttributeValue::Parts(vec![
                        AttributePart::Output(existing),
                        AttributePart::Text(" ".to_string()),
                        AttributePart::Output(output),
                    ]),
                    AttributeValue::Parts(mut parts) => {
                        parts.push(AttributePart::Text(" ".to_string()));
                        parts.push(AttributePart::Output(output));
                        AttributeValue::Parts(parts)
                    }
                };
                class.value = merged;
                if class.quote == Quote::None {
                    class.quote = Quote::Double;
                }
            }
            None => attributes.push(Attribute::new("class", AttributeValue::Output(output), span)),
        }
        Ok(vec![element])
    }
}

/// `s:spread`: prints an attribute map inside the tag.
pub struct SpreadDirective;

impl DirectiveCompiler for SpreadDirective {
    fn kind(&self) -> DirectiveKind {
        DirectiveKind::Attribute
    }

    fn compile(&self, id: NodeId, ctx: &mut CompileContext<'_>) -> Result<Vec<NodeId>, CompileError> {
        let element = subject(id, ctx)?;
        let expression = ctx.expression(id)?;
        // the helper escapes names and values itself
        let output = ctx
            .ast
            .output_at(format!("{ATTRIBUTE_HELPER}::spreadAttrs({expression})"), false, id);
        let span = ctx.ast.node(id).span;

        if let Some(attributes) = ctx.ast.attributes_mut(element) {
            attributes.push(Attribute {
                name: SmolStr::default(),
                value: AttributeValue::Output(output),
                quote: Quote::None,
                leading_whitespace: SmolStr::new_static(" "),
                span,
            });
        }
        Ok(vec![element])
    }
}

/// `s:tag`: replaces the tag name with a validated runtime value.
pub struct TagDirective;

impl DirectiveCompiler for TagDirective {
    fn kind(&self) -> DirectiveKind {
        DirectiveKind::Attribute
    }

    fn compile(&self, id: NodeId, ctx: &mut CompileContext<'_>) -> Result<Vec<NodeId>, CompileError> {
        let element = subject(id, ctx)?;
        let expression = ctx.expression(id)?;
        if let NodeKind::Element(el) = ctx.ast.kind_mut(element) {
            el.dynamic_tag = Some(format!(
                "{TAG_HELPER}::tagName({expression}, '{}')",
                el.name.replace('\'', "\\'")
            ));
        }
        Ok(vec![element])
    }
}
