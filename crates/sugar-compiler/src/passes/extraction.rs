//! Directive extraction.
//!
//! Pulls `s:*` attributes off elements, fragments and components and wraps
//! the node in [`Directive`] nodes:
//!
//! ```text
//! control-flow ( output ( element ( content ) ) )
//! ```
//!
//! Attribute directives are compiled on the spot and leave no wrapper.

use crate::config::CompilerConfig;
use crate::directives::{COMPONENT_DIRECTIVES, INHERITANCE_DIRECTIVES};
use crate::error::{CompileError, Location};
use crate::registry::{CompileContext, DirectiveKind, DirectiveRegistry};
use smol_str::SmolStr;
use source_map::{SourceFile, Span};
use std::sync::Arc;
use sugar_parser::{Ast, Attribute, AttributeValue, Directive, NodeId, NodeKind, TagClose};

/// A directive attribute waiting to become a node.
struct Pending {
    name: SmolStr,
    expression: Option<String>,
    span: Span,
}

/// The directive extraction pass.
pub struct DirectiveExtraction<'a> {
    registry: &'a DirectiveRegistry,
    config: &'a CompilerConfig,
}

impl<'a> DirectiveExtraction<'a> {
    /// Creates the pass.
    pub fn new(registry: &'a DirectiveRegistry, config: &'a CompilerConfig) -> Self {
        Self { registry, config }
    }

    /// Extracts directives from every node below `root`.
    pub fn run(&self, ast: &mut Ast, root: NodeId) -> Result<(), CompileError> {
        self.extract_children(ast, root)
    }

    fn extract_children(&self, ast: &mut Ast, id: NodeId) -> Result<(), CompileError> {
        let in_component = matches!(ast.kind(id), NodeKind::Component(_));
        let children = ast.children(id).to_vec();
        let mut extracted = Vec::with_capacity(children.len());
        for child in children {
            extracted.push(self.extract_node(ast, child, in_component)?);
        }
        ast.set_children(id, extracted);
        Ok(())
    }

    fn extract_node(&self, ast: &mut Ast, id: NodeId, in_component: bool) -> Result<NodeId, CompileError> {
        match ast.kind(id) {
            NodeKind::Element(_) | NodeKind::Fragment(_) | NodeKind::Component(_) => {
                self.extract_children(ast, id)?;
                self.wrap(ast, id, in_component)
            }
            NodeKind::Document(_) | NodeKind::Directive(_) => {
                self.extract_children(ast, id)?;
                Ok(id)
            }
            NodeKind::Text(_) | NodeKind::Output(_) | NodeKind::RawCode(_) => Ok(id),
        }
    }

    fn wrap(&self, ast: &mut Ast, id: NodeId, slot_allowed: bool) -> Result<NodeId, CompileError> {
        let source = Arc::clone(&ast.node(id).source);
        let is_component = matches!(ast.kind(id), NodeKind::Component(_));
        let is_fragment = matches!(ast.kind(id), NodeKind::Fragment(_));
        let error = |message: String, span: Span| {
            CompileError::syntax(message).with_location(Location::new(&source, span))
        };

        let attributes = match ast.attributes_mut(id) {
            Some(attributes) if !attributes.is_empty() => std::mem::take(attributes),
            _ => return Ok(id),
        };

        let mut kept: Vec<Attribute> = Vec::with_capacity(attributes.len());
        let mut control: Option<Pending> = None;
        let mut content: Option<Pending> = None;
        let mut attribute_directives = Vec::new();
        let mut output_directives = Vec::new();
        let mut removed = false;

        for attribute in attributes {
            let Some(name) = self.config.strip_directive(&attribute.name) else {
                if is_fragment {
                    return Err(error(
                        format!(
                            "<{}> fragment cannot have regular HTML attributes",
                            self.config.fragment_tag
                        ),
                        attribute.span,
                    ));
                }
                kept.push(attribute);
                continue;
            };
            let name = SmolStr::new(name);

            if attribute.is_dynamic() {
                return Err(error(
                    "Directive attributes cannot contain dynamic output expressions".to_string(),
                    attribute.span,
                ));
            }
            if INHERITANCE_DIRECTIVES.contains(&name.as_str()) {
                // the inheritance resolver consumes every well-placed one
                return Err(error(self.misplaced(&name, &attribute.name), attribute.span));
            }
            if COMPONENT_DIRECTIVES.contains(&name.as_str()) {
                if name == "bind" && !is_component {
                    return Err(error(
                        format!("{} is only allowed on components", attribute.name),
                        attribute.span,
                    ));
                }
                if name == "slot" && !slot_allowed {
                    return Err(error(
                        format!(
                            "{} is only allowed on direct children of a component",
                            attribute.name
                        ),
                        attribute.span,
                    ));
                }
                kept.push(attribute);
                continue;
            }

            let Some(compiler) = self.registry.get(&name) else {
                return Err(self
                    .registry
                    .unknown(&name, self.config)
                    .with_location(Location::new(&source, attribute.span)));
            };
            let kind = compiler.kind();
            if is_component && kind != DirectiveKind::ControlFlow {
                return Err(error(
                    format!(
                        "Components only support control flow directives, found {}",
                        attribute.name
                    ),
                    attribute.span,
                ));
            }
            if is_fragment && kind == DirectiveKind::Attribute {
                return Err(error(
                    format!(
                        "<{}> cannot have attribute directives like {}",
                        self.config.fragment_tag, attribute.name
                    ),
                    attribute.span,
                ));
            }

            removed = true;
            let pending = Pending {
                name,
                expression: match &attribute.value {
                    AttributeValue::Static(value) if !value.trim().is_empty() => Some(value.clone()),
                    _ => None,
                },
                span: attribute.span,
            };
            match kind {
                DirectiveKind::ControlFlow => {
                    if control.replace(pending).is_some() {
                        return Err(error(
                            "Only one control flow directive allowed per element".to_string(),
                            attribute.span,
                        ));
                    }
                }
                DirectiveKind::Content => {
                    if content.replace(pending).is_some() {
                        return Err(error(
                            "Only one content directive allowed per element".to_string(),
                            attribute.span,
                        ));
                    }
                }
                DirectiveKind::Attribute => attribute_directives.push(pending),
                DirectiveKind::Output => output_directives.push(pending),
            }
        }

        ast.set_attributes(id, kept);
        if removed {
            if let NodeKind::Element(element) = ast.kind_mut(id) {
                // no stray space before `>`; `<br />` keeps its space
                let keep = element.close == TagClose::SelfClosing
                    && !element.trailing_whitespace.is_empty();
                element.trailing_whitespace = if keep {
                    SmolStr::new_static(" ")
                } else {
                    SmolStr::default()
                };
            }
        }

        if let Some(pending) = content {
            let directive = self.directive(ast, pending, Vec::new(), &source);
            self.compile_now(ast, directive)?;
            ast.set_children(id, vec![directive]);
        }
        for pending in attribute_directives {
            let directive = self.directive(ast, pending, vec![id], &source);
            self.compile_now(ast, directive)?;
        }

        let mut subject = id;
        for pending in output_directives.into_iter().chain(control) {
            subject = self.directive(ast, pending, vec![subject], &source);
        }
        Ok(subject)
    }

    fn misplaced(&self, name: &str, attribute: &str) -> String {
        match name {
            "extends" => format!("{attribute} must be on a top-level element"),
            "with" => format!("{attribute} requires {}", self.config.directive_name("include")),
            "parent" => format!("{attribute} is only allowed inside {}", self.config.directive_name("block")),
            _ => format!("{attribute} is not allowed here"),
        }
    }

    fn directive(
        &self,
        ast: &mut Ast,
        pending: Pending,
        children: Vec<NodeId>,
        source: &Arc<SourceFile>,
    ) -> NodeId {
        ast.alloc(
            NodeKind::Directive(Directive {
                name: pending.name,
                expression: pending.expression,
                children,
                paired: None,
            }),
            pending.span,
            Arc::clone(source),
        )
    }

    fn compile_now(&self, ast: &mut Ast, directive: NodeId) -> Result<(), CompileError> {
        let name = match ast.kind(directive) {
            NodeKind::Directive(d) => d.name.clone(),
            _ => return Ok(()),
        };
        let Some(compiler) = self.registry.get(&name) else {
            return Err(self.registry.unknown(&name, self.config).at(ast.node(directive)));
        };
        let mut ctx = CompileContext::new(ast, self.config);
        compiler.compile(directive, &mut ctx).map(|_| ())
    }
}
