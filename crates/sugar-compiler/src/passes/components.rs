//! Component expansion.
//!
//! `<s-card title="Hi"><p>body</p></s-card>` is replaced by:
//!
//! ```text
//! ob_start(); <p>body</p> $__slot_0 = ob_get_clean();
//! (function (array $__vars): void { extract($__vars, EXTR_SKIP);
//!     …card template…
//! })(array_merge(['title' => 'Hi'], ['slot' => $__slot_0]));
//! ```
//!
//! Slot content renders in the caller's scope and is escaped there, so the
//! component prints slot variables raw.

use crate::blocks::BlockManager;
use crate::component_cache::ComponentCache;
use crate::config::{CompilerConfig, MAX_COMPONENT_DEPTH};
use crate::error::{CompileError, ErrorKind};
use crate::loader::TemplateLoader;
use crate::passes::{ContextAnalysis, DirectiveExtraction, DirectivePairing, InheritanceResolver};
use crate::registry::DirectiveRegistry;
use crate::suggest::did_you_mean;
use camino::Utf8PathBuf;
use indexmap::{IndexMap, IndexSet};
use smol_str::SmolStr;
use sugar_parser::expression::is_array_literal;
use sugar_parser::{Ast, AttributePart, AttributeValue, Fragment, NodeId, NodeKind, OutputContext};

/// Name of the default slot variable.
pub const DEFAULT_SLOT: &str = "slot";

/// The component expansion pass.
pub struct ComponentExpansion<'a> {
    registry: &'a DirectiveRegistry,
    config: &'a CompilerConfig,
    loader: &'a dyn TemplateLoader,
    cache: &'a ComponentCache,
    components: IndexSet<SmolStr>,
    dependencies: IndexSet<Utf8PathBuf>,
    invocations: usize,
}

impl<'a> ComponentExpansion<'a> {
    /// Creates the pass.
    pub fn new(
        registry: &'a DirectiveRegistry,
        config: &'a CompilerConfig,
        loader: &'a dyn TemplateLoader,
        cache: &'a ComponentCache,
    ) -> Self {
        Self {
            registry,
            config,
            loader,
            cache,
            components: IndexSet::new(),
            dependencies: IndexSet::new(),
            invocations: 0,
        }
    }

    /// Expands every component below `root`.
    pub fn run(&mut self, ast: &mut Ast, root: NodeId) -> Result<(), CompileError> {
        self.expand_children(ast, root, &mut Vec::new())
    }

    /// Names of the components that were expanded.
    pub fn components(&self) -> &IndexSet<SmolStr> {
        &self.components
    }

    /// Template files the expanded components and their partials were read
    /// from.
    pub fn dependencies(&self) -> &IndexSet<Utf8PathBuf> {
        &self.dependencies
    }

    fn expand_children(&mut self, ast: &mut Ast, id: NodeId, stack: &mut Vec<SmolStr>) -> Result<(), CompileError> {
        let children = ast.children(id).to_vec();
        let expanded = self.expand_list(ast, children, stack)?;
        ast.set_children(id, expanded);
        Ok(())
    }

    fn expand_list(
        &mut self,
        ast: &mut Ast,
        nodes: Vec<NodeId>,
        stack: &mut Vec<SmolStr>,
    ) -> Result<Vec<NodeId>, CompileError> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            if matches!(ast.kind(node), NodeKind::Component(_)) {
                out.push(self.expand_component(ast, node, stack)?);
            } else {
                self.expand_children(ast, node, stack)?;
                out.push(node);
            }
        }
        Ok(out)
    }

    fn expand_component(&mut self, ast: &mut Ast, id: NodeId, stack: &mut Vec<SmolStr>) -> Result<NodeId, CompileError> {
        let NodeKind::Component(component) = ast.kind(id) else {
            return Ok(id);
        };
        let name = component.name.clone();

        if stack.contains(&name) || stack.len() >= MAX_COMPONENT_DEPTH {
            let chain: Vec<&str> = stack
                .iter()
                .chain(std::iter::once(&name))
                .map(SmolStr::as_str)
                .collect();
            return Err(CompileError::syntax(format!(
                "Circular component reference detected: {}",
                chain.join(" -> ")
            ))
            .at(ast.node(id)));
        }

        let available = self.loader.components();
        let Some(path) = available.get(&name).cloned() else {
            let suggestion = did_you_mean(&name, available.keys().map(SmolStr::as_str));
            return Err(CompileError::new(ErrorKind::ComponentNotFound {
                name: name.to_string(),
                suggestion,
            })
            .at(ast.node(id)));
        };

        tracing::debug!(component = %name, %path, depth = stack.len(), "expanding component");
        let template = self
            .cache
            .get_or_parse(&name, &path, self.loader, &self.config.parse_options())?;
        self.components.insert(name.clone());
        self.dependencies.insert(path.clone());

        // slots are read before nested components lose their `s:slot`
        let slots = self.partition_slots(ast, id)?;
        let bind = self.take_bind(ast, id)?;
        let props = self.props(ast, id);

        let mut captured = Vec::with_capacity(slots.len());
        for (slot, nodes) in slots {
            captured.push((slot, self.expand_list(ast, nodes, stack)?));
        }

        let body = ast.alloc_at(NodeKind::Fragment(Fragment::default()), id);
        let imported: Vec<NodeId> = template
            .children(template.root())
            .iter()
            .map(|&child| ast.import(&template, child))
            .collect();
        ast.set_children(body, imported);

        let blocks = BlockManager::new();
        let mut inheritance = InheritanceResolver::new(self.config, self.loader, &blocks);
        inheritance.resolve_component(ast, body, &path)?;
        self.dependencies.extend(inheritance.dependencies().iter().cloned());

        DirectiveExtraction::new(self.registry, self.config).run(ast, body)?;
        DirectivePairing::new(self.registry).run(ast, body);

        let slot_names: Vec<SmolStr> = captured.iter().map(|(slot, _)| slot.clone()).collect();
        mark_slot_outputs_raw(ast, body, &slot_names);

        stack.push(name);
        let nested = self.expand_children(ast, body, stack);
        stack.pop();
        nested?;

        let invocation = self.invocations;
        self.invocations += 1;

        let mut sequence = Vec::new();
        let mut bindings = Vec::new();
        for (slot, nodes) in captured {
            if nodes.is_empty() {
                bindings.push(format!("{} => ''", php_string(&slot)));
                continue;
            }
            let var = if slot == DEFAULT_SLOT {
                format!("$__slot_{invocation}")
            } else {
                format!("$__slot_{invocation}_{}", identifier(&slot))
            };
            sequence.push(ast.raw_at("ob_start();", id));
            sequence.extend(nodes);
            sequence.push(ast.raw_at(format!("{var} = ob_get_clean();"), id));
            bindings.push(format!("{} => {var}", php_string(&slot)));
        }

        let props = format!("[{}]", props.join(", "));
        let slots = format!("[{}]", bindings.join(", "));
        let arguments = match bind {
            Some(bind) => format!("array_merge({props}, {bind}, {slots})"),
            None => format!("array_merge({props}, {slots})"),
        };
        sequence.push(ast.raw_at(
            "(function (array $__vars): void { extract($__vars, EXTR_SKIP);",
            id,
        ));
        sequence.push(body);
        sequence.push(ast.raw_at(format!("}})({arguments});"), id));

        let expanded = ast.alloc_at(
            NodeKind::Fragment(Fragment {
                children: sequence,
                ..Fragment::default()
            }),
            id,
        );
        ContextAnalysis::new().run(ast, expanded);
        Ok(expanded)
    }

    /// Splits component children into the default slot and named slots.
    fn partition_slots(&self, ast: &mut Ast, id: NodeId) -> Result<Vec<(SmolStr, Vec<NodeId>)>, CompileError> {
        let slot_attribute = self.config.directive_name("slot");
        let mut slots: IndexMap<SmolStr, Vec<NodeId>> = IndexMap::new();
        slots.insert(SmolStr::new_static(DEFAULT_SLOT), Vec::new());

        for child in ast.children(id).to_vec() {
            let mut subject = child;
            while let NodeKind::Directive(directive) = ast.kind(subject) {
                match directive.children.first() {
                    Some(&inner) => subject = inner,
                    None => break,
                }
            }

            let slot = match ast.take_attribute(subject, &slot_attribute) {
                Some(attribute) => match attribute.static_value().map(str::trim) {
                    Some(name) if !name.is_empty() => SmolStr::new(name),
                    _ => {
                        return Err(CompileError::syntax(format!("{slot_attribute} requires a slot name"))
                            .at(ast.node(subject)))
                    }
                },
                None => SmolStr::new_static(DEFAULT_SLOT),
            };
            slots.entry(slot).or_default().push(child);
        }

        // whitespace around named slots is not default content
        if let Some(default) = slots.get_mut(DEFAULT_SLOT) {
            if default
                .iter()
                .all(|&n| matches!(ast.kind(n), NodeKind::Text(t) if t.is_whitespace()))
            {
                default.clear();
            }
        }
        Ok(slots.into_iter().collect())
    }

    fn take_bind(&self, ast: &mut Ast, id: NodeId) -> Result<Option<String>, CompileError> {
        let bind_attribute = self.config.directive_name("bind");
        let Some(attribute) = ast.take_attribute(id, &bind_attribute) else {
            return Ok(None);
        };
        match attribute.static_value().map(str::trim) {
            Some(expression) if is_array_literal(expression) => Ok(Some(expression.to_string())),
            _ => Err(CompileError::syntax(format!(
                "{bind_attribute} attribute must be an array expression"
            ))
            .at(ast.node(id))),
        }
    }

    /// Regular attributes as `'name' => value` pairs.
    fn props(&self, ast: &Ast, id: NodeId) -> Vec<String> {
        let expression = |output: NodeId| match ast.kind(output) {
            NodeKind::Output(o) => format!("({})", o.expression),
            _ => "null".to_string(),
        };
        ast.attributes(id)
            .iter()
            .filter(|a| !a.name.is_empty() && self.config.strip_directive(&a.name).is_none())
            .map(|attribute| {
                let value = match &attribute.value {
                    AttributeValue::Boolean => "true".to_string(),
                    AttributeValue::Static(value) => php_string(value),
                    AttributeValue::Output(output) => expression(*output),
                    AttributeValue::Parts(parts) => parts
                        .iter()
                        .map(|part| match part {
                            AttributePart::Text(text) => php_string(text),
                            AttributePart::Output(output) => expression(*output),
                        })
                        .collect::<Vec<_>>()
                        .join(" . "),
                };
                format!("{} => {value}", php_string(&attribute.name))
            })
            .collect()
    }
}

/// Prints slot variables raw inside the component body.
fn mark_slot_outputs_raw(ast: &mut Ast, body: NodeId, slots: &[SmolStr]) {
    for id in ast.descendants(body) {
        if let NodeKind::Output(output) = ast.kind_mut(id) {
            let printed = output.expression.trim();
            let is_slot = printed
                .strip_prefix('$')
                .is_some_and(|var| slots.iter().any(|slot| slot == var));
            if is_slot {
                output.escape = false;
                output.context = OutputContext::Raw;
            }
        }
    }
}

/// Quotes `value` as a single-quoted PHP string.
pub(crate) fn php_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn identifier(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
