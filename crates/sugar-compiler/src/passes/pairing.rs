//! Directive pairing.
//!
//! Links every node to its parent, then connects sibling directives that form
//! one construct (`s:if` → `s:elseif` → `s:else`, `s:forelse` → `s:empty`).
//! Whitespace-only text between the siblings does not break a pair; any other
//! node does.

use crate::registry::DirectiveRegistry;
use sugar_parser::{Ast, NodeId, NodeKind};

/// The directive pairing pass.
pub struct DirectivePairing<'a> {
    registry: &'a DirectiveRegistry,
}

impl<'a> DirectivePairing<'a> {
    /// Creates the pass.
    pub fn new(registry: &'a DirectiveRegistry) -> Self {
        Self { registry }
    }

    /// Links parents and pairs directives below `root`.
    pub fn run(&self, ast: &mut Ast, root: NodeId) {
        ast.link_parents(root);
        for id in ast.descendants(root) {
            let children = ast.children(id).to_vec();
            self.pair_siblings(ast, &children);
        }
    }

    fn pair_siblings(&self, ast: &mut Ast, siblings: &[NodeId]) {
        for (idx, &id) in siblings.iter().enumerate() {
            let NodeKind::Directive(directive) = ast.kind(id) else {
                continue;
            };
            let Some(compiler) = self.registry.get(&directive.name) else {
                continue;
            };
            let pairs_with = compiler.pairs_with();
            if pairs_with.is_empty() {
                continue;
            }

            let next = siblings[idx + 1..]
                .iter()
                .copied()
                .find(|&s| !matches!(ast.kind(s), NodeKind::Text(t) if t.is_whitespace()));
            let Some(next) = next else {
                continue;
            };
            let matches = matches!(
                ast.kind(next),
                NodeKind::Directive(d) if pairs_with.contains(&d.name.as_str())
            );
            if matches {
                if let NodeKind::Directive(directive) = ast.kind_mut(id) {
                    directive.paired = Some(next);
                }
            }
        }
    }
}
