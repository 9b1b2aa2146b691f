//! Arena AST for Sugar templates.
//!
//! Nodes are stored in a flat vector and referenced by [`NodeId`]. Passes
//! rewrite children lists in place; nodes that drop out of the tree simply stay
//! unreachable in the arena until the whole [`Ast`] is discarded at the end of
//! a compile.

use smol_str::SmolStr;
use source_map::{SourceFile, Span};
use std::fmt;
use std::sync::Arc;

/// Index of a node inside an [`Ast`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Returns the arena index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A node with its location and parent link.
#[derive(Debug, Clone)]
pub struct Node {
    /// What the node is.
    pub kind: NodeKind,
    /// The parent node, assigned by the pairing pass.
    pub parent: Option<NodeId>,
    /// Location inside `source`.
    pub span: Span,
    /// The template this node was parsed from.
    pub source: Arc<SourceFile>,
}

/// The closed set of node kinds.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// The root of a template.
    Document(Document),
    /// An HTML element.
    Element(Element),
    /// A non-rendering wrapper (`<s-template>`).
    Fragment(Fragment),
    /// Literal markup.
    Text(Text),
    /// A dynamic output expression.
    Output(Output),
    /// Opaque target code.
    RawCode(RawCode),
    /// An extracted directive wrapping its subject.
    Directive(Directive),
    /// A component invocation (`<s-button>`).
    Component(Component),
}

impl NodeKind {
    /// Returns a short name for the node kind, used in debug output.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Document(_) => "document",
            NodeKind::Element(_) => "element",
            NodeKind::Fragment(_) => "fragment",
            NodeKind::Text(_) => "text",
            NodeKind::Output(_) => "output",
            NodeKind::RawCode(_) => "raw code",
            NodeKind::Directive(_) => "directive",
            NodeKind::Component(_) => "component",
        }
    }
}

/// The document root.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// Top-level nodes.
    pub children: Vec<NodeId>,
}

/// How an element's tag is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClose {
    /// `<div>…</div>`
    Normal,
    /// `<br/>`
    SelfClosing,
    /// `<br>`: a void element without a closing tag.
    Void,
}

/// An HTML element.
#[derive(Debug, Clone)]
pub struct Element {
    /// The tag name as written.
    pub name: SmolStr,
    /// Attributes in source order.
    pub attributes: Vec<Attribute>,
    /// Child nodes.
    pub children: Vec<NodeId>,
    /// How the tag is closed.
    pub close: TagClose,
    /// Whitespace between the last attribute and `>` or `/>`.
    pub trailing_whitespace: SmolStr,
    /// Expression computing the tag name at render time (`s:tag`).
    pub dynamic_tag: Option<String>,
}

/// A non-rendering wrapper element.
#[derive(Debug, Clone, Default)]
pub struct Fragment {
    /// Attributes; only directives are legal here.
    pub attributes: Vec<Attribute>,
    /// Child nodes.
    pub children: Vec<NodeId>,
    /// Block name when this fragment marks a resolved inheritance block.
    pub region: Option<SmolStr>,
}

/// Literal text (including comments and markup the parser treats opaquely).
#[derive(Debug, Clone)]
pub struct Text {
    /// The text as written.
    pub content: String,
}

impl Text {
    /// Returns true if the text is only whitespace.
    pub fn is_whitespace(&self) -> bool {
        self.content.chars().all(char::is_whitespace)
    }
}

/// The escaping context of an output expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OutputContext {
    /// HTML body text.
    #[default]
    Html,
    /// Inside an attribute value.
    HtmlAttribute,
    /// Inside `<script>`.
    Javascript,
    /// Inside `<style>`.
    Css,
    /// A URL component.
    Url,
    /// No escaping.
    Raw,
}

/// A dynamic output (`<?= expr ?>`).
#[derive(Debug, Clone)]
pub struct Output {
    /// The target-language expression.
    pub expression: String,
    /// Whether the value is escaped.
    pub escape: bool,
    /// The escaping context, stamped by context analysis.
    pub context: OutputContext,
}

/// Opaque target code (`<?php … ?>` or code emitted by passes).
#[derive(Debug, Clone)]
pub struct RawCode {
    /// The code without the open/close tags.
    pub code: String,
}

/// A directive wrapping the node it applies to.
#[derive(Debug, Clone)]
pub struct Directive {
    /// Directive name without the prefix (`if`, `foreach`, …).
    pub name: SmolStr,
    /// The literal directive expression, if any.
    pub expression: Option<String>,
    /// The wrapped nodes.
    pub children: Vec<NodeId>,
    /// The next directive of the same construct (`else` after `if`, …).
    pub paired: Option<NodeId>,
}

/// A component invocation.
#[derive(Debug, Clone)]
pub struct Component {
    /// Component name without the tag prefix (`button` for `<s-button>`).
    pub name: SmolStr,
    /// The tag as written.
    pub tag: SmolStr,
    /// Attributes in source order.
    pub attributes: Vec<Attribute>,
    /// Slot content.
    pub children: Vec<NodeId>,
}

/// Quote style of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quote {
    /// `"…"`
    Double,
    /// `'…'`
    Single,
    /// Unquoted or no value.
    None,
}

impl Quote {
    /// Returns the quote character, if any.
    pub fn as_str(self) -> &'static str {
        match self {
            Quote::Double => "\"",
            Quote::Single => "'",
            Quote::None => "",
        }
    }
}

/// An element, fragment or component attribute.
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Attribute name as written.
    pub name: SmolStr,
    /// Attribute value.
    pub value: AttributeValue,
    /// Quote style of the value.
    pub quote: Quote,
    /// Whitespace preceding the attribute inside the tag.
    pub leading_whitespace: SmolStr,
    /// Location of the attribute.
    pub span: Span,
}

impl Attribute {
    /// Creates a double-quoted attribute preceded by a single space.
    pub fn new(name: impl Into<SmolStr>, value: AttributeValue, span: Span) -> Self {
        Self {
            name: name.into(),
            value,
            quote: Quote::Double,
            leading_whitespace: SmolStr::new_static(" "),
            span,
        }
    }

    /// Returns the value when it is a literal string.
    pub fn static_value(&self) -> Option<&str> {
        match &self.value {
            AttributeValue::Static(value) => Some(value),
            AttributeValue::Boolean => Some(""),
            _ => None,
        }
    }

    /// Returns true when the value contains an output expression.
    pub fn is_dynamic(&self) -> bool {
        matches!(
            self.value,
            AttributeValue::Output(_) | AttributeValue::Parts(_)
        )
    }
}

/// An attribute value.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    /// No value (`disabled`).
    Boolean,
    /// A literal string.
    Static(String),
    /// A single output expression.
    Output(NodeId),
    /// Literal text mixed with output expressions.
    Parts(Vec<AttributePart>),
}

/// A piece of a mixed attribute value.
#[derive(Debug, Clone)]
pub enum AttributePart {
    /// Literal text.
    Text(String),
    /// An output expression.
    Output(NodeId),
}

/// An arena of nodes with a document root.
#[derive(Debug, Clone)]
pub struct Ast {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Ast {
    /// Creates an AST containing an empty document for `source`.
    pub fn new(source: Arc<SourceFile>) -> Self {
        let span = Span::from_offsets(0, source.text().len());
        let mut ast = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        ast.root = ast.alloc(NodeKind::Document(Document::default()), span, source);
        ast
    }

    /// Returns the document root.
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns the template the root was parsed from.
    pub fn source(&self) -> &Arc<SourceFile> {
        &self.node(self.root).source
    }

    /// Returns the number of allocated nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the arena holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocates a new node.
    pub fn alloc(&mut self, kind: NodeKind, span: Span, source: Arc<SourceFile>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            parent: None,
            span,
            source,
        });
        id
    }

    /// Allocates a node located at `at`.
    pub fn alloc_at(&mut self, kind: NodeKind, at: NodeId) -> NodeId {
        let (span, source) = {
            let node = self.node(at);
            (node.span, Arc::clone(&node.source))
        };
        self.alloc(kind, span, source)
    }

    /// Allocates a text node located at `at`.
    pub fn text_at(&mut self, content: impl Into<String>, at: NodeId) -> NodeId {
        self.alloc_at(
            NodeKind::Text(Text {
                content: content.into(),
            }),
            at,
        )
    }

    /// Allocates a raw code node located at `at`.
    pub fn raw_at(&mut self, code: impl Into<String>, at: NodeId) -> NodeId {
        self.alloc_at(NodeKind::RawCode(RawCode { code: code.into() }), at)
    }

    /// Allocates an output node located at `at`.
    pub fn output_at(&mut self, expression: impl Into<String>, escape: bool, at: NodeId) -> NodeId {
        self.alloc_at(
            NodeKind::Output(Output {
                expression: expression.into(),
                escape,
                context: if escape {
                    OutputContext::Html
                } else {
                    OutputContext::Raw
                },
            }),
            at,
        )
    }

    /// Returns a node.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Returns a node mutably.
    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Returns a node's kind.
    #[inline]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    /// Returns a node's kind mutably.
    #[inline]
    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.node_mut(id).kind
    }

    /// Returns a node's parent.
    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Returns a node's children; leaves have none.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.kind(id) {
            NodeKind::Document(n) => &n.children,
            NodeKind::Element(n) => &n.children,
            NodeKind::Fragment(n) => &n.children,
            NodeKind::Directive(n) => &n.children,
            NodeKind::Component(n) => &n.children,
            NodeKind::Text(_) | NodeKind::Output(_) | NodeKind::RawCode(_) => &[],
        }
    }

    /// Returns a node's children mutably; `None` for leaves.
    pub fn children_mut(&mut self, id: NodeId) -> Option<&mut Vec<NodeId>> {
        match self.kind_mut(id) {
            NodeKind::Document(n) => Some(&mut n.children),
            NodeKind::Element(n) => Some(&mut n.children),
            NodeKind::Fragment(n) => Some(&mut n.children),
            NodeKind::Directive(n) => Some(&mut n.children),
            NodeKind::Component(n) => Some(&mut n.children),
            NodeKind::Text(_) | NodeKind::Output(_) | NodeKind::RawCode(_) => None,
        }
    }

    /// Replaces a node's children. Leaves are left untouched.
    pub fn set_children(&mut self, id: NodeId, children: Vec<NodeId>) {
        if let Some(slot) = self.children_mut(id) {
            *slot = children;
        }
    }

    /// Returns a node's attributes; nodes without attributes have none.
    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match self.kind(id) {
            NodeKind::Element(n) => &n.attributes,
            NodeKind::Fragment(n) => &n.attributes,
            NodeKind::Component(n) => &n.attributes,
            _ => &[],
        }
    }

    /// Returns a node's attributes mutably.
    pub fn attributes_mut(&mut self, id: NodeId) -> Option<&mut Vec<Attribute>> {
        match self.kind_mut(id) {
            NodeKind::Element(n) => Some(&mut n.attributes),
            NodeKind::Fragment(n) => Some(&mut n.attributes),
            NodeKind::Component(n) => Some(&mut n.attributes),
            _ => None,
        }
    }

    /// Replaces a node's attributes. Nodes without attributes are left
    /// untouched.
    pub fn set_attributes(&mut self, id: NodeId, attributes: Vec<Attribute>) {
        if let Some(slot) = self.attributes_mut(id) {
            *slot = attributes;
        }
    }

    /// Finds an attribute by exact name.
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&Attribute> {
        self.attributes(id).iter().find(|a| a.name == name)
    }

    /// Removes and returns an attribute by exact name.
    pub fn take_attribute(&mut self, id: NodeId, name: &str) -> Option<Attribute> {
        let attributes = self.attributes_mut(id)?;
        let idx = attributes.iter().position(|a| a.name == name)?;
        Some(attributes.remove(idx))
    }

    /// Iterates over the ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p))
    }

    /// Collects `id` and all of its descendants in pre-order, including
    /// output nodes referenced from attribute values.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            for attr in self.attributes(current).iter().rev() {
                stack.extend(attribute_outputs(&attr.value).into_iter().rev());
            }
            stack.extend(self.children(current).iter().rev());
        }
        out
    }

    /// Assigns parent links for the subtree rooted at `id`.
    pub fn link_parents(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let mut linked: Vec<NodeId> = self.children(current).to_vec();
            for attr in self.attributes(current) {
                linked.extend(attribute_outputs(&attr.value));
            }
            for child in linked {
                self.node_mut(child).parent = Some(current);
                stack.push(child);
            }
        }
    }

    /// Deep-copies the subtree rooted at `id` inside this arena.
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let node = self.node(id).clone();
        let mut kind = node.kind;
        self.remap_kind(&mut kind, |ast, child| ast.deep_clone(child));
        self.alloc(kind, node.span, node.source)
    }

    /// Deep-copies the subtree rooted at `id` of `other` into this arena.
    pub fn import(&mut self, other: &Ast, id: NodeId) -> NodeId {
        let node = other.node(id);
        let mut kind = node.kind.clone();
        self.remap_kind(&mut kind, |ast, child| ast.import(other, child));
        self.alloc(kind, node.span, Arc::clone(&node.source))
    }

    fn remap_kind(&mut self, kind: &mut NodeKind, mut copy: impl FnMut(&mut Self, NodeId) -> NodeId) {
        let (children, attributes) = match kind {
            NodeKind::Document(n) => (Some(&mut n.children), None),
            NodeKind::Element(n) => (Some(&mut n.children), Some(&mut n.attributes)),
            NodeKind::Fragment(n) => (Some(&mut n.children), Some(&mut n.attributes)),
            NodeKind::Directive(n) => {
                // a copy never keeps its pairing; the pairing pass reruns
                n.paired = None;
                (Some(&mut n.children), None)
            }
            NodeKind::Component(n) => (Some(&mut n.children), Some(&mut n.attributes)),
            NodeKind::Text(_) | NodeKind::Output(_) | NodeKind::RawCode(_) => (None, None),
        };
        if let Some(attributes) = attributes {
            for attr in attributes.iter_mut() {
                match &mut attr.value {
                    AttributeValue::Output(out) => *out = copy(self, *out),
                    AttributeValue::Parts(parts) => {
                        for part in parts.iter_mut() {
                            if let AttributePart::Output(out) = part {
                                *out = copy(self, *out);
                            }
                        }
                    }
                    AttributeValue::Boolean | AttributeValue::Static(_) => {}
                }
            }
        }
        if let Some(children) = children {
            for child in children.iter_mut() {
                *child = copy(self, *child);
            }
        }
    }
}

/// Returns the output nodes referenced by an attribute value.
pub fn attribute_outputs(value: &AttributeValue) -> Vec<NodeId> {
    match value {
        AttributeValue::Output(id) => vec![*id],
        AttributeValue::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                AttributePart::Output(id) => Some(*id),
                AttributePart::Text(_) => None,
            })
            .collect(),
        AttributeValue::Boolean | AttributeValue::Static(_) => Vec::new(),
    }
}
