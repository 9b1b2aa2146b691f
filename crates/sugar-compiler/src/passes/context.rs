//! Context analysis.
//!
//! Walks the tree in document order and stamps every escaped output with the
//! lexical context it is printed in, so that codegen can pick the escaper.
//! Raw outputs are never touched. The pass cannot fail: markup it does not
//! understand leaves the state as it was.

use sugar_parser::{attribute_outputs, Ast, AttributePart, AttributeValue, NodeId, NodeKind, OutputContext};

/// Attributes whose query string takes URL escaping.
const URL_ATTRIBUTES: &[&str] = &["href", "src", "action", "formaction"];

/// Lexical state at the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// HTML body text.
    Html,
    /// Inside `<script>`.
    Script,
    /// Inside `<style>`.
    Style,
    /// Inside an attribute value opened by the given quote.
    Attribute(u8),
}

impl ScanState {
    fn context(self) -> OutputContext {
        match self {
            ScanState::Html => OutputContext::Html,
            ScanState::Script => OutputContext::Javascript,
            ScanState::Style => OutputContext::Css,
            ScanState::Attribute(_) => OutputContext::HtmlAttribute,
        }
    }
}

/// The context analysis pass.
#[derive(Debug, Default)]
pub struct ContextAnalysis;

impl ContextAnalysis {
    /// Creates the pass.
    pub fn new() -> Self {
        Self
    }

    /// Analyses the subtree at `root`, starting in HTML state.
    pub fn run(&self, ast: &mut Ast, root: NodeId) {
        let mut state = ScanState::Html;
        self.walk(ast, root, &mut state);
    }

    fn walk(&self, ast: &mut Ast, id: NodeId, state: &mut ScanState) {
        match ast.kind(id) {
            NodeKind::Text(text) => {
                *state = scan(&text.content, *state);
            }
            NodeKind::Output(_) => stamp(ast, id, state.context()),
            NodeKind::RawCode(_) => {}
            NodeKind::Element(element) => {
                let inner = if element.name.eq_ignore_ascii_case("script") {
                    ScanState::Script
                } else if element.name.eq_ignore_ascii_case("style") {
                    ScanState::Style
                } else {
                    *state
                };
                self.stamp_attributes(ast, id);
                let mut inner_state = inner;
                for child in ast.children(id).to_vec() {
                    self.walk(ast, child, &mut inner_state);
                }
            }
            NodeKind::Fragment(_) => {
                self.stamp_attributes(ast, id);
                self.walk_children(ast, id, state);
            }
            // component attributes become closure arguments, not markup
            NodeKind::Document(_) | NodeKind::Directive(_) | NodeKind::Component(_) => {
                self.walk_children(ast, id, state);
            }
        }
    }

    fn walk_children(&self, ast: &mut Ast, id: NodeId, state: &mut ScanState) {
        for child in ast.children(id).to_vec() {
            self.walk(ast, child, state);
        }
    }

    fn stamp_attributes(&self, ast: &mut Ast, id: NodeId) {
        let mut stamps = Vec::new();
        for attribute in ast.attributes(id) {
            let url = URL_ATTRIBUTES
                .iter()
                .any(|name| attribute.name.eq_ignore_ascii_case(name));
            match &attribute.value {
                AttributeValue::Parts(parts) if url => {
                    let mut in_query = false;
                    for part in parts {
                        match part {
                            AttributePart::Text(text) => in_query |= text.contains('?'),
                            AttributePart::Output(output) => {
                                let context = if in_query {
                                    OutputContext::Url
                                } else {
                                    OutputContext::HtmlAttribute
                                };
                                stamps.push((*output, context));
                            }
                        }
                    }
                }
                value => stamps.extend(
                    attribute_outputs(value)
                        .into_iter()
                        .map(|output| (output, OutputContext::HtmlAttribute)),
                ),
            }
        }
        for (output, context) in stamps {
            stamp(ast, output, context);
        }
    }
}

fn stamp(ast: &mut Ast, id: NodeId, context: OutputContext) {
    if let NodeKind::Output(output) = ast.kind_mut(id) {
        if output.escape && output.context == OutputContext::Html {
            output.context = context;
        }
    }
}

/// Advances `state` over a run of literal markup.
///
/// Every transition inside the text is honoured in order: `<script`/`<style>`
/// openers and their closing tags, and `name="` attribute openers with their
/// closing quote.
pub fn scan(text: &str, mut state: ScanState) -> ScanState {
    let lower = text.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        match state {
            ScanState::Html => {
                let rest = &lower[pos..];
                let script = find_open_tag(rest, "<script");
                let style = find_open_tag(rest, "<style");
                let attribute = find_attribute_open(rest.as_bytes());

                let next = [
                    script.map(|i| (i, ScanState::Script, "<script".len())),
                    style.map(|i| (i, ScanState::Style, "<style".len())),
                    attribute.map(|(i, quote)| (i, ScanState::Attribute(quote), 1)),
                ]
                .into_iter()
                .flatten()
                .min_by_key(|(i, _, _)| *i);

                let Some((at, next_state, len)) = next else {
                    break;
                };
                pos += at + len;
                if matches!(next_state, ScanState::Script | ScanState::Style) {
                    // the body starts after the opening tag ends
                    match lower[pos..].find('>') {
                        Some(end) => pos += end + 1,
                        None => pos = bytes.len(),
                    }
                }
                state = next_state;
            }
            ScanState::Script | ScanState::Style => {
                let close = if state == ScanState::Script {
                    "</script"
                } else {
                    "</style"
                };
                match lower[pos..].find(close) {
                    Some(at) => {
                        pos += at + close.len();
                        state = ScanState::Html;
                    }
                    None => break,
                }
            }
            ScanState::Attribute(quote) => match bytes[pos..].iter().position(|&b| b == quote) {
                Some(at) => {
                    pos += at + 1;
                    state = ScanState::Html;
                }
                None => break,
            },
        }
    }
    state
}

/// Finds `<tag` followed by a tag-name boundary.
fn find_open_tag(text: &str, tag: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(at) = text[from..].find(tag) {
        let start = from + at;
        let boundary = text.as_bytes().get(start + tag.len()).copied();
        if matches!(boundary, None | Some(b'>' | b'/' | b' ' | b'\t' | b'\n' | b'\r')) {
            return Some(start);
        }
        from = start + tag.len();
    }
    None
}

/// Finds `name="` / `name='`, returning the quote offset and character.
fn find_attribute_open(bytes: &[u8]) -> Option<(usize, u8)> {
    let is_name = |b: u8| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'@');
    for (idx, &b) in bytes.iter().enumerate() {
        if b != b'"' && b != b'\'' {
            continue;
        }
        let before = &bytes[..idx];
        let trimmed = before
            .iter()
            .rposition(|c| !c.is_ascii_whitespace())
            .map(|end| &before[..=end])
            .unwrap_or_default();
        let Some((&b'=', name)) = trimmed.split_last() else {
            continue;
        };
        let name_end = name.iter().rposition(|c| !c.is_ascii_whitespace());
        if name_end.is_some_and(|end| is_name(name[end])) {
            return Some((idx, b));
        }
    }
    None
}
