//! Recursive descent parser for Sugar templates.

use crate::ast::*;
use crate::error::{ParseError, ParseErrorKind};
use crate::expression::parse_output_expression;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::{ParseOptions, ParseResult};
use smol_str::SmolStr;
use source_map::{SourceFile, Span};
use std::sync::Arc;
use text_size::TextSize;

/// HTML void elements that are self-closing and should not have closing tags.
/// See: https://developer.mozilla.org/en-US/docs/Glossary/Void_element
const HTML_VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Returns true if the given element name is an HTML void element.
fn is_void_element(name: &str) -> bool {
    HTML_VOID_ELEMENTS.contains(&name.to_lowercase().as_str())
}

/// Elements whose body is raw text rather than markup.
fn is_raw_text_element(name: &str) -> bool {
    name.eq_ignore_ascii_case("script") || name.eq_ignore_ascii_case("style")
}

fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

/// The Sugar parser.
pub struct Parser<'src> {
    /// The template being parsed.
    file: &'src Arc<SourceFile>,
    /// The source text.
    source: &'src str,
    /// The token stream.
    tokens: Vec<Token>,
    /// Current position in the token stream.
    pos: usize,
    /// Parse errors collected during parsing.
    errors: Vec<ParseError>,
    /// Parser options.
    options: &'src ParseOptions,
    /// EOF token for when we're past the end
    eof_token: Token,
    /// The arena being built.
    ast: Ast,
    /// Names of the elements currently open, outermost first.
    open_tags: Vec<SmolStr>,
}

impl<'src> Parser<'src> {
    /// Creates a new parser.
    pub fn new(file: &'src Arc<SourceFile>, options: &'src ParseOptions) -> Self {
        let source = file.text();
        let tokens: Vec<Token> = Lexer::new(source).collect();
        let eof_token = Token {
            kind: TokenKind::Eof,
            span: Span::empty(TextSize::from(source.len() as u32)),
        };
        Self {
            file,
            source,
            tokens,
            pos: 0,
            errors: Vec::new(),
            options,
            eof_token,
            ast: Ast::new(Arc::clone(file)),
            open_tags: Vec::new(),
        }
    }

    /// Parses the source into an AST.
    pub fn parse(mut self) -> ParseResult {
        let root = self.ast.root();
        let children = self.parse_document();
        self.ast.set_children(root, children);
        ParseResult {
            ast: self.ast,
            errors: self.errors,
        }
    }

    // === Token helpers ===

    /// Returns the current token.
    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof_token)
    }

    /// Returns the current token kind.
    fn current_kind(&self) -> TokenKind {
        self.current().kind
    }

    /// Returns the kind of the token `n` positions ahead.
    fn peek_kind(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    /// Returns the text of the current token.
    fn current_text(&self) -> &'src str {
        let source: &'src str = self.source;
        self.current().span.slice(source)
    }

    /// Returns the byte offset of the current token.
    fn offset(&self) -> usize {
        u32::from(self.current().span.start) as usize
    }

    /// Returns the end offset of the previous token.
    fn prev_end(&self) -> usize {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| u32::from(t.span.end) as usize)
            .unwrap_or(0)
    }

    /// Advances to the next token.
    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// Skips every token starting before `offset`.
    fn advance_to(&mut self, offset: usize) {
        let end = TextSize::from(offset as u32);
        while self.current().span.start < end && !self.check(TokenKind::Eof) {
            self.advance();
        }
    }

    /// Checks if the current token matches the given kind.
    fn check(&self, kind: TokenKind) -> bool {
        self.current_kind() == kind
    }

    /// Advances if the current token matches, returns true if matched.
    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Reports an error at the current position.
    fn error(&mut self, kind: ParseErrorKind) {
        self.errors.push(ParseError::new(kind, self.current().span));
    }

    /// Reports an error at the given span.
    fn error_at(&mut self, kind: ParseErrorKind, span: Span) {
        self.errors.push(ParseError::new(kind, span));
    }

    fn span(&self, start: usize, end: usize) -> Span {
        Span::from_offsets(start, end)
    }

    fn alloc(&mut self, kind: NodeKind, span: Span) -> NodeId {
        self.ast.alloc(kind, span, Arc::clone(self.file))
    }

    /// Appends `source[start..end]` as text, merging with a directly
    /// preceding text node.
    fn push_text(&mut self, nodes: &mut Vec<NodeId>, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let source: &'src str = self.source;
        let content = &source[start..end];
        if let Some(&last) = nodes.last() {
            let node = self.ast.node_mut(last);
            if u32::from(node.span.end) as usize == start {
                if let NodeKind::Text(text) = &mut node.kind {
                    text.content.push_str(content);
                    node.span = Span::new(node.span.start, TextSize::from(end as u32));
                    return;
                }
            }
        }
        let id = self.alloc(
            NodeKind::Text(Text {
                content: content.to_string(),
            }),
            self.span(start, end),
        );
        nodes.push(id);
    }

    // === Nodes ===

    fn parse_document(&mut self) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        while !self.check(TokenKind::Eof) {
            if self.check(TokenKind::LAngleSlash) {
                let tag_name = self.peek_closing_name();
                self.error(ParseErrorKind::UnexpectedClosingTag { tag_name });
                self.skip_closing_tag();
                continue;
            }
            self.parse_node(&mut nodes);
        }
        nodes
    }

    /// Parses one construct at the current position into `nodes`.
    fn parse_node(&mut self, nodes: &mut Vec<NodeId>) {
        match self.current_kind() {
            TokenKind::OutputOpen | TokenKind::CodeOpen => self.parse_embedded(nodes),
            TokenKind::CommentOpen => self.parse_comment(nodes),
            TokenKind::LAngle => {
                let start = self.offset();
                if self.peek_kind(1) == TokenKind::Ident {
                    let element = self.parse_element();
                    nodes.push(element);
                } else if self.source[start..].starts_with("<!") {
                    self.parse_declaration(nodes);
                } else {
                    // a lone `<` is just text
                    self.advance();
                    self.push_text(nodes, start, start + 1);
                }
            }
            _ => self.parse_text(nodes),
        }
    }

    /// Parses literal text up to the next `<`.
    fn parse_text(&mut self, nodes: &mut Vec<NodeId>) {
        let start = self.offset();
        let mut end = self.source[start..]
            .find('<')
            .map(|i| start + i)
            .unwrap_or(self.source.len());
        if end == start {
            end = u32::from(self.current().span.end) as usize;
        }
        self.advance_to(end);
        self.push_text(nodes, start, end);
    }

    /// Parses `<!DOCTYPE …>` and similar declarations as text.
    fn parse_declaration(&mut self, nodes: &mut Vec<NodeId>) {
        let start = self.offset();
        let end = self.source[start..]
            .find('>')
            .map(|i| start + i + 1)
            .unwrap_or(self.source.len());
        self.advance_to(end);
        self.push_text(nodes, start, end);
    }

    /// Parses an output tag or a code block at the current token.
    fn parse_embedded(&mut self, nodes: &mut Vec<NodeId>) {
        match self.embedded_at(self.offset()) {
            Some((id, end)) => {
                nodes.push(id);
                self.advance_to(end);
            }
            None => self.advance_to(self.source.len()),
        }
    }

    /// Builds the node for the `<?= … ?>` or `<?php … ?>` starting at `start`.
    ///
    /// Works on the source text only and returns the end offset; the caller
    /// decides how to move the token cursor.
    fn embedded_at(&mut self, start: usize) -> Option<(NodeId, usize)> {
        let source: &'src str = self.source;
        let is_output = source[start..].starts_with("<?=");
        let body_start = if is_output { start + 3 } else { start + 5 };

        let Some(len) = source[body_start..].find("?>") else {
            let kind = if is_output {
                ParseErrorKind::UnterminatedOutput
            } else {
                ParseErrorKind::UnterminatedCode
            };
            self.error_at(kind, self.span(start, body_start));
            return None;
        };

        let body = &source[body_start..body_start + len];
        let end = body_start + len + 2;
        let kind = if is_output {
            let (expression, escape) = parse_output_expression(body);
            NodeKind::Output(Output {
                expression,
                escape,
                context: if escape {
                    OutputContext::Html
                } else {
                    OutputContext::Raw
                },
            })
        } else {
            NodeKind::RawCode(RawCode {
                code: body.trim().to_string(),
            })
        };
        Some((self.alloc(kind, self.span(start, end)), end))
    }

    /// Splits opaque content starting at `from` into text, output and code
    /// nodes, stopping before `terminator`.
    ///
    /// Returns the offset of the terminator, or `None` if the source ended.
    fn scan_embedded(
        &mut self,
        nodes: &mut Vec<NodeId>,
        from: usize,
        terminator: &str,
        ignore_case: bool,
    ) -> Option<usize> {
        let source: &'src str = self.source;
        let mut pos = from;
        loop {
            let rest = &source[pos..];
            let term = if ignore_case {
                find_ignore_ascii_case(rest, terminator)
            } else {
                rest.find(terminator)
            };
            let tag = rest
                .find("<?=")
                .into_iter()
                .chain(rest.find("<?php"))
                .min();

            match (term, tag) {
                (_, Some(tag)) if term.map_or(true, |term| tag < term) => {
                    self.push_text(nodes, pos, pos + tag);
                    match self.embedded_at(pos + tag) {
                        Some((id, end)) => {
                            nodes.push(id);
                            pos = end;
                        }
                        None => {
                            self.push_text(nodes, pos + tag, source.len());
                            return None;
                        }
                    }
                }
                (Some(term), _) => {
                    self.push_text(nodes, pos, pos + term);
                    return Some(pos + term);
                }
                (None, _) => {
                    self.push_text(nodes, pos, source.len());
                    return None;
                }
            }
        }
    }

    /// Parses an HTML comment. Output tags inside it stay live.
    fn parse_comment(&mut self, nodes: &mut Vec<NodeId>) {
        let start = self.offset();
        self.push_text(nodes, start, start + 4);
        match self.scan_embedded(nodes, start + 4, "-->", false) {
            Some(close) => {
                self.push_text(nodes, close, close + 3);
                self.advance_to(close + 3);
            }
            None => {
                self.error_at(
                    ParseErrorKind::UnterminatedComment,
                    self.span(start, start + 4),
                );
                self.advance_to(self.source.len());
            }
        }
    }

    /// Parses an element, fragment or component.
    fn parse_element(&mut self) -> NodeId {
        let start = self.offset();
        self.advance(); // <
        let name = SmolStr::new(self.current_text());
        self.advance();

        let (attributes, trailing_whitespace) = self.parse_attributes();

        let self_closing = self.eat(TokenKind::SlashRAngle);
        if !self_closing && !self.eat(TokenKind::RAngle) {
            self.error(ParseErrorKind::UnexpectedToken {
                expected: TokenKind::RAngle.name().to_string(),
                found: self.current_kind().name().to_string(),
            });
        }

        let is_void = !self_closing && is_void_element(&name);
        let children = if self_closing || is_void {
            Vec::new()
        } else if is_raw_text_element(&name) {
            self.parse_raw_text(&name, start)
        } else {
            self.open_tags.push(name.clone());
            let children = self.parse_children(&name, start);
            self.open_tags.pop();
            children
        };

        if !self_closing && !is_void {
            self.parse_closing_tag(&name);
        }

        let span = self.span(start, self.prev_end());
        let close = if self_closing {
            TagClose::SelfClosing
        } else if is_void {
            TagClose::Void
        } else {
            TagClose::Normal
        };

        let component_name = name
            .strip_prefix(self.options.component_prefix.as_str())
            .filter(|rest| !rest.is_empty())
            .map(SmolStr::new);

        let kind = if name == self.options.fragment_tag {
            NodeKind::Fragment(Fragment {
                attributes,
                children,
                region: None,
            })
        } else if let Some(component_name) = component_name {
            NodeKind::Component(Component {
                name: component_name,
                tag: name,
                attributes,
                children,
            })
        } else {
            NodeKind::Element(Element {
                name,
                attributes,
                children,
                close,
                trailing_whitespace,
                dynamic_tag: None,
            })
        };
        self.alloc(kind, span)
    }

    /// Parses the body of `<script>`/`<style>`.
    fn parse_raw_text(&mut self, name: &str, start: usize) -> Vec<NodeId> {
        let mut children = Vec::new();
        let body_start = self.offset();
        let terminator = format!("</{name}");
        match self.scan_embedded(&mut children, body_start, &terminator, true) {
            Some(close) => self.advance_to(close),
            None => {
                self.error_at(
                    ParseErrorKind::UnclosedTag {
                        tag_name: name.to_string(),
                    },
                    self.span(start, start + 1 + name.len()),
                );
                self.advance_to(self.source.len());
            }
        }
        children
    }

    /// Parses children until the closing tag of `name`.
    fn parse_children(&mut self, name: &str, start: usize) -> Vec<NodeId> {
        let mut children = Vec::new();
        loop {
            match self.current_kind() {
                TokenKind::Eof => {
                    self.error_at(
                        ParseErrorKind::UnclosedTag {
                            tag_name: name.to_string(),
                        },
                        self.span(start, start + 1 + name.len()),
                    );
                    break;
                }
                TokenKind::LAngleSlash => {
                    let closing = self.peek_closing_name();
                    if closing.eq_ignore_ascii_case(name) {
                        break;
                    }
                    if self
                        .open_tags
                        .iter()
                        .any(|open| open.eq_ignore_ascii_case(&closing))
                    {
                        // closes an ancestor; this element was never closed
                        self.error(ParseErrorKind::MismatchedClosingTag {
                            expected: name.to_string(),
                            found: closing,
                        });
                        break;
                    }
                    self.error(ParseErrorKind::UnexpectedClosingTag { tag_name: closing });
                    self.skip_closing_tag();
                }
                _ => self.parse_node(&mut children),
            }
        }
        children
    }

    /// Returns the tag name of the closing tag at the current position.
    fn peek_closing_name(&self) -> String {
        match self.tokens.get(self.pos + 1) {
            Some(token) if token.kind == TokenKind::Ident => token.span.slice(self.source).to_string(),
            _ => String::new(),
        }
    }

    /// Consumes a closing tag without checking its name.
    fn skip_closing_tag(&mut self) {
        self.advance(); // </
        while matches!(
            self.current_kind(),
            TokenKind::Ident | TokenKind::Whitespace
        ) {
            self.advance();
        }
        self.eat(TokenKind::RAngle);
    }

    /// Consumes the closing tag of `name` if it is the current construct.
    fn parse_closing_tag(&mut self, name: &str) {
        if !self.check(TokenKind::LAngleSlash) || !self.peek_closing_name().eq_ignore_ascii_case(name)
        {
            return;
        }
        self.advance(); // </
        self.advance(); // name
        self.eat(TokenKind::Whitespace);
        if !self.eat(TokenKind::RAngle) {
            self.error(ParseErrorKind::UnexpectedToken {
                expected: TokenKind::RAngle.name().to_string(),
                found: self.current_kind().name().to_string(),
            });
        }
    }

    // === Attributes ===

    /// Parses attributes up to `>` or `/>`.
    ///
    /// Returns the attributes and the whitespace preceding the tag end.
    fn parse_attributes(&mut self) -> (Vec<Attribute>, SmolStr) {
        let mut attributes = Vec::new();
        loop {
            let whitespace = if self.check(TokenKind::Whitespace) {
                let ws = SmolStr::new(self.current_text());
                self.advance();
                ws
            } else {
                SmolStr::default()
            };

            match self.current_kind() {
                TokenKind::RAngle
                | TokenKind::SlashRAngle
                | TokenKind::Eof
                | TokenKind::LAngle
                | TokenKind::LAngleSlash
                | TokenKind::CommentOpen => return (attributes, whitespace),
                TokenKind::Ident => {
                    let attribute = self.parse_attribute(whitespace);
                    attributes.push(attribute);
                }
                TokenKind::OutputOpen | TokenKind::CodeOpen => {
                    let start = self.offset();
                    let end = self.source[start..]
                        .find("?>")
                        .map(|i| start + i + 2)
                        .unwrap_or(self.source.len());
                    self.error_at(
                        ParseErrorKind::InvalidAttribute {
                            message: "output tags are only allowed inside attribute values"
                                .to_string(),
                        },
                        self.span(start, end),
                    );
                    self.advance_to(end);
                }
                kind => {
                    self.error(ParseErrorKind::UnexpectedToken {
                        expected: "attribute name".to_string(),
                        found: kind.name().to_string(),
                    });
                    self.advance();
                }
            }
        }
    }

    /// Parses a single attribute.
    fn parse_attribute(&mut self, leading_whitespace: SmolStr) -> Attribute {
        let start = self.offset();
        let name = SmolStr::new(self.current_text());
        self.advance();

        let checkpoint = self.pos;
        self.eat(TokenKind::Whitespace);
        if !self.eat(TokenKind::Eq) {
            self.pos = checkpoint;
            return Attribute {
                name,
                value: AttributeValue::Boolean,
                quote: Quote::None,
                leading_whitespace,
                span: self.span(start, self.prev_end()),
            };
        }
        self.eat(TokenKind::Whitespace);

        let (value, quote) = match self.current_kind() {
            TokenKind::DoubleQuote => (self.parse_quoted_value('"', &name), Quote::Double),
            TokenKind::SingleQuote => (self.parse_quoted_value('\'', &name), Quote::Single),
            TokenKind::OutputOpen => match self.embedded_at(self.offset()) {
                Some((id, end)) => {
                    self.advance_to(end);
                    (AttributeValue::Output(id), Quote::None)
                }
                None => {
                    self.advance_to(self.source.len());
                    (AttributeValue::Static(String::new()), Quote::None)
                }
            },
            _ => (self.parse_unquoted_value(), Quote::None),
        };

        Attribute {
            name,
            value,
            quote,
            leading_whitespace,
            span: self.span(start, self.prev_end()),
        }
    }

    /// Parses an unquoted attribute value.
    fn parse_unquoted_value(&mut self) -> AttributeValue {
        let start = self.offset();
        while matches!(
            self.current_kind(),
            TokenKind::Ident
                | TokenKind::Text
                | TokenKind::Dash
                | TokenKind::Slash
                | TokenKind::Question
                | TokenKind::Eq
                | TokenKind::Error
        ) {
            self.advance();
        }
        let end = self.prev_end().max(start);
        if end == start {
            self.error(ParseErrorKind::UnexpectedToken {
                expected: "attribute value".to_string(),
                found: self.current_kind().name().to_string(),
            });
        }
        AttributeValue::Static(self.source[start..end].to_string())
    }

    /// Parses a quoted attribute value, splitting out `<?= … ?>` parts.
    ///
    /// Output tags are matched before the closing quote so expressions may
    /// contain the quote character.
    fn parse_quoted_value(&mut self, quote: char, name: &str) -> AttributeValue {
        let source: &'src str = self.source;
        let value_start = u32::from(self.current().span.end) as usize;
        let mut parts = Vec::new();
        let mut pos = value_start;

        let closed = loop {
            let rest = &source[pos..];
            let quote_at = rest.find(quote);
            let tag_at = rest.find("<?=");
            match (quote_at, tag_at) {
                (_, Some(tag)) if quote_at.map_or(true, |q| tag < q) => {
                    if tag > 0 {
                        parts.push(AttributePart::Text(rest[..tag].to_string()));
                    }
                    match self.embedded_at(pos + tag) {
                        Some((id, end)) => {
                            parts.push(AttributePart::Output(id));
                            pos = end;
                        }
                        None => break None,
                    }
                }
                (Some(q), _) => {
                    if q > 0 {
                        parts.push(AttributePart::Text(rest[..q].to_string()));
                    }
                    break Some(pos + q);
                }
                (None, _) => break None,
            }
        };

        match closed {
            Some(close) => self.advance_to(close + 1),
            None => {
                self.error_at(
                    ParseErrorKind::UnterminatedAttributeValue {
                        name: name.to_string(),
                    },
                    self.span(value_start.saturating_sub(1), value_start),
                );
                self.advance_to(source.len());
            }
        }

        if parts.is_empty() {
            return AttributeValue::Static(String::new());
        }
        if parts.len() == 1 {
            return match parts.remove(0) {
                AttributePart::Text(text) => AttributeValue::Static(text),
                AttributePart::Output(id) => AttributeValue::Output(id),
            };
        }
        AttributeValue::Parts(parts)
    }
}
