//! Sugar lexer using logos.
//!
//! The token stream only drives tag structure. Text, output expressions,
//! code blocks and raw-text element bodies are read straight from the source
//! by the parser, which then skips the tokens they cover.

use logos::Logos;
use source_map::Span;
use text_size::TextSize;

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The kind of token.
    pub kind: TokenKind,
    /// The span of the token in the source.
    pub span: Span,
}

/// Token kinds for Sugar markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Logos, Default)]
pub enum TokenKind {
    /// `<?=`
    #[token("<?=")]
    OutputOpen,

    /// `<?php`
    #[token("<?php")]
    CodeOpen,

    /// `?>`
    #[token("?>")]
    CodeClose,

    /// `<!--`
    #[token("<!--")]
    CommentOpen,

    /// `-->`
    #[token("-->")]
    CommentClose,

    /// `</`
    #[token("</")]
    LAngleSlash,

    /// `<`
    #[token("<")]
    LAngle,

    /// `>`
    #[token(">")]
    RAngle,

    /// `/>`
    #[token("/>")]
    SlashRAngle,

    /// `=`
    #[token("=")]
    Eq,

    /// `"`
    #[token("\"")]
    DoubleQuote,

    /// `'`
    #[token("'")]
    SingleQuote,

    /// `/`
    #[token("/")]
    Slash,

    /// `?`
    #[token("?")]
    Question,

    /// `-`
    #[token("-")]
    Dash,

    /// A tag or attribute name (`div`, `s-button`, `s:if`, `data-id`).
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_:.@\-]*")]
    Ident,

    /// Whitespace, including newlines.
    #[regex(r"[ \t\r\n]+")]
    Whitespace,

    /// Any other run of text.
    #[regex(r#"[^<>="' \t\r\n/?a-zA-Z_\-]+"#)]
    Text,

    /// End of file
    Eof,

    /// Invalid/unknown token
    #[default]
    Error,
}

impl TokenKind {
    /// Returns a human-readable name for this token kind.
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::OutputOpen => "'<?='",
            TokenKind::CodeOpen => "'<?php'",
            TokenKind::CodeClose => "'?>'",
            TokenKind::CommentOpen => "'<!--'",
            TokenKind::CommentClose => "'-->'",
            TokenKind::LAngleSlash => "'</'",
            TokenKind::LAngle => "'<'",
            TokenKind::RAngle => "'>'",
            TokenKind::SlashRAngle => "'/>'",
            TokenKind::Eq => "'='",
            TokenKind::DoubleQuote => "'\"'",
            TokenKind::SingleQuote => "'''",
            TokenKind::Slash => "'/'",
            TokenKind::Question => "'?'",
            TokenKind::Dash => "'-'",
            TokenKind::Ident => "identifier",
            TokenKind::Whitespace => "whitespace",
            TokenKind::Text => "text",
            TokenKind::Eof => "end of file",
            TokenKind::Error => "invalid token",
        }
    }
}

/// A lexer for Sugar source code.
pub struct Lexer<'src> {
    inner: logos::Lexer<'src, TokenKind>,
    source: &'src str,
    finished: bool,
}

impl<'src> Lexer<'src> {
    /// Creates a new lexer for the given source.
    pub fn new(source: &'src str) -> Self {
        Self {
            inner: TokenKind::lexer(source),
            source,
            finished: false,
        }
    }

    /// Returns the source string being lexed.
    pub fn source(&self) -> &'src str {
        self.source
    }

    fn span(&self) -> Span {
        let range = self.inner.span();
        Span::from_offsets(range.start, range.end)
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.inner.next() {
            Some(Ok(kind)) => Some(Token {
                kind,
                span: self.span(),
            }),
            Some(Err(())) => Some(Token {
                kind: TokenKind::Error,
                span: self.span(),
            }),
            None => {
                self.finished = true;
                let end = TextSize::from(self.source.len() as u32);
                Some(Token {
                    kind: TokenKind::Eof,
                    span: Span::new(end, end),
                })
            }
        }
    }
}
