//! Parse error types.

use source_map::Span;
use thiserror::Error;

/// An error that occurred during parsing.
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct ParseError {
    /// The kind of error.
    pub kind: ParseErrorKind,
    /// The location in the source where the error occurred.
    pub span: Span,
}

impl ParseError {
    /// Creates a new parse error.
    pub fn new(kind: ParseErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The kind of parse error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    /// An unexpected token was encountered.
    #[error("unexpected token: expected {expected}, found {found}")]
    UnexpectedToken {
        /// What was expected.
        expected: String,
        /// What was found.
        found: String,
    },

    /// An element was never closed.
    #[error("unclosed tag: <{tag_name}>")]
    UnclosedTag {
        /// The name of the unclosed tag.
        tag_name: String,
    },

    /// A closing tag did not match the open element.
    #[error("mismatched closing tag: expected </{expected}>, found </{found}>")]
    MismatchedClosingTag {
        /// The expected tag name.
        expected: String,
        /// The found tag name.
        found: String,
    },

    /// A closing tag without a matching open element.
    #[error("unexpected closing tag: </{tag_name}>")]
    UnexpectedClosingTag {
        /// The tag name.
        tag_name: String,
    },

    /// `<?=` without `?>`.
    #[error("unterminated output tag: missing `?>`")]
    UnterminatedOutput,

    /// `<?php` without `?>`.
    #[error("unterminated code block: missing `?>`")]
    UnterminatedCode,

    /// `<!--` without `-->`.
    #[error("unterminated comment: missing `-->`")]
    UnterminatedComment,

    /// A quoted attribute value without its closing quote.
    #[error("unterminated value for attribute `{name}`")]
    UnterminatedAttributeValue {
        /// The attribute name.
        name: String,
    },

    /// An attribute that cannot be represented.
    #[error("invalid attribute: {message}")]
    InvalidAttribute {
        /// A description of the problem.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ParseError::new(
            ParseErrorKind::MismatchedClosingTag {
                expected: "div".to_string(),
                found: "span".to_string(),
            },
            Span::from_offsets(0, 7),
        );
        assert_eq!(
            error.to_string(),
            "mismatched closing tag: expected </div>, found </span>"
        );
    }
}
