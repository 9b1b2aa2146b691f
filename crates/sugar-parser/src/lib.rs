//! Sugar template parser.
//!
//! This crate turns Sugar markup into an arena [`Ast`]:
//! - Lexer (tokenizer) using `logos`
//! - Recursive descent parser with error recovery
//! - Element, fragment and component classification
//! - Output tags with pipe (`|>`) rewriting and `raw()` detection
//!
//! Directive attributes (`s:if`, `s:foreach`, …) are kept as plain attributes
//! here; the compiler extracts them.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sugar_parser::{parse, SourceFile};
//!
//! let file = Arc::new(SourceFile::new(
//!     "pages/home.sugar.php",
//!     r#"<ul><li s:foreach="$items as $item"><?= $item ?></li></ul>"#,
//! ));
//!
//! let result = parse(file);
//! assert!(result.errors.is_empty());
//! ```

mod ast;
mod error;
pub mod expression;
mod lexer;
mod parser;

pub use ast::*;
pub use error::{ParseError, ParseErrorKind};
pub use lexer::{Lexer, Token, TokenKind};
pub use source_map::{SourceFile, Span};

use smol_str::SmolStr;
use std::sync::Arc;

/// Options for parsing Sugar templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Tag of the non-rendering wrapper element.
    pub fragment_tag: SmolStr,
    /// Tag prefix that marks a component invocation.
    pub component_prefix: SmolStr,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            fragment_tag: SmolStr::new_static("s-template"),
            component_prefix: SmolStr::new_static("s-"),
        }
    }
}

/// The result of parsing a template.
#[derive(Debug)]
pub struct ParseResult {
    /// The parsed tree.
    pub ast: Ast,
    /// Any errors encountered during parsing.
    pub errors: Vec<ParseError>,
}

/// Parses a template into an AST.
///
/// The parser recovers from errors where possible, returning both the tree
/// and any errors encountered.
pub fn parse(file: Arc<SourceFile>) -> ParseResult {
    parse_with_options(file, &ParseOptions::default())
}

/// Parses a template with custom options.
pub fn parse_with_options(file: Arc<SourceFile>, options: &ParseOptions) -> ParseResult {
    parser::Parser::new(&file, options).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(text: &str) -> Arc<SourceFile> {
        Arc::new(SourceFile::new("test.sugar.php", text))
    }

    #[test]
    fn test_parse_empty() {
        let result = parse(source(""));
        assert!(result.errors.is_empty());
        assert!(result.ast.children(result.ast.root()).is_empty());
    }

    #[test]
    fn test_nodes_remember_their_template() {
        let result = parse(source("<p><?= $a ?></p>"));
        let root = result.ast.root();
        for id in result.ast.descendants(root) {
            assert_eq!(result.ast.node(id).source.path().as_str(), "test.sugar.php");
        }
    }
}
