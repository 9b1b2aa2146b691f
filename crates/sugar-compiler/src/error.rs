//! The compile error type shared by every pass.

use camino::{Utf8Path, Utf8PathBuf};
use source_map::{SourceFile, Span};
use std::fmt;
use sugar_parser::{Node, ParseError};
use thiserror::Error;

/// Where an error happened, in template coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// The template path.
    pub template: Utf8PathBuf,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
    /// The source line.
    pub snippet: String,
    /// The span inside the template.
    pub span: Span,
}

impl Location {
    /// Resolves a span inside `file`.
    pub fn new(file: &SourceFile, span: Span) -> Self {
        let position = file.position(span);
        Self {
            template: file.path().to_path_buf(),
            line: position.line,
            column: position.col,
            snippet: file.snippet(span),
            span,
        }
    }
}

fn hint(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(". Did you mean \"{s}\"?"),
        None => String::new(),
    }
}

/// The kind of compile error.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Malformed template or directive usage.
    #[error("{message}")]
    Syntax {
        /// What went wrong.
        message: String,
    },

    /// `<s-name>` does not match any discovered component.
    #[error("Component \"{name}\" not found{}", hint(.suggestion))]
    ComponentNotFound {
        /// The component name.
        name: String,
        /// The closest known component.
        suggestion: Option<String>,
    },

    /// A referenced template does not exist.
    #[error("Template \"{path}\" not found{}", hint(.suggestion))]
    TemplateNotFound {
        /// The path as written.
        path: String,
        /// The closest known template.
        suggestion: Option<String>,
    },

    /// A directive name not present in the registry.
    #[error("Unknown directive \"{name}\"{}", hint(.suggestion))]
    UnknownDirective {
        /// The directive attribute as written.
        name: String,
        /// The closest registered directive.
        suggestion: Option<String>,
    },

    /// A template transitively extends itself.
    #[error("Circular inheritance detected: {}", .chain.join(" -> "))]
    CircularInheritance {
        /// The extends chain, ending with the repeated template.
        chain: Vec<String>,
    },

    /// The generated code failed to parse downstream.
    #[error("Compiled template failed to parse: {message}")]
    CompiledOutputParse {
        /// The downstream error message.
        message: String,
    },

    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file involved.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// A fatal compile error with an optional template location.
#[derive(Debug, Error)]
pub struct CompileError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Where it happened.
    pub location: Option<Location>,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(location) = &self.location {
            write!(
                f,
                " (template: {} line:{} column:{})",
                location.template, location.line, location.column
            )?;
        }
        Ok(())
    }
}

impl CompileError {
    /// Creates an error without a location.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            location: None,
        }
    }

    /// Creates a syntax error.
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax {
            message: message.into(),
        })
    }

    /// Creates an I/O error for `path`.
    pub fn io(path: impl AsRef<Utf8Path>, source: std::io::Error) -> Self {
        Self::new(ErrorKind::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })
    }

    /// Converts a parse error of `file`.
    pub fn from_parse(file: &SourceFile, error: &ParseError) -> Self {
        Self::syntax(error.to_string()).with_location(Location::new(file, error.span))
    }

    /// Sets the location.
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Locates the error at `node` unless it already has a location.
    pub fn at(self, node: &Node) -> Self {
        if self.location.is_some() {
            return self;
        }
        let location = Location::new(&node.source, node.span);
        self.with_location(location)
    }

    /// Returns the message without the location suffix.
    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}
