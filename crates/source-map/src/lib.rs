//! Source position tracking for the Sugar template compiler.
//!
//! Templates are inlined into each other (layouts, partials, components), so a
//! single compiled output can mix code from many files. This crate keeps track
//! of where every piece came from:
//!
//! - [`Span`] is a byte range inside one template.
//! - [`SourceFile`] owns a template's path and text and resolves spans to
//!   1-based line/column positions and snippets.
//! - [`SourceMap`] maps offsets in generated code back to `(template, span)`.

mod builder;
mod line_index;
mod source_file;
mod span;

pub use builder::{Mapping, SourceMap, SourceMapBuilder};
pub use line_index::{LineCol, LineIndex};
pub use source_file::SourceFile;
pub use span::{ByteOffset, Span};
