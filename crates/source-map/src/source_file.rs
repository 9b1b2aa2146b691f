//! Template source files.

use crate::{LineCol, LineIndex, Span};
use camino::{Utf8Path, Utf8PathBuf};

/// A loaded template: its logical path, text and line index.
///
/// AST nodes hold an `Arc<SourceFile>` so error locations stay correct after
/// a node has been inlined into another template.
#[derive(Debug, Clone)]
pub struct SourceFile {
    path: Utf8PathBuf,
    text: String,
    line_index: LineIndex,
}

impl SourceFile {
    /// Creates a source file from its path and contents.
    pub fn new(path: impl Into<Utf8PathBuf>, text: impl Into<String>) -> Self {
        let text = text.into();
        let line_index = LineIndex::new(&text);
        Self {
            path: path.into(),
            text,
            line_index,
        }
    }

    /// Returns the template path.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the template text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the source slice covered by `span`.
    pub fn slice(&self, span: Span) -> &str {
        span.slice(&self.text)
    }

    /// Returns the 1-based position of the start of `span`.
    pub fn position(&self, span: Span) -> LineCol {
        self.line_index
            .line_col(span.start, &self.text)
            .unwrap_or_else(|| LineCol::new(1, 1))
    }

    /// Returns the source line containing the start of `span`.
    pub fn snippet(&self, span: Span) -> String {
        let LineCol { line, .. } = self.position(span);
        self.line_index
            .line_text(line, &self.text)
            .unwrap_or_default()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_position_and_snippet() {
        let file = SourceFile::new(
            "pages/home.sugar.php",
            "<main>\n  <div s:if=\"$a\" s:foreach=\"$b\"></div>\n</main>",
        );
        let offset = file.text().find("s:foreach").unwrap();
        let span = Span::from_offsets(offset, offset + 9);
        assert_eq!(file.position(span), LineCol::new(2, 18));
        assert_eq!(
            file.snippet(span),
            "  <div s:if=\"$a\" s:foreach=\"$b\"></div>"
        );
        assert_eq!(file.slice(span), "s:foreach");
        assert_eq!(file.path().as_str(), "pages/home.sugar.php");
    }
}
