//! Line index for offset → line/column conversion.

use crate::ByteOffset;
use text_size::TextSize;

/// A 1-based line and column position, as shown in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineCol {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column, counted in characters.
    pub col: u32,
}

impl LineCol {
    /// Creates a new line/column position.
    #[inline]
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

/// Start offsets of every line, for O(log n) position lookups.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<ByteOffset>,
}

impl LineIndex {
    /// Builds the index for `text`.
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![TextSize::from(0)];
        line_starts.extend(
            text.match_indices('\n')
                .map(|(offset, _)| TextSize::from((offset + 1) as u32)),
        );
        Self { line_starts }
    }

    /// Returns the number of lines in the source.
    #[inline]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Returns the 0-based line containing `offset`.
    fn line_of(&self, offset: ByteOffset) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        }
    }

    /// Converts a byte offset into a 1-based position.
    ///
    /// Columns count characters so multi-byte text reports what an editor
    /// shows. Returns `None` when `offset` lies past the end of `text`.
    pub fn line_col(&self, offset: ByteOffset, text: &str) -> Option<LineCol> {
        let offset_usize = u32::from(offset) as usize;
        if offset_usize > text.len() {
            return None;
        }
        let line = self.line_of(offset);
        let line_start = u32::from(self.line_starts[line]) as usize;
        let col = text.get(line_start..offset_usize)?.chars().count();
        Some(LineCol::new(line as u32 + 1, col as u32 + 1))
    }

    /// Returns the text of a 1-based line, without its newline.
    pub fn line_text<'a>(&self, line: u32, text: &'a str) -> Option<&'a str> {
        let idx = (line as usize).checked_sub(1)?;
        let start = u32::from(*self.line_starts.get(idx)?) as usize;
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|next| u32::from(*next) as usize - 1)
            .unwrap_or(text.len());
        text.get(start..end).map(|l| l.trim_end_matches('\r'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line() {
        let text = "hello world";
        let index = LineIndex::new(text);
        assert_eq!(index.line_count(), 1);
        assert_eq!(
            index.line_col(TextSize::from(0), text),
            Some(LineCol::new(1, 1))
        );
        assert_eq!(
            index.line_col(TextSize::from(5), text),
            Some(LineCol::new(1, 6))
        );
    }

    #[test]
    fn test_multiple_lines() {
        let text = "<div>\n  <p s:if=\"$x\">\n</div>";
        let index = LineIndex::new(text);
        assert_eq!(index.line_count(), 3);
        assert_eq!(
            index.line_col(TextSize::from(8), text),
            Some(LineCol::new(2, 3))
        );
        assert_eq!(index.line_text(2, text), Some("  <p s:if=\"$x\">"));
        assert_eq!(index.line_text(3, text), Some("</div>"));
        assert_eq!(index.line_text(4, text), None);
    }

    #[test]
    fn test_columns_count_characters() {
        let text = "é<?= $x ?>";
        let index = LineIndex::new(text);
        // 'é' is two bytes but one column
        assert_eq!(
            index.line_col(TextSize::from(2), text),
            Some(LineCol::new(1, 2))
        );
    }

    #[test]
    fn test_out_of_bounds() {
        let text = "abc";
        let index = LineIndex::new(text);
        assert_eq!(index.line_col(TextSize::from(10), text), None);
    }
}
