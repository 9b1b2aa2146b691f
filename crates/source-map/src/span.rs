//! Byte spans inside a template source.

use std::ops::Range;
use text_size::{TextRange, TextSize};

/// A byte offset into a source string.
pub type ByteOffset = TextSize;

/// A half-open byte range `[start, end)` inside one template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    /// The start byte offset (inclusive).
    pub start: ByteOffset,
    /// The end byte offset (exclusive).
    pub end: ByteOffset,
}

impl Span {
    /// Creates a new span from start and end byte offsets.
    #[inline]
    pub fn new(start: impl Into<ByteOffset>, end: impl Into<ByteOffset>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Creates a span from `usize` offsets as produced by string searches.
    #[inline]
    pub fn from_offsets(start: usize, end: usize) -> Self {
        Self::new(TextSize::from(start as u32), TextSize::from(end as u32))
    }

    /// Creates an empty span at the given offset.
    #[inline]
    pub fn empty(offset: impl Into<ByteOffset>) -> Self {
        let offset = offset.into();
        Self {
            start: offset,
            end: offset,
        }
    }

    /// Returns the length of this span in bytes.
    #[inline]
    pub fn len(&self) -> TextSize {
        self.end - self.start
    }

    /// Returns true if this span is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns true if this span contains the given offset.
    #[inline]
    pub fn contains(&self, offset: ByteOffset) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Returns a span covering both this span and another.
    #[inline]
    pub fn cover(self, other: Span) -> Span {
        Span {
            start: std::cmp::min(self.start, other.start),
            end: std::cmp::max(self.end, other.end),
        }
    }

    /// Returns the span as a `usize` range for slicing.
    #[inline]
    pub fn as_range(&self) -> Range<usize> {
        u32::from(self.start) as usize..u32::from(self.end) as usize
    }

    /// Slices `text` with this span, returning `""` when out of bounds.
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        text.get(self.as_range()).unwrap_or("")
    }
}

impl From<TextRange> for Span {
    fn from(range: TextRange) -> Self {
        Self {
            start: range.start(),
            end: range.end(),
        }
    }
}

impl From<Span> for TextRange {
    fn from(span: Span) -> Self {
        TextRange::new(span.start, span.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_offsets() {
        let span = Span::from_offsets(3, 7);
        assert_eq!(span.start, TextSize::from(3));
        assert_eq!(span.len(), TextSize::from(4));
        assert_eq!(span.as_range(), 3..7);
    }

    #[test]
    fn test_span_contains() {
        let span = Span::from_offsets(5, 15);
        assert!(!span.contains(TextSize::from(4)));
        assert!(span.contains(TextSize::from(5)));
        assert!(!span.contains(TextSize::from(15)));
    }

    #[test]
    fn test_slice() {
        let text = "<div s:if=\"$a\">";
        assert_eq!(Span::from_offsets(1, 4).slice(text), "div");
        assert_eq!(Span::from_offsets(10, 99).slice(text), "");
    }

    #[test]
    fn test_cover() {
        let covered = Span::from_offsets(5, 10).cover(Span::from_offsets(8, 20));
        assert_eq!(covered, Span::from_offsets(5, 20));
        assert!(Span::empty(TextSize::from(2)).is_empty());
    }
}
