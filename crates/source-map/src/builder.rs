//! Mapping from generated code back to template sources.

use crate::{ByteOffset, SourceFile, Span};
use std::sync::Arc;
use text_size::TextSize;

/// A single mapping from a generated range to a range in one template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    /// The span in the generated output.
    pub generated: Span,
    /// The span in the original template.
    pub original: Span,
    /// Index of the template in [`SourceMap::sources`].
    pub source: u32,
}

/// Maps generated offsets to the templates they were produced from.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    sources: Vec<Arc<SourceFile>>,
    /// Sorted by generated start.
    mappings: Vec<Mapping>,
}

impl SourceMap {
    /// Creates a source map builder.
    pub fn builder() -> SourceMapBuilder {
        SourceMapBuilder::new()
    }

    /// Returns the number of mappings.
    #[inline]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Returns true if this source map has no mappings.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Returns every template that contributed to the output.
    pub fn sources(&self) -> &[Arc<SourceFile>] {
        &self.sources
    }

    /// Returns an iterator over all mappings.
    pub fn mappings(&self) -> impl Iterator<Item = &Mapping> {
        self.mappings.iter()
    }

    /// Finds the template position for a generated offset.
    ///
    /// Offsets inside synthetic code resolve to the closest preceding mapped
    /// range, which is the template construct that produced it.
    pub fn original_position(&self, generated: ByteOffset) -> Option<(Arc<SourceFile>, Span)> {
        let idx = match self
            .mappings
            .binary_search_by(|m| m.generated.start.cmp(&generated))
        {
            Ok(idx) => idx,
            Err(0) => return None,
            Err(idx) => idx - 1,
        };
        let mapping = self.mappings.get(idx)?;
        let source = self.sources.get(mapping.source as usize)?;
        if mapping.generated.contains(generated) {
            let delta = u32::from(generated) - u32::from(mapping.generated.start);
            let within = std::cmp::min(delta, u32::from(mapping.original.len()));
            let offset = mapping.original.start + TextSize::from(within);
            Some((Arc::clone(source), Span::new(offset, mapping.original.end)))
        } else {
            Some((Arc::clone(source), mapping.original))
        }
    }
}

/// Builds a [`SourceMap`] while code is being generated.
#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    sources: Vec<Arc<SourceFile>>,
    mappings: Vec<Mapping>,
    generated_offset: ByteOffset,
}

impl SourceMapBuilder {
    /// Creates a new source map builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current generated offset.
    #[inline]
    pub fn generated_offset(&self) -> ByteOffset {
        self.generated_offset
    }

    fn source_index(&mut self, source: &Arc<SourceFile>) -> u32 {
        if let Some(idx) = self.sources.iter().position(|s| Arc::ptr_eq(s, source)) {
            return idx as u32;
        }
        self.sources.push(Arc::clone(source));
        (self.sources.len() - 1) as u32
    }

    /// Records generated text produced from `original` in `source`.
    pub fn add_mapped(&mut self, source: &Arc<SourceFile>, original: Span, generated_text: &str) {
        let len = TextSize::from(generated_text.len() as u32);
        let source = self.source_index(source);
        self.mappings.push(Mapping {
            generated: Span::new(self.generated_offset, self.generated_offset + len),
            original,
            source,
        });
        self.generated_offset += len;
    }

    /// Records generated text with no template counterpart.
    pub fn add_generated(&mut self, text: &str) {
        self.generated_offset += TextSize::from(text.len() as u32);
    }

    /// Builds the final source map.
    pub fn build(mut self) -> SourceMap {
        self.mappings.sort_by_key(|m| m.generated.start);
        SourceMap {
            sources: self.sources,
            mappings: self.mappings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn file(path: &str, text: &str) -> Arc<SourceFile> {
        Arc::new(SourceFile::new(path, text))
    }

    #[test]
    fn test_empty_source_map() {
        let map = SourceMap::builder().build();
        assert!(map.is_empty());
        assert!(map.original_position(TextSize::from(0)).is_none());
    }

    #[test]
    fn test_maps_across_sources() {
        let layout = file("layout.sugar.php", "<main><?= $title ?></main>");
        let page = file("page.sugar.php", "<p><?= $body ?></p>");

        let mut builder = SourceMapBuilder::new();
        builder.add_generated("<?php\n");
        builder.add_mapped(&layout, Span::from_offsets(10, 16), "echo Escaper::html($title);");
        builder.add_generated("\n");
        builder.add_mapped(&page, Span::from_offsets(7, 12), "echo Escaper::html($body);");
        let map = builder.build();

        assert_eq!(map.len(), 2);
        assert_eq!(map.sources().len(), 2);

        let (source, span) = map.original_position(TextSize::from(6)).unwrap();
        assert_eq!(source.path().as_str(), "layout.sugar.php");
        assert_eq!(span.start, TextSize::from(10));

        let (source, _) = map.original_position(TextSize::from(40)).unwrap();
        assert_eq!(source.path().as_str(), "page.sugar.php");
    }

    #[test]
    fn test_synthetic_code_resolves_to_preceding_mapping() {
        let page = file("page.sugar.php", "<?= $a ?>");
        let mut builder = SourceMapBuilder::new();
        builder.add_mapped(&page, Span::from_offsets(4, 6), "echo $a;");
        builder.add_generated("\n\n\n");
        let map = builder.build();

        let (_, span) = map.original_position(TextSize::from(9)).unwrap();
        assert_eq!(span, Span::from_offsets(4, 6));
    }

    #[test]
    fn test_same_source_registered_once() {
        let page = file("page.sugar.php", "<?= $a ?><?= $b ?>");
        let mut builder = SourceMapBuilder::new();
        builder.add_mapped(&page, Span::from_offsets(4, 6), "a");
        builder.add_mapped(&page, Span::from_offsets(13, 15), "b");
        assert_eq!(builder.build().sources().len(), 1);
    }
}
