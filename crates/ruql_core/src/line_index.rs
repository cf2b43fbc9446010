//! Byte offset to line/column conversion.

use crate::span::Location;

/// Start offsets of every line in a source string.
///
/// Columns are counted in characters, not bytes, so multi-byte text before a
/// token does not skew the reported position.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<u32>,
}

impl<'a> LineIndex<'a> {
    /// Builds the index for a source string.
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(memchr::memchr_iter(b'\n', source.as_bytes()).map(|i| i as u32 + 1));
        Self {
            source,
            line_starts,
        }
    }

    /// Returns the number of lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Converts a byte offset into a 1-based location.
    #[must_use]
    pub fn location(&self, offset: u32) -> Location {
        let offset = offset.min(self.source.len() as u32);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line] as usize;
        let column = self
            .source
            .get(line_start..offset as usize)
            .map_or(offset as usize - line_start, |prefix| prefix.chars().count());
        Location::new(line + 1, column + 1)
    }
}
