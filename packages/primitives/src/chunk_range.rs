//! Contiguous chunk index ranges within a xorb.

use serde::{Deserialize, Serialize};

/// A half-open range of chunk indices `[start, end)` within a xorb.
///
/// Reconstruction terms, fetch-info entries and peer chunk requests all
/// describe the chunks they cover with this type. Ranges from different
/// sources are compared and rebased against each other: a term is served
/// by any covering range, with the term's indices shifted by the cover's
/// start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkRange {
    pub start: u32,
    pub end: u32,
}

impl ChunkRange {
    #[must_use]
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Number of chunks in the range.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether this range covers every chunk of `other`.
    #[must_use]
    pub fn is_superset_of(&self, other: &ChunkRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Rebases `inner` into indices local to this covering range.
    ///
    /// Returns `None` unless `self` is a superset of `inner`. The result
    /// indexes into the bytes of a xorb sub-range that starts at
    /// `self.start`.
    #[must_use]
    pub fn rebase(&self, inner: &ChunkRange) -> Option<ChunkRange> {
        if !self.is_superset_of(inner) {
            return None;
        }
        Some(ChunkRange::new(inner.start - self.start, inner.end - self.start))
    }
}

impl std::fmt::Display for ChunkRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::ChunkRange;

    #[test]
    fn length_and_emptiness() {
        assert_eq!(ChunkRange::new(2, 5).len(), 3);
        assert!(!ChunkRange::new(2, 5).is_empty());
        assert!(ChunkRange::new(5, 5).is_empty());
    }

    #[test]
    fn superset_includes_equal_ranges_and_excludes_partial_overlap() {
        let cover = ChunkRange::new(0, 10);

        assert!(cover.is_superset_of(&ChunkRange::new(0, 10)));
        assert!(cover.is_superset_of(&ChunkRange::new(3, 7)));
        assert!(!cover.is_superset_of(&ChunkRange::new(8, 12)));
        assert!(!ChunkRange::new(3, 7).is_superset_of(&cover));
    }

    #[test]
    fn rebase_shifts_indices_into_the_cover() {
        let cover = ChunkRange::new(4, 12);

        assert_eq!(
            cover.rebase(&ChunkRange::new(6, 9)),
            Some(ChunkRange::new(2, 5))
        );
        assert_eq!(cover.rebase(&ChunkRange::new(0, 3)), None);
    }
}
