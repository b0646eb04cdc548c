use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open source range `[begin, end)` over char offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub begin: usize,
    pub end: usize,
}

impl Range {
    /// Virtual range of globally visible symbols.
    pub const GLOBAL: Range = Range {
        begin: 0,
        end: usize::MAX,
    };

    pub fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    /// Visible from `inner`'s site to the end of the enclosing `outer` block.
    pub fn range_of(inner: Range, outer: Range) -> Self {
        Self {
            begin: inner.begin,
            end: outer.end,
        }
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.begin <= pos && pos < self.end
    }

    pub fn contains_range(&self, other: &Range) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }

    pub fn intersects(&self, other: &Range) -> bool {
        self.begin < other.end && other.begin < self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.begin)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.begin, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_is_half_open() {
        let r = Range::new(2, 5);
        assert!(!r.contains(1));
        assert!(r.contains(2));
        assert!(r.contains(4));
        assert!(!r.contains(5));
    }

    #[test]
    fn test_range_of_spans_to_block_end() {
        let decl = Range::new(10, 13);
        let block = Range::new(0, 40);
        let scope = Range::range_of(decl, block);
        assert_eq!(scope, Range::new(10, 40));
        assert!(block.contains_range(&scope));
    }

    #[test]
    fn test_contains_range_and_intersects() {
        let outer = Range::new(0, 10);
        let inner = Range::new(3, 7);
        assert!(outer.contains_range(&inner));
        assert!(!inner.contains_range(&outer));
        assert!(outer.intersects(&inner));
        assert!(!Range::new(0, 3).intersects(&Range::new(3, 6)));
    }

    #[test]
    fn test_global_range_contains_everything() {
        assert!(Range::GLOBAL.contains(0));
        assert!(Range::GLOBAL.contains(1 << 40));
    }
}
