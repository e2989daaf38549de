//! Command tag allocation.

/// Allocates monotonically increasing command tags (`TAG1`, `TAG2`, ...).
///
/// Tags are never reused within a connection.
#[derive(Debug, Default)]
pub struct TagSequence {
    counter: u64,
}

impl TagSequence {
    /// Creates a new sequence starting at `TAG1`.
    #[must_use]
    pub const fn new() -> Self {
        Self { counter: 0 }
    }

    /// Allocates and returns the next tag.
    pub fn next_tag(&mut self) -> String {
        self.counter += 1;
        format!("TAG{}", self.counter)
    }

    /// Returns the most recently allocated tag.
    #[must_use]
    pub fn current(&self) -> String {
        format!("TAG{}", self.counter)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_sequential() {
        let mut tags = TagSequence::new();
        assert_eq!(tags.next_tag(), "TAG1");
        assert_eq!(tags.next_tag(), "TAG2");
        assert_eq!(tags.next_tag(), "TAG3");
    }

    #[test]
    fn current_tracks_last_allocation() {
        let mut tags = TagSequence::new();
        tags.next_tag();
        tags.next_tag();
        assert_eq!(tags.current(), "TAG2");
    }

    #[test]
    fn tags_are_never_reused() {
        let mut tags = TagSequence::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(tags.next_tag()));
        }
    }
}
