//! Bounded linear undo/redo log.
//!
//! Entries are whole snapshots. Pushing truncates anything after the cursor
//! (the redo branch) and drops the oldest entry once the limit is reached.
//! Undo and redo only move the cursor; entries are never edited in place.

/// Snapshots kept by default.
pub const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct History<T> {
    entries: Vec<T>,
    cursor: usize,
    limit: usize,
}

impl<T: Clone> History<T> {
    /// A history holding just `initial`.
    pub fn new(initial: T) -> Self {
        Self::with_limit(initial, HISTORY_LIMIT)
    }

    pub fn with_limit(initial: T, limit: usize) -> Self {
        Self {
            entries: vec![initial],
            cursor: 0,
            limit: limit.max(1),
        }
    }

    /// The snapshot at the cursor.
    pub fn current(&self) -> &T {
        &self.entries[self.cursor]
    }

    /// Record a new snapshot after the cursor.
    pub fn push(&mut self, snapshot: T) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push(snapshot);
        if self.entries.len() > self.limit {
            let overflow = self.entries.len() - self.limit;
            self.entries.drain(..overflow);
        }
        self.cursor = self.entries.len() - 1;
    }

    /// Step back, returning the snapshot now current.
    pub fn undo(&mut self) -> Option<&T> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        Some(self.current())
    }

    /// Step forward, returning the snapshot now current.
    pub fn redo(&mut self) -> Option<&T> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        Some(self.current())
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Forget everything except `initial`.
    pub fn reset(&mut self, initial: T) {
        self.entries.clear();
        self.entries.push(initial);
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undo_redo_walk_the_log() {
        let mut h = History::new(0);
        h.push(1);
        h.push(2);
        assert_eq!(h.undo(), Some(&1));
        assert_eq!(h.undo(), Some(&0));
        assert_eq!(h.undo(), None);
        assert_eq!(h.redo(), Some(&1));
        assert!(h.can_redo());
    }

    #[test]
    fn push_truncates_redo_branch() {
        let mut h = History::new("a");
        h.push("b");
        h.push("c");
        h.undo();
        h.push("d");
        assert!(!h.can_redo());
        assert_eq!(h.len(), 3);
        assert_eq!(h.undo(), Some(&"b"));
    }

    #[test]
    fn oldest_entries_fall_off() {
        let mut h = History::new(0);
        for i in 1..=60 {
            h.push(i);
        }
        assert_eq!(h.len(), HISTORY_LIMIT);
        assert_eq!(*h.current(), 60);
        while h.undo().is_some() {}
        assert_eq!(*h.current(), 11);
    }

    #[test]
    fn reset_clears() {
        let mut h = History::new(1);
        h.push(2);
        h.reset(7);
        assert_eq!((h.len(), *h.current(), h.can_undo()), (1, 7, false));
    }
}
