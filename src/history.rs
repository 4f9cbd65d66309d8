//! Undo/redo history for the annotations of the open item.
//!
//! The history is a linear list of full snapshots with a cursor pointing at
//! the snapshot that matches the live state. Recording after an undo discards
//! everything past the cursor, so there is never a redo branch to choose from.

use crate::constants::HISTORY_LIMIT;

/// Bounded snapshot history for any cloneable state.
///
/// # Example
/// ```
/// use torch_markup::HistoryStack;
///
/// let mut history: HistoryStack<Vec<u32>> = HistoryStack::new(50);
/// history.record(&vec![]);
/// history.record(&vec![1]);
///
/// assert_eq!(history.undo(), Some(vec![]));
/// assert_eq!(history.redo(), Some(vec![1]));
/// ```
#[derive(Debug, Clone)]
pub struct HistoryStack<T: Clone> {
    /// Snapshots, oldest first
    snapshots: Vec<T>,
    /// Index of the snapshot matching the live state
    cursor: Option<usize>,
    /// Maximum number of snapshots kept
    max_history: usize,
}

impl<T: Clone> Default for HistoryStack<T> {
    fn default() -> Self {
        Self::new(HISTORY_LIMIT)
    }
}

impl<T: Clone> HistoryStack<T> {
    /// Create an empty history holding at most `max_history` snapshots.
    ///
    /// A limit of zero is raised to one so the current state is always kept.
    pub fn new(max_history: usize) -> Self {
        Self {
            snapshots: Vec::new(),
            cursor: None,
            max_history: max_history.max(1),
        }
    }

    /// Record a copy of `state` as the newest snapshot.
    ///
    /// Any redo branch is dropped first. When the stack is full the oldest
    /// snapshot is evicted before the cursor moves to the new entry.
    pub fn record(&mut self, state: &T) {
        let keep = self.cursor.map_or(0, |c| c + 1);
        if keep < self.snapshots.len() {
            log::debug!(
                "History: dropping {} redo snapshot(s)",
                self.snapshots.len() - keep
            );
            self.snapshots.truncate(keep);
        }

        while self.snapshots.len() >= self.max_history {
            self.snapshots.remove(0);
        }

        self.snapshots.push(state.clone());
        self.cursor = Some(self.snapshots.len() - 1);
        log::debug!(
            "History: recorded snapshot {}/{}",
            self.snapshots.len(),
            self.max_history
        );
    }

    /// Step back one snapshot and return a copy of it.
    ///
    /// Returns `None` at the oldest snapshot or when the history is empty.
    pub fn undo(&mut self) -> Option<T> {
        let cursor = self.cursor.filter(|&c| c > 0)? - 1;
        self.cursor = Some(cursor);
        log::debug!("History: undo to {}", cursor);
        Some(self.snapshots[cursor].clone())
    }

    /// Step forward one snapshot and return a copy of it.
    ///
    /// Returns `None` at the newest snapshot or when the history is empty.
    pub fn redo(&mut self) -> Option<T> {
        let cursor = self.cursor.filter(|&c| c + 1 < self.snapshots.len())? + 1;
        self.cursor = Some(cursor);
        log::debug!("History: redo to {}", cursor);
        Some(self.snapshots[cursor].clone())
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.cursor.is_some_and(|c| c + 1 < self.snapshots.len())
    }

    /// Position of the live snapshot; `None` exactly when the history is empty.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// The snapshot under the cursor.
    pub fn current(&self) -> Option<&T> {
        self.cursor.map(|c| &self.snapshots[c])
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Clear all history.
    pub fn reset(&mut self) {
        self.snapshots.clear();
        self.cursor = None;
    }
}
