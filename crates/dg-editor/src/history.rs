//! Bounded undo/redo history of Data snapshots.
//!
//! The stacks hold `Snapshot`s — the persisted projection of the whole
//! tree — so undo/redo never resurrects transient UI flags. One drag
//! gesture is one entry: the session captures the snapshot before a
//! mutating gesture and pushes it when the gesture completes.

use dg_core::data::Snapshot;
use std::collections::VecDeque;

/// Default depth bound: history never grows past this many entries.
pub const HISTORY_LIMIT: usize = 20;

/// Undo/redo stacks with ring-buffer eviction on the undo side.
#[derive(Debug, Default)]
pub struct History {
    undo: VecDeque<Snapshot>,
    redo: Vec<Snapshot>,
    limit: usize,
}

impl History {
    pub fn new() -> Self {
        Self::with_limit(HISTORY_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            undo: VecDeque::with_capacity(limit),
            redo: Vec::new(),
            limit,
        }
    }

    /// Record the pre-mutation snapshot. Evicts the oldest entry past
    /// the depth bound and invalidates the redo stack.
    pub fn push(&mut self, snapshot: Snapshot) {
        self.undo.push_back(snapshot);
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
        self.redo.clear();
    }

    /// Step back: returns the snapshot to restore, moving `current`
    /// onto the redo stack. `None` when there is nothing to undo.
    pub fn undo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let restored = self.undo.pop_back()?;
        self.redo.push(current);
        Some(restored)
    }

    /// Step forward again: inverse of `undo`. `None` when the redo
    /// stack is empty (it is cleared by any new `push`).
    pub fn redo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let restored = self.redo.pop()?;
        self.undo.push_back(current);
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
        Some(restored)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.undo.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dg_core::data::Snapshot;
    use dg_core::model::{Diagram, DiagramGraph, DiagramKind, Frame};

    fn snapshot_with_rect(x: f32) -> Snapshot {
        let mut doc = DiagramGraph::new();
        doc.add(
            None,
            Diagram::with_id(
                dg_core::DiagramId::intern("marker"),
                DiagramKind::Rectangle { corner_radius: 0.0 },
            )
            .with_frame(Frame::new(x, 0.0, 10.0, 10.0)),
        );
        Snapshot::from_graph(&doc)
    }

    fn empty() -> Snapshot {
        Snapshot { roots: Vec::new() }
    }

    #[test]
    fn undo_returns_pushed_snapshot() {
        let mut history = History::new();
        let before = snapshot_with_rect(1.0);
        history.push(before.clone());

        let restored = history.undo(snapshot_with_rect(2.0)).unwrap();
        assert_eq!(restored, before);
        assert!(history.can_redo());
    }

    #[test]
    fn underflow_is_a_noop() {
        let mut history = History::new();
        assert!(history.undo(empty()).is_none());
        assert!(history.redo(empty()).is_none());
    }

    #[test]
    fn push_clears_redo() {
        let mut history = History::new();
        history.push(snapshot_with_rect(1.0));
        history.undo(snapshot_with_rect(2.0)).unwrap();
        assert!(history.can_redo());

        history.push(snapshot_with_rect(3.0));
        assert!(!history.can_redo());
    }

    #[test]
    fn depth_bound_evicts_oldest() {
        let mut history = History::new();
        for i in 0..(HISTORY_LIMIT + 5) {
            history.push(snapshot_with_rect(i as f32));
        }
        assert_eq!(history.depth(), HISTORY_LIMIT);

        // The oldest surviving entry is the sixth pushed.
        let mut last = None;
        while let Some(s) = history.undo(empty()) {
            last = Some(s);
        }
        assert_eq!(last, Some(snapshot_with_rect(5.0)));
    }

    #[test]
    fn undo_then_redo_restores_current() {
        let mut history = History::new();
        history.push(snapshot_with_rect(1.0));

        let current = snapshot_with_rect(2.0);
        let undone = history.undo(current.clone()).unwrap();
        let redone = history.redo(undone).unwrap();
        assert_eq!(redone, current);
    }
}
