//! Undo/redo over a single text line: a bounded stack of snapshots, with
//! consecutive inserts coalesced into one undo step.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

pub const UNDO_HISTORY_MAX: usize = 200;

#[derive(Clone, Debug)]
struct Snapshot {
    text: String,
    cursor: usize,
    hash: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InsertRun {
    Inactive,
    Active,
}

/// Bounded undo/redo stack with insert-run coalescing: a span of
/// consecutive `insert` calls between `begin_undo_group`/`end_undo_group`
/// shares a single snapshot rather than one per character.
pub struct UndoEngine {
    undo_stack: Vec<Snapshot>,
    redo_stack: Vec<Snapshot>,
    insert_run: InsertRun,
    snapshots_skipped: AtomicU64,
}

impl Default for UndoEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoEngine {
    pub fn new() -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            insert_run: InsertRun::Inactive,
            snapshots_skipped: AtomicU64::new(0),
        }
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn snapshots_skipped(&self) -> u64 {
        self.snapshots_skipped.load(Ordering::Relaxed)
    }

    fn push_snapshot(&mut self, text: &str, cursor: usize) {
        let hash = text_hash(text);
        if let Some(last) = self.undo_stack.last()
            && last.hash == hash
        {
            self.snapshots_skipped.fetch_add(1, Ordering::Relaxed);
            trace!(target: "buffer.undo", hash, "snapshot_dedupe_skip");
            return;
        }
        self.undo_stack.push(Snapshot {
            text: text.to_string(),
            cursor,
            hash,
        });
        if self.undo_stack.len() > UNDO_HISTORY_MAX {
            self.undo_stack.remove(0);
            trace!(target: "buffer.undo", "undo_stack_trimmed");
        }
        self.redo_stack.clear();
    }

    /// Begin a coalesced group: the first call in a run pushes a snapshot
    /// of the pre-edit state; subsequent calls while still `Active` are
    /// no-ops until `end_undo_group`.
    pub fn begin_undo_group(&mut self, text: &str, cursor: usize) {
        if self.insert_run == InsertRun::Inactive {
            self.push_snapshot(text, cursor);
            self.insert_run = InsertRun::Active;
        }
    }

    pub fn end_undo_group(&mut self) {
        self.insert_run = InsertRun::Inactive;
    }

    /// Push a standalone snapshot regardless of any open group (used for
    /// discrete edits like `remove` that aren't coalesced).
    pub fn push_discrete(&mut self, text: &str, cursor: usize) {
        self.push_snapshot(text, cursor);
    }

    pub fn undo(&mut self, text: &mut String, cursor: &mut usize) -> bool {
        let Some(last) = self.undo_stack.pop() else {
            return false;
        };
        self.redo_stack.push(Snapshot {
            text: text.clone(),
            cursor: *cursor,
            hash: text_hash(text),
        });
        *text = last.text;
        *cursor = last.cursor;
        true
    }

    pub fn redo(&mut self, text: &mut String, cursor: &mut usize) -> bool {
        let Some(next) = self.redo_stack.pop() else {
            return false;
        };
        self.undo_stack.push(Snapshot {
            text: text.clone(),
            cursor: *cursor,
            hash: text_hash(text),
        });
        *text = next.text;
        *cursor = next.cursor;
        true
    }
}

fn text_hash(s: &str) -> u64 {
    let mut h = DefaultHasher::new();
    h.write(s.as_bytes());
    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesces_runs_within_a_group() {
        let mut engine = UndoEngine::new();
        engine.begin_undo_group("", 0);
        engine.begin_undo_group("a", 1);
        engine.begin_undo_group("ab", 2);
        engine.end_undo_group();
        assert_eq!(engine.undo_depth(), 1);
    }

    #[test]
    fn new_group_after_end_pushes_again() {
        let mut engine = UndoEngine::new();
        engine.begin_undo_group("", 0);
        engine.end_undo_group();
        engine.begin_undo_group("a", 1);
        engine.end_undo_group();
        assert_eq!(engine.undo_depth(), 2);
    }

    #[test]
    fn undo_restores_prior_text_and_cursor() {
        let mut engine = UndoEngine::new();
        engine.begin_undo_group("", 0);
        let mut text = "abc".to_string();
        let mut cursor = 3;
        assert!(engine.undo(&mut text, &mut cursor));
        assert_eq!(text, "");
        assert_eq!(cursor, 0);
    }

    #[test]
    fn redo_reapplies_undone_edit() {
        let mut engine = UndoEngine::new();
        engine.begin_undo_group("", 0);
        let mut text = "abc".to_string();
        let mut cursor = 3;
        engine.undo(&mut text, &mut cursor);
        assert!(engine.redo(&mut text, &mut cursor));
        assert_eq!(text, "abc");
        assert_eq!(cursor, 3);
    }

    #[test]
    fn identical_successive_snapshots_are_deduped() {
        let mut engine = UndoEngine::new();
        engine.push_discrete("same", 4);
        engine.push_discrete("same", 4);
        assert_eq!(engine.undo_depth(), 1);
        assert_eq!(engine.snapshots_skipped(), 1);
    }

    #[test]
    fn stack_is_bounded() {
        let mut engine = UndoEngine::new();
        for i in 0..(UNDO_HISTORY_MAX + 10) {
            engine.push_discrete(&format!("text{i}"), i);
        }
        assert_eq!(engine.undo_depth(), UNDO_HISTORY_MAX);
    }
}
