//! Single-line text buffer: insert/remove/cursor over one editing line,
//! undo groups, and a coalescing `need_draw` flag so the kernel can flush
//! the screen once per outer loop iteration rather than per edit.

pub mod undo;

use clink_text::graphemes;
use tracing::trace;
use undo::UndoEngine;
pub use undo::UNDO_HISTORY_MAX;

/// A single editing line: text, a byte-offset cursor, and the undo history
/// that tracks edits to it.
pub struct LineBuffer {
    text: String,
    cursor: usize,
    need_draw: bool,
    undo: UndoEngine,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            cursor: 0,
            need_draw: false,
            undo: UndoEngine::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn set_cursor(&mut self, pos: usize) {
        let pos = pos.min(self.text.len());
        if pos != self.cursor {
            self.cursor = pos;
            self.need_draw = true;
        }
    }

    /// Reset to an empty line and clear undo history, for a fresh
    /// `begin_line`.
    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
        self.undo = UndoEngine::new();
        self.need_draw = true;
    }

    /// Insert `text` at the cursor. Consecutive inserts coalesce into one
    /// undo group until `end_undo_group` is called.
    pub fn insert(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.undo.begin_undo_group(&self.text, self.cursor);
        self.text.insert_str(self.cursor, text);
        self.cursor += text.len();
        self.need_draw = true;
        trace!(target: "buffer", len = self.text.len(), cursor = self.cursor, "insert");
    }

    /// Remove the byte range `[from, to)`, clamped to the line. A discrete
    /// edit: always pushes its own undo snapshot, ending any open insert
    /// group.
    pub fn remove(&mut self, from: usize, to: usize) {
        let from = from.min(self.text.len());
        let to = to.min(self.text.len());
        if from >= to {
            return;
        }
        self.end_undo_group();
        self.undo.push_discrete(&self.text, self.cursor);
        self.text.replace_range(from..to, "");
        self.cursor = if self.cursor > to {
            self.cursor - (to - from)
        } else {
            self.cursor.min(from)
        };
        self.need_draw = true;
        trace!(target: "buffer", from, to, "remove");
    }

    pub fn begin_undo_group(&mut self) {
        self.undo.begin_undo_group(&self.text, self.cursor);
    }

    pub fn end_undo_group(&mut self) {
        self.undo.end_undo_group();
    }

    pub fn undo(&mut self) -> bool {
        let applied = self.undo.undo(&mut self.text, &mut self.cursor);
        if applied {
            self.need_draw = true;
        }
        applied
    }

    pub fn redo(&mut self) -> bool {
        let applied = self.undo.redo(&mut self.text, &mut self.cursor);
        if applied {
            self.need_draw = true;
        }
        applied
    }

    /// Move the cursor to the next/previous grapheme-cluster boundary.
    pub fn cursor_next_grapheme(&mut self) {
        self.set_cursor(graphemes::next_boundary(&self.text, self.cursor));
    }

    pub fn cursor_prev_grapheme(&mut self) {
        self.set_cursor(graphemes::prev_boundary(&self.text, self.cursor));
    }

    pub fn need_draw(&self) -> bool {
        self.need_draw
    }

    /// Force the next `draw` call to report a pending redraw even if no
    /// edit occurred since the last one.
    pub fn redraw(&mut self) {
        self.need_draw = true;
    }

    /// Flush: returns the current text/cursor if a redraw is pending,
    /// clearing the flag. Called once per outer kernel loop iteration.
    pub fn draw(&mut self) -> Option<(&str, usize)> {
        if self.need_draw {
            self.need_draw = false;
            Some((&self.text, self.cursor))
        } else {
            None
        }
    }
}
