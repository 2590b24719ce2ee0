//! `history_expand_control`: whether `!` at a given position in the line
//! should be inhibited from bash-style history expansion, based on quote
//! context and `history.expand_mode`.
//!
//! Preserved as a known quirk rather than "fixed": quote tracking is a
//! single toggle flipped by *any* quote byte, single or double, so a stray
//! apostrophe inside a double-quoted string closes the tracked quote
//! early. That's intentional, not a bug introduced here.

use clink_config::ExpandMode;

/// Running quote state fed one source byte at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuoteState {
    in_quote: Option<char>,
}

impl QuoteState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next byte of the line being scanned.
    pub fn feed(&mut self, c: u8) {
        if c == b'\'' || c == b'"' {
            self.in_quote = match self.in_quote {
                None => Some(c as char),
                Some(_) => None,
            };
        }
    }

    pub fn in_single_quote(self) -> bool {
        self.in_quote == Some('\'')
    }

    pub fn in_double_quote(self) -> bool {
        self.in_quote == Some('"')
    }

    pub fn in_any_quote(self) -> bool {
        self.in_quote.is_some()
    }
}

/// Whether a bare `!` should be inhibited from expansion given the quote
/// state immediately preceding it and the active `history.expand_mode`.
pub fn inhibits_expansion(state: QuoteState, mode: ExpandMode) -> bool {
    match mode {
        ExpandMode::Off => true,
        ExpandMode::On => false,
        ExpandMode::NotSquoted => state.in_single_quote(),
        ExpandMode::NotDquoted => state.in_double_quote(),
        ExpandMode::NotQuoted => state.in_any_quote(),
    }
}

/// Scan `line[..index]` to recover quote state, then decide whether the `!`
/// at `index` should be inhibited under `mode`. Callers invoking this once
/// per candidate `!` position get the same answer as an incrementally
/// maintained scan, without needing mutable state threaded between calls.
pub fn history_expand_control(line: &str, index: usize, mode: ExpandMode) -> bool {
    let mut state = QuoteState::new();
    for &b in line.as_bytes().iter().take(index) {
        state.feed(b);
    }
    inhibits_expansion(state, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_mode_always_inhibits() {
        assert!(history_expand_control("echo !!", 5, ExpandMode::Off));
    }

    #[test]
    fn on_mode_never_inhibits() {
        assert!(!history_expand_control(
            "echo 'quoted' !!",
            14,
            ExpandMode::On
        ));
    }

    #[test]
    fn not_quoted_inhibits_inside_either_quote_kind() {
        assert!(history_expand_control(
            "echo 'a !b'",
            8,
            ExpandMode::NotQuoted
        ));
        assert!(history_expand_control(
            "echo \"a !b\"",
            8,
            ExpandMode::NotQuoted
        ));
        assert!(!history_expand_control(
            "echo a !b",
            6,
            ExpandMode::NotQuoted
        ));
    }

    #[test]
    fn not_squoted_ignores_double_quote_context() {
        assert!(!history_expand_control(
            "echo \"a !b\"",
            8,
            ExpandMode::NotSquoted
        ));
        assert!(history_expand_control(
            "echo 'a !b'",
            8,
            ExpandMode::NotSquoted
        ));
    }

    #[test]
    fn mismatched_quote_byte_still_toggles_the_single_flag() {
        let mut state = QuoteState::new();
        for b in b"'a\"" {
            state.feed(*b);
        }
        assert!(!state.in_any_quote());
    }
}
