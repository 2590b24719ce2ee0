//! Shared byte/UTF string iteration and display-width primitives.
//!
//! Every higher layer — the ECMA-48 parser, the line buffer, the match
//! pipeline — walks text through [`StrIter`] rather than indexing `&str`
//! directly, so that invalid UTF-8 and mid-sequence truncation are handled
//! in exactly one place.

mod width;

pub use width::{char_width, str_cell_count};

/// Forward iterator over the Unicode scalar values of a byte slice.
///
/// Unlike `str::chars`, `StrIter` is built to run over slices that are not
/// guaranteed to be valid UTF-8 at their boundaries (e.g. a chunk handed to
/// the ECMA-48 parser mid-stream) — malformed sequences yield
/// `char::REPLACEMENT_CHARACTER` and advance by one byte rather than
/// panicking or stalling.
pub struct StrIter<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> StrIter<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn from_str(s: &'a str) -> Self {
        Self::new(s.as_bytes())
    }

    /// Byte offset of the next unread byte.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Remaining unread bytes.
    pub fn remainder(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    /// Look at the next codepoint without consuming it.
    pub fn peek(&self) -> Option<char> {
        let mut clone = Self {
            bytes: self.bytes,
            pos: self.pos,
        };
        clone.next()
    }
}

impl Iterator for StrIter<'_> {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        if self.pos >= self.bytes.len() {
            return None;
        }
        let rest = &self.bytes[self.pos..];
        match std::str::from_utf8(rest) {
            Ok(s) => {
                let c = s.chars().next()?;
                self.pos += c.len_utf8();
                Some(c)
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                if valid_up_to > 0 {
                    let s = unsafe { std::str::from_utf8_unchecked(&rest[..valid_up_to]) };
                    let c = s.chars().next()?;
                    self.pos += c.len_utf8();
                    Some(c)
                } else {
                    self.pos += 1;
                    Some(char::REPLACEMENT_CHARACTER)
                }
            }
        }
    }
}

/// Grapheme-aware byte offset stepping, used by the line buffer's cursor
/// motions so a multi-byte or combining-mark cluster moves as one unit.
pub mod graphemes {
    use unicode_segmentation::UnicodeSegmentation;

    /// Byte offset of the grapheme cluster boundary after `from`, or
    /// `s.len()` if `from` is already at or past the last boundary.
    pub fn next_boundary(s: &str, from: usize) -> usize {
        s[from..]
            .grapheme_indices(true)
            .nth(1)
            .map(|(i, _)| from + i)
            .unwrap_or(s.len())
    }

    /// Byte offset of the grapheme cluster boundary before `from`, or 0.
    pub fn prev_boundary(s: &str, from: usize) -> usize {
        s[..from]
            .grapheme_indices(true)
            .next_back()
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_ascii() {
        let v: String = StrIter::from_str("abc").collect();
        assert_eq!(v, "abc");
    }

    #[test]
    fn iterates_multibyte() {
        let v: Vec<char> = StrIter::from_str("a字b").collect();
        assert_eq!(v, vec!['a', '字', 'b']);
    }

    #[test]
    fn invalid_byte_becomes_replacement() {
        let bytes = [b'a', 0xff, b'b'];
        let v: Vec<char> = StrIter::new(&bytes).collect();
        assert_eq!(v, vec!['a', char::REPLACEMENT_CHARACTER, 'b']);
    }

    #[test]
    fn peek_does_not_advance() {
        let mut it = StrIter::from_str("xy");
        assert_eq!(it.peek(), Some('x'));
        assert_eq!(it.next(), Some('x'));
        assert_eq!(it.next(), Some('y'));
    }

    #[test]
    fn grapheme_boundaries_step_combining_marks_together() {
        let s = "e\u{0301}f"; // e + combining acute + f
        assert_eq!(graphemes::next_boundary(s, 0), "e\u{0301}".len());
        assert_eq!(graphemes::prev_boundary(s, s.len()), "e\u{0301}".len());
    }
}
