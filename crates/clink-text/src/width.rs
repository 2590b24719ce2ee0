//! Codepoint display width, feeding the `cell_count` sum over a `chars`
//! run's codepoints.
//!
//! Clink only ever needs a per-codepoint width to sum across a `chars` run;
//! it does not need grapheme-cluster-aware emoji width overrides, so this
//! stays a thin wrapper over `unicode_width` rather than the heavier
//! generated-override-table engine some editors carry.

use unicode_width::UnicodeWidthChar;

/// Display width of a single codepoint, in terminal columns.
///
/// Control characters (width 0 under `unicode_width`) are reported as 0,
/// matching `wcwidth`'s convention that callers never ask it about bytes
/// below `0x20` directly (the ECMA-48 iterator strips those into C0/C1
/// codes before this function ever sees a `chars` run).
pub fn char_width(c: char) -> usize {
    c.width().unwrap_or(0)
}

/// Sum of `char_width` over every codepoint in `s`.
pub fn str_cell_count(s: &str) -> usize {
    s.chars().map(char_width).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_one_column() {
        assert_eq!(char_width('a'), 1);
        assert_eq!(str_cell_count("hello"), 5);
    }

    #[test]
    fn wide_cjk_is_two_columns() {
        assert_eq!(char_width('字'), 2);
        assert_eq!(str_cell_count("字字"), 4);
    }

    #[test]
    fn combining_mark_is_zero_width() {
        // U+0301 COMBINING ACUTE ACCENT
        assert_eq!(char_width('\u{0301}'), 0);
    }
}
