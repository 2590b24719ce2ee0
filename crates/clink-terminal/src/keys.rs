//! Host key events to xterm-style byte sequences.
//!
//! Modifier packing follows the standard xterm convention:
//! `mod = 1 + (shift | alt<<1 | ctrl<<2)`, omitted entirely when no
//! modifier is held (plain `CSI A`, not `CSI 1;1A`).

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mods: u8 {
        const SHIFT = 1 << 0;
        const ALT   = 1 << 1;
        const CTRL  = 1 << 2;
    }
}

fn xterm_mod(mods: Mods) -> u8 {
    1 + mods.bits()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorKey {
    Up,
    Down,
    Right,
    Left,
    Home,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKey {
    Insert,
    Delete,
    PageUp,
    PageDown,
}

/// How the bare Escape key is surfaced, a settings-driven policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscPolicy {
    #[default]
    Raw,
    CtrlC,
    RevertLine,
}

/// Encode one of the four arrow keys plus Home/End: `CSI <letter>` bare, or
/// `CSI 1 ; mod <letter>` with any modifier held.
pub fn encode_cursor(key: CursorKey, mods: Mods) -> Vec<u8> {
    let letter = match key {
        CursorKey::Up => b'A',
        CursorKey::Down => b'B',
        CursorKey::Right => b'C',
        CursorKey::Left => b'D',
        CursorKey::Home => b'H',
        CursorKey::End => b'F',
    };
    if mods.is_empty() {
        vec![0x1b, b'[', letter]
    } else {
        let mut out = format!("\x1b[1;{}", xterm_mod(mods)).into_bytes();
        out.push(letter);
        out
    }
}

/// Encode Insert/Delete/PageUp/PageDown: `CSI N ~` bare, or
/// `CSI N ; mod ~` with a modifier held.
pub fn encode_nav(key: NavKey, mods: Mods) -> Vec<u8> {
    let n = match key {
        NavKey::Insert => 2,
        NavKey::Delete => 3,
        NavKey::PageUp => 5,
        NavKey::PageDown => 6,
    };
    encode_numeric_csi(n, mods)
}

/// F1-F12, numeric xterm codes (skips the unused 16/22 slots), crossed
/// with {none, shift, ctrl, ctrl-shift} — a 48-entry table.
pub fn encode_function(n: u8, mods: Mods) -> Vec<u8> {
    debug_assert!((1..=12).contains(&n));
    let code = match n {
        1 => 11,
        2 => 12,
        3 => 13,
        4 => 14,
        5 => 15,
        6 => 17,
        7 => 18,
        8 => 19,
        9 => 20,
        10 => 21,
        11 => 23,
        12 => 24,
        _ => unreachable!(),
    };
    encode_numeric_csi(code, mods)
}

fn encode_numeric_csi(n: u32, mods: Mods) -> Vec<u8> {
    if mods.is_empty() {
        format!("\x1b[{n}~").into_bytes()
    } else {
        format!("\x1b[{n};{}~", xterm_mod(mods)).into_bytes()
    }
}

/// A shift-tab with no other prior input in the sequence: `CSI Z`.
pub fn encode_shift_tab() -> Vec<u8> {
    vec![0x1b, b'[', b'Z']
}

/// Collapse Ctrl + an ASCII letter to its C0 code (`letter & 0x1f`).
pub fn encode_ctrl_letter(c: char) -> Option<u8> {
    if c.is_ascii_alphabetic() {
        Some((c as u8) & 0x1f)
    } else {
        None
    }
}

/// Apply Alt-prefixing (a leading `ESC`) to an already-encoded base
/// sequence.
pub fn alt_prefix(mut base: Vec<u8>) -> Vec<u8> {
    let mut out = vec![0x1b];
    out.append(&mut base);
    out
}

/// Surface the Escape key per the configured policy.
pub fn encode_escape(policy: EscPolicy) -> Vec<u8> {
    match policy {
        EscPolicy::Raw => vec![0x1b],
        EscPolicy::CtrlC => vec![0x03],
        EscPolicy::RevertLine => vec![0x1b, b'[', b'M'],
    }
}

/// Sentinel read values surfaced by the host console reader, distinct from
/// any real byte value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadResult {
    Byte(u8),
    TerminalResize,
    Abort,
    None,
}

/// A small ring buffer of pending encoded bytes: a key press can expand to
/// several bytes (e.g. a CSI sequence), but the kernel's read contract pops
/// one byte at a time.
#[derive(Debug, Default)]
pub struct KeyRing {
    buf: std::collections::VecDeque<u8>,
}

pub const KEY_RING_CAP: usize = 16;

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an encoded sequence; bytes beyond the ring's capacity are
    /// dropped (the ring is a buffering convenience, not a guaranteed
    /// lossless queue under sustained overflow).
    pub fn push_sequence(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.buf.len() >= KEY_RING_CAP {
                break;
            }
            self.buf.push_back(b);
        }
    }

    pub fn pop(&mut self) -> Option<u8> {
        self.buf.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_arrow_has_no_modifier_param() {
        assert_eq!(encode_cursor(CursorKey::Up, Mods::empty()), b"\x1b[A");
    }

    #[test]
    fn modified_arrow_carries_mod_param() {
        // shift -> mod = 1 + 1 = 2
        assert_eq!(encode_cursor(CursorKey::Up, Mods::SHIFT), b"\x1b[1;2A");
        // ctrl -> mod = 1 + 4 = 5
        assert_eq!(encode_cursor(CursorKey::Right, Mods::CTRL), b"\x1b[1;5C");
    }

    #[test]
    fn nav_key_uses_tilde_form() {
        assert_eq!(encode_nav(NavKey::Delete, Mods::empty()), b"\x1b[3~");
        assert_eq!(encode_nav(NavKey::Insert, Mods::ALT), b"\x1b[2;3~");
    }

    #[test]
    fn function_key_table_matches_xterm_codes() {
        assert_eq!(encode_function(1, Mods::empty()), b"\x1b[11~");
        assert_eq!(encode_function(5, Mods::empty()), b"\x1b[15~");
        assert_eq!(encode_function(12, Mods::SHIFT | Mods::CTRL), b"\x1b[24;8~");
    }

    #[test]
    fn ctrl_letter_collapses_to_c0() {
        assert_eq!(encode_ctrl_letter('a'), Some(0x01));
        assert_eq!(encode_ctrl_letter('z'), Some(0x1a));
        assert_eq!(encode_ctrl_letter('1'), None);
    }

    #[test]
    fn alt_prefix_prepends_escape() {
        assert_eq!(alt_prefix(vec![b'x']), vec![0x1b, b'x']);
    }

    #[test]
    fn escape_policy_selects_surfaced_bytes() {
        assert_eq!(encode_escape(EscPolicy::Raw), vec![0x1b]);
        assert_eq!(encode_escape(EscPolicy::CtrlC), vec![0x03]);
        assert_eq!(encode_escape(EscPolicy::RevertLine), vec![0x1b, b'[', b'M']);
    }

    #[test]
    fn key_ring_pops_one_byte_at_a_time() {
        let mut ring = KeyRing::new();
        ring.push_sequence(&encode_cursor(CursorKey::Up, Mods::SHIFT));
        assert_eq!(ring.pop(), Some(0x1b));
        assert_eq!(ring.pop(), Some(b'['));
        assert!(!ring.is_empty());
    }

    #[test]
    fn key_ring_caps_at_sixteen_bytes() {
        let mut ring = KeyRing::new();
        ring.push_sequence(&[b'a'; 20]);
        let mut count = 0;
        while ring.pop().is_some() {
            count += 1;
        }
        assert_eq!(count, KEY_RING_CAP);
    }
}
