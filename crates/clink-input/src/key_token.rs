//! Crossterm key events to xterm-style byte sequences, via the
//! encoding tables in `clink_terminal::keys`.

use clink_terminal::keys::{
    CursorKey, EscPolicy, Mods, NavKey, alt_prefix, encode_ctrl_letter, encode_cursor,
    encode_escape, encode_function, encode_nav, encode_shift_tab,
};
use crossterm::event::{
    KeyCode as CKeyCode, KeyEvent as CKeyEvent, KeyModifiers as CKeyModifiers,
};

fn map_mods(m: CKeyModifiers) -> Mods {
    let mut out = Mods::empty();
    if m.contains(CKeyModifiers::SHIFT) {
        out |= Mods::SHIFT;
    }
    if m.contains(CKeyModifiers::ALT) {
        out |= Mods::ALT;
    }
    if m.contains(CKeyModifiers::CONTROL) {
        out |= Mods::CTRL;
    }
    out
}

/// Encode one crossterm key event to the raw bytes the kernel's resolver
/// should see. Returns `None` for key codes with no byte-sequence
/// representation (media keys, caps lock, etc).
pub(crate) fn encode_key_event(event: &CKeyEvent, esc_policy: EscPolicy) -> Option<Vec<u8>> {
    let mods = map_mods(event.modifiers);
    let alt = mods.contains(Mods::ALT);
    let rest = mods & !Mods::ALT;

    let base: Vec<u8> = match event.code {
        CKeyCode::Char(c) => {
            if rest.contains(Mods::CTRL) {
                if let Some(b) = encode_ctrl_letter(c) {
                    vec![b]
                } else {
                    let mut buf = [0u8; 4];
                    c.encode_utf8(&mut buf).as_bytes().to_vec()
                }
            } else {
                let mut buf = [0u8; 4];
                c.encode_utf8(&mut buf).as_bytes().to_vec()
            }
        }
        CKeyCode::Enter => vec![0x0d],
        CKeyCode::Tab => vec![0x09],
        CKeyCode::BackTab => encode_shift_tab(),
        CKeyCode::Backspace => vec![0x7f],
        CKeyCode::Esc => encode_escape(esc_policy),
        CKeyCode::Up => encode_cursor(CursorKey::Up, rest),
        CKeyCode::Down => encode_cursor(CursorKey::Down, rest),
        CKeyCode::Left => encode_cursor(CursorKey::Left, rest),
        CKeyCode::Right => encode_cursor(CursorKey::Right, rest),
        CKeyCode::Home => encode_cursor(CursorKey::Home, rest),
        CKeyCode::End => encode_cursor(CursorKey::End, rest),
        CKeyCode::Insert => encode_nav(NavKey::Insert, rest),
        CKeyCode::Delete => encode_nav(NavKey::Delete, rest),
        CKeyCode::PageUp => encode_nav(NavKey::PageUp, rest),
        CKeyCode::PageDown => encode_nav(NavKey::PageDown, rest),
        CKeyCode::F(n) if (1..=12).contains(&n) => {
            let fmods = if rest.contains(Mods::CTRL) && rest.contains(Mods::SHIFT) {
                Mods::CTRL | Mods::SHIFT
            } else if rest.contains(Mods::CTRL) {
                Mods::CTRL
            } else if rest.contains(Mods::SHIFT) {
                Mods::SHIFT
            } else {
                Mods::empty()
            };
            encode_function(n as u8, fmods)
        }
        _ => return None,
    };

    Some(if alt { alt_prefix(base) } else { base })
}

/// Encode a literal bracketed-paste payload as plain key bytes: a paste
/// is a burst of ordinary input, not a distinct mode.
pub(crate) fn encode_paste(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}
