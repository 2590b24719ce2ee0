//! The baseline keymap every host wires in: printable self-insert,
//! backspace, forward-delete-or-EOF, cursor motion, and line acceptance.
//! The kernel itself never touches the buffer for anything but match
//! acceptance — ordinary editing is just another module, with self-insert
//! dispatched through the binder's wildcard (key `0`) catch-all.

use crate::{Context, DispatchResult, EditorModule, Input, ModuleBinder};

mod ids {
    pub const SELF_INSERT: u8 = 0;
    pub const BACKSPACE: u8 = 1;
    pub const DELETE_OR_EOF: u8 = 2;
    pub const MOVE_LEFT: u8 = 3;
    pub const MOVE_RIGHT: u8 = 4;
    pub const HOME: u8 = 5;
    pub const END: u8 = 6;
    pub const ACCEPT_LINE: u8 = 7;
}

/// Self-insert needs to reassemble multi-byte UTF-8 characters out of the
/// single raw bytes the kernel hands it one at a time, so this module keeps
/// a small pending buffer across `on_input` calls.
#[derive(Default)]
pub struct CoreEditModule {
    pending: Vec<u8>,
}

impl CoreEditModule {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EditorModule for CoreEditModule {
    fn name(&self) -> &'static str {
        "core-edit"
    }

    fn bind_input(&mut self, binder: &mut ModuleBinder) {
        let group = binder.default_group();
        binder.bind(group, "\\0", ids::SELF_INSERT).unwrap();
        binder.bind(group, "\x7f", ids::BACKSPACE).unwrap();
        binder.bind(group, "\x08", ids::BACKSPACE).unwrap();
        binder.bind(group, "\\C-d", ids::DELETE_OR_EOF).unwrap();
        binder.bind(group, "\x1b[D", ids::MOVE_LEFT).unwrap();
        binder.bind(group, "\x1b[C", ids::MOVE_RIGHT).unwrap();
        binder.bind(group, "\\C-a", ids::HOME).unwrap();
        binder.bind(group, "\\C-e", ids::END).unwrap();
        binder.bind(group, "\r", ids::ACCEPT_LINE).unwrap();
        binder.bind(group, "\n", ids::ACCEPT_LINE).unwrap();
    }

    fn on_input(&mut self, input: &Input, result: &mut DispatchResult, ctx: &mut Context) {
        match input.id {
            ids::SELF_INSERT => {
                self.pending.extend_from_slice(&input.chord);
                match std::str::from_utf8(&self.pending) {
                    Ok(text) => {
                        ctx.buffer.insert(text);
                        self.pending.clear();
                        ctx.buffer.redraw();
                    }
                    Err(e) if e.valid_up_to() > 0 => {
                        let (valid, rest) = self.pending.split_at(e.valid_up_to());
                        let text = std::str::from_utf8(valid).expect("validated above");
                        ctx.buffer.insert(text);
                        self.pending = rest.to_vec();
                        ctx.buffer.redraw();
                    }
                    Err(e) if e.error_len().is_some() => {
                        self.pending.clear();
                    }
                    Err(_) => {
                        // Incomplete multi-byte sequence: wait for more bytes.
                    }
                }
            }
            ids::BACKSPACE => {
                let cursor = ctx.buffer.cursor();
                if cursor > 0 {
                    ctx.buffer.cursor_prev_grapheme();
                    let start = ctx.buffer.cursor();
                    ctx.buffer.remove(start, cursor);
                    ctx.buffer.redraw();
                }
            }
            ids::DELETE_OR_EOF => {
                if ctx.line.line.is_empty() {
                    result.done(true);
                } else {
                    let cursor = ctx.buffer.cursor();
                    if cursor < ctx.line.line.len() {
                        ctx.buffer.cursor_next_grapheme();
                        let end = ctx.buffer.cursor();
                        ctx.buffer.remove(cursor, end);
                        ctx.buffer.set_cursor(cursor);
                        ctx.buffer.redraw();
                    }
                }
            }
            ids::MOVE_LEFT => {
                ctx.buffer.cursor_prev_grapheme();
                ctx.buffer.redraw();
            }
            ids::MOVE_RIGHT => {
                ctx.buffer.cursor_next_grapheme();
                ctx.buffer.redraw();
            }
            ids::HOME => {
                ctx.buffer.set_cursor(0);
                ctx.buffer.redraw();
            }
            ids::END => {
                let len = ctx.buffer.text().len();
                ctx.buffer.set_cursor(len);
                ctx.buffer.redraw();
            }
            ids::ACCEPT_LINE => result.done(false),
            _ => result.pass(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LineEditorKernel, TokenizeConfig};
    use clink_matches::ComparePolicy;
    use clink_script::NoopScriptHost;

    fn kernel() -> LineEditorKernel {
        let mut kernel = LineEditorKernel::new(TokenizeConfig::default(), ComparePolicy::Caseless);
        kernel.add_module(Box::new(CoreEditModule::new()));
        let mut script = NoopScriptHost::new();
        kernel.begin_line(&mut script);
        kernel
    }

    #[test]
    fn typed_ascii_bytes_land_in_the_buffer() {
        let mut kernel = kernel();
        let mut script = NoopScriptHost::new();
        for b in b"git status" {
            kernel.step_byte(*b, &mut script);
        }
        assert_eq!(kernel.text(), "git status");
    }

    #[test]
    fn multi_byte_utf8_character_is_reassembled() {
        let mut kernel = kernel();
        let mut script = NoopScriptHost::new();
        for b in "caf\u{e9}".as_bytes() {
            kernel.step_byte(*b, &mut script);
        }
        assert_eq!(kernel.text(), "caf\u{e9}");
    }

    #[test]
    fn backspace_removes_the_previous_character() {
        let mut kernel = kernel();
        let mut script = NoopScriptHost::new();
        for b in b"abc" {
            kernel.step_byte(*b, &mut script);
        }
        kernel.step_byte(0x7f, &mut script);
        assert_eq!(kernel.text(), "ab");
    }

    #[test]
    fn ctrl_d_on_empty_line_ends_as_eof() {
        let mut kernel = kernel();
        let mut script = NoopScriptHost::new();
        kernel.step_byte(0x04, &mut script);
        assert!(!kernel.is_editing());
        assert!(kernel.is_eof());
    }

    #[test]
    fn ctrl_d_on_nonempty_line_deletes_forward() {
        let mut kernel = kernel();
        let mut script = NoopScriptHost::new();
        for b in b"abc" {
            kernel.step_byte(*b, &mut script);
        }
        kernel.step_byte(0x01, &mut script); // Ctrl-A: home
        kernel.step_byte(0x04, &mut script); // Ctrl-D: delete forward
        assert_eq!(kernel.text(), "bc");
        assert!(kernel.is_editing());
    }

    #[test]
    fn enter_accepts_the_line() {
        let mut kernel = kernel();
        let mut script = NoopScriptHost::new();
        for b in b"done" {
            kernel.step_byte(*b, &mut script);
        }
        kernel.step_byte(b'\r', &mut script);
        assert!(!kernel.is_editing());
        assert!(!kernel.is_eof());
        assert_eq!(kernel.text(), "done");
    }
}
