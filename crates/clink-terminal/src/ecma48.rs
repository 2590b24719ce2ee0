//! Restartable ECMA-48 byte-stream parser.
//!
//! The phase automaton: `unknown` dispatches on the
//! first byte, `char` accumulates a printable run, `esc`/`esc_st` handle the
//! byte immediately after `ESC`, and `csi_p`/`csi_f`/`cmd_str`/`char_str`
//! drive the various C1 sub-sequence shapes (CSI parameters, DCS/OSC/PM/APC
//! string terminators, SOS byte-transparent runs).
//!
//! A sequence that straddles two `next_chunk` calls is carried in
//! [`Ecma48State`]'s inline buffer and resumed on the next call — this is
//! what makes the parser "restartable": it is always legal to hand it
//! however many bytes happen to be available from the terminal.

use clink_text::{StrIter, str_cell_count};

const CARRY_CAP: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeType {
    None,
    Chars,
    C0,
    C1,
    Icf,
}

/// One C1 code constant used by [`Code::code`] when `kind == CodeType::C1`.
pub mod c1 {
    pub const CSI: u32 = 0x5b;
    pub const DCS: u32 = 0x50;
    pub const OSC: u32 = 0x5d;
    pub const PM: u32 = 0x5e;
    pub const APC: u32 = 0x5f;
    pub const SOS: u32 = 0x58;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    pub kind: CodeType,
    pub code: u32,
    bytes: Vec<u8>,
}

impl Code {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or("")
    }

    fn none() -> Self {
        Self {
            kind: CodeType::None,
            code: 0,
            bytes: Vec::new(),
        }
    }

    fn is_none(&self) -> bool {
        self.kind == CodeType::None
    }
}

/// CSI parameter decode result: the parsed parameter list plus the
/// intermediate/final bytes and whether the sequence used a private-use
/// marker (`0x3c`-`0x3f` immediately after CSI).
#[derive(Debug, Clone, Default)]
pub struct CsiParams {
    pub private_use: bool,
    pub intermediate: u8,
    pub r#final: u8,
    pub params: Vec<i32>,
}

impl Code {
    /// Parameter decode for a CSI (`c1::CSI`) code. Returns `None` for any
    /// other code kind.
    pub fn decode_csi(&self, max_params: usize) -> Option<CsiParams> {
        if self.kind != CodeType::C1 || self.code != c1::CSI {
            return None;
        }
        let mut iter = StrIter::from_str(self.as_str());
        if iter.peek() == Some('\u{1b}') {
            iter.next();
            iter.next();
        } else {
            iter.next();
        }

        let mut out = CsiParams::default();
        if let Some(c) = iter.peek()
            && in_range(c as i32, 0x3c, 0x3f)
        {
            out.private_use = true;
            iter.next();
        }

        let mut param = 0i32;
        let mut trailing_param = false;
        for c in iter {
            let c = c as i32;
            if in_range(c, 0x30, 0x3b) {
                trailing_param = true;
                if c == 0x3b {
                    if out.params.len() < max_params {
                        out.params.push(param);
                    }
                    param = 0;
                } else if c != 0x3a {
                    param = (param * 10) + (c - 0x30);
                }
            } else if in_range(c, 0x20, 0x2f) {
                out.intermediate = c as u8;
            } else if !in_range(c, 0x3c, 0x3f) {
                out.r#final = c as u8;
            }
        }
        if trailing_param && out.params.len() < max_params {
            out.params.push(param);
        }
        Some(out)
    }
}

fn in_range(value: i32, left: i32, right: i32) -> bool {
    (right - value) as u32 <= (right - left) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unknown,
    Char,
    Esc,
    EscSt,
    CsiP,
    CsiF,
    CmdStr,
    CharStr,
}

/// Carry state across `next_chunk` calls. Owned by the caller (typically the
/// terminal input reader), one instance per logical input stream.
#[derive(Debug, Clone)]
pub struct Ecma48State {
    phase: Phase,
    carry: Vec<u8>,
    partial_kind: CodeType,
    partial_code: u32,
}

impl Default for Ecma48State {
    fn default() -> Self {
        Self::new()
    }
}

impl Ecma48State {
    pub fn new() -> Self {
        Self {
            phase: Phase::Unknown,
            carry: Vec::new(),
            partial_kind: CodeType::None,
            partial_code: 0,
        }
    }

    fn reset(&mut self) {
        self.phase = Phase::Unknown;
        self.carry.clear();
        self.partial_kind = CodeType::None;
        self.partial_code = 0;
    }
}

/// Drives [`Ecma48State`] over one byte slice, yielding [`Code`]s via
/// repeated calls to [`Ecma48Iter::next`]. When the slice runs out mid
/// sequence, `next` returns `None` and the same `state` is handed to the
/// next `Ecma48Iter` constructed over the following bytes.
pub struct Ecma48Iter<'a> {
    input: &'a [u8],
    pos: usize,
    state: &'a mut Ecma48State,
}

impl<'a> Ecma48Iter<'a> {
    pub fn new(input: &'a [u8], state: &'a mut Ecma48State) -> Self {
        Self {
            input,
            pos: 0,
            state,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    pub fn next(&mut self) -> Option<Code> {
        let start = self.pos;
        let mut copied_upto = self.pos;
        let mut code = Code {
            kind: self.state.partial_kind,
            code: self.state.partial_code,
            bytes: Vec::new(),
        };

        loop {
            let Some(c) = self.peek() else {
                if self.state.phase != Phase::Char {
                    // Out of input mid-sequence: preserve phase/carry/partial
                    // code for the caller's next chunk.
                    while copied_upto < self.pos && self.state.carry.len() < CARRY_CAP - 1 {
                        self.state.carry.push(self.input[copied_upto]);
                        copied_upto += 1;
                    }
                    if copied_upto < self.pos {
                        tracing::trace!(target: "ecma48", phase = ?self.state.phase, "carry buffer full, truncating in-flight sequence");
                    }
                    self.state.partial_kind = code.kind;
                    self.state.partial_code = code.code;
                    return None;
                }
                break;
            };

            let done = match self.state.phase {
                Phase::Char => self.next_char(c, &mut code),
                Phase::CharStr => self.next_char_str(c),
                Phase::CmdStr => self.next_cmd_str(c, &mut code),
                Phase::CsiF => self.next_csi_f(c, &mut code),
                Phase::CsiP => self.next_csi_p(c, &mut code),
                Phase::Esc => self.next_esc(c, &mut code),
                Phase::EscSt => self.next_esc_st(c, &mut code),
                Phase::Unknown => self.next_unknown(c, &mut code),
            };

            if self.state.phase == Phase::Unknown && self.state.carry.is_empty() {
                // An internal malformed-sequence reset just fired; resume
                // carry accounting from here rather than re-copying bytes
                // that belonged to the abandoned sequence.
                copied_upto = self.pos;
            } else if self.state.phase != Phase::Char {
                while copied_upto < self.pos && self.state.carry.len() < CARRY_CAP - 1 {
                    self.state.carry.push(self.input[copied_upto]);
                    copied_upto += 1;
                }
            }

            if done {
                break;
            }
        }

        if self.state.phase != Phase::Char {
            code.bytes = std::mem::take(&mut self.state.carry);
        } else {
            code.bytes = self.input[start..self.pos].to_vec();
        }
        self.state.reset();
        Some(code)
    }

    fn next_c1(&mut self, code: &mut Code) -> bool {
        code.code = (code.code & 0x1f) | 0x40;
        match code.code {
            c if c == c1::DCS || c == c1::OSC || c == c1::PM || c == c1::APC => {
                self.state.phase = Phase::CmdStr;
                false
            }
            c if c == c1::CSI => {
                self.state.phase = Phase::CsiP;
                false
            }
            c if c == c1::SOS => {
                self.state.phase = Phase::CharStr;
                false
            }
            _ => true,
        }
    }

    fn next_char(&mut self, c: u8, code: &mut Code) -> bool {
        if in_range(c as i32, 0x00, 0x1f) {
            code.kind = CodeType::Chars;
            return true;
        }
        self.advance();
        false
    }

    fn next_char_str(&mut self, c: u8) -> bool {
        self.advance();
        if c == 0x1b {
            self.state.phase = Phase::EscSt;
            return false;
        }
        c == 0x9c
    }

    fn next_cmd_str(&mut self, c: u8, code: &mut Code) -> bool {
        if c == 0x1b {
            self.advance();
            self.state.phase = Phase::EscSt;
            false
        } else if c == 0x9c {
            self.advance();
            true
        } else if in_range(c as i32, 0x08, 0x0d) || in_range(c as i32, 0x20, 0x7e) {
            self.advance();
            false
        } else {
            code.bytes.clear();
            self.state.reset();
            false
        }
    }

    fn next_csi_f(&mut self, c: u8, code: &mut Code) -> bool {
        if in_range(c as i32, 0x20, 0x2f) {
            self.advance();
            false
        } else if in_range(c as i32, 0x40, 0x7e) {
            self.advance();
            true
        } else {
            code.bytes.clear();
            self.state.reset();
            false
        }
    }

    fn next_csi_p(&mut self, c: u8, code: &mut Code) -> bool {
        if in_range(c as i32, 0x30, 0x3f) {
            self.advance();
            return false;
        }
        self.state.phase = Phase::CsiF;
        self.next_csi_f(c, code)
    }

    fn next_esc(&mut self, c: u8, code: &mut Code) -> bool {
        self.advance();
        if in_range(c as i32, 0x40, 0x5f) {
            code.kind = CodeType::C1;
            code.code = c as u32;
            self.next_c1(code)
        } else if in_range(c as i32, 0x60, 0x7f) {
            code.kind = CodeType::Icf;
            code.code = c as u32;
            true
        } else {
            self.state.phase = Phase::Char;
            false
        }
    }

    fn next_esc_st(&mut self, c: u8, code: &mut Code) -> bool {
        if c == 0x5c {
            self.advance();
            return true;
        }
        code.bytes.clear();
        self.state.reset();
        false
    }

    fn next_unknown(&mut self, c: u8, code: &mut Code) -> bool {
        self.advance();
        if c == 0x1b {
            self.state.phase = Phase::Esc;
            false
        } else if in_range(c as i32, 0x00, 0x1f) {
            code.kind = CodeType::C0;
            code.code = c as u32;
            true
        } else if in_range(c as i32, 0x80, 0x9f) {
            code.kind = CodeType::C1;
            code.code = c as u32;
            self.next_c1(code)
        } else {
            code.kind = CodeType::Chars;
            self.state.phase = Phase::Char;
            false
        }
    }
}

/// Sum of display widths over every `chars`-typed code in `s`.
pub fn cell_count(s: &str) -> usize {
    let mut state = Ecma48State::new();
    let mut iter = Ecma48Iter::new(s.as_bytes(), &mut state);
    let mut total = 0;
    while let Some(code) = iter.next() {
        if code.is_none() {
            break;
        }
        if code.kind == CodeType::Chars {
            total += str_cell_count(code.as_str());
        }
    }
    total
}

/// Parse a full (non-streaming) byte slice into its codes, for tests and
/// callers that already have the whole buffer in hand.
pub fn parse_all(bytes: &[u8]) -> Vec<Code> {
    let mut state = Ecma48State::new();
    let mut out = Vec::new();
    let mut iter = Ecma48Iter::new(bytes, &mut state);
    while let Some(code) = iter.next() {
        out.push(code);
    }
    out
}
