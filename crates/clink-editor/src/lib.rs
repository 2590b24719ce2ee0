//! Line-editor kernel: the cooperative single-threaded dispatch loop that
//! owns the binder, the line buffer, and the match pipeline, and drives
//! `EditorModule`s through one key at a time.

pub mod alias;
mod core_edit;
mod word;

pub use core_edit::CoreEditModule;
pub use word::{LineState, TokenizeConfig, Word, collect_words, find_command_bounds};

use clink_binder::{BindError, Binder, BindResolver, GroupId, ModuleId};
use clink_buffer::LineBuffer;
use clink_matches::{ComparePolicy, MatchBuilder, MatchGenerator, MatchPipeline, RawMatch};
use clink_script::ScriptHost;

/// One input event handed to a module's `on_input`: the chord bytes
/// that resolved to this binding, and the id the module registered it
/// under.
#[derive(Debug, Clone)]
pub struct Input {
    pub chord: Vec<u8>,
    pub id: u8,
}

/// Commands a module signals back to the kernel from `on_input`.
/// Seeded with the resolver's current group and no accepted match.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pass: bool,
    done: bool,
    eof: bool,
    redraw: bool,
    append_lcd: bool,
    match_index: Option<usize>,
    group: GroupId,
}

impl DispatchResult {
    fn new(group: GroupId) -> Self {
        Self {
            pass: false,
            done: false,
            eof: false,
            redraw: false,
            append_lcd: false,
            match_index: None,
            group,
        }
    }

    /// "Not me" — let the resolver try the next binding at this node.
    pub fn pass(&mut self) {
        self.pass = true;
    }

    /// End the edit session, optionally as EOF (e.g. Ctrl-D on an empty
    /// line).
    pub fn done(&mut self, eof: bool) {
        self.done = true;
        self.eof = eof;
    }

    pub fn redraw(&mut self) {
        self.redraw = true;
    }

    /// Extend the line by the matches' longest common prefix.
    pub fn append_match_lcd(&mut self) {
        self.append_lcd = true;
    }

    /// Accept the `index`-th currently selected match.
    pub fn accept_match(&mut self, index: usize) {
        self.match_index = Some(index);
    }

    /// Switch the resolver's active group for subsequent input, returning
    /// the group that was active when this `Result` was constructed.
    pub fn set_bind_group(&mut self, group: GroupId) -> GroupId {
        std::mem::replace(&mut self.group, group)
    }
}

/// A typed façade over [`Binder`] handed to a module during `initialise`,
/// so modules register chords without touching the binder directly.
pub struct ModuleBinder<'a> {
    binder: &'a mut Binder,
    module: ModuleId,
}

impl ModuleBinder<'_> {
    pub fn create_group(&mut self) -> GroupId {
        self.binder.add_group()
    }

    pub fn default_group(&self) -> GroupId {
        self.binder.default_group()
    }

    pub fn bind(&mut self, group: GroupId, chord: &str, id: u8) -> Result<(), BindError> {
        self.binder.bind(group, chord, self.module, id)
    }
}

/// The one frame handed to every module callback: a read-only snapshot of
/// the tokenised line plus a live handle onto the buffer it was taken from
/// — modules edit text by mutating `ctx.buffer` directly, not through
/// [`DispatchResult`].
pub struct Context<'a> {
    pub buffer: &'a mut LineBuffer,
    pub line: LineState,
    pub matches: &'a MatchPipeline,
}

/// The kernel's sole extension point. A module binds its own
/// chords, reacts to begin/end-of-line, and observes a freshly recomputed
/// match set.
pub trait EditorModule {
    /// Stable name this module registers under.
    fn name(&self) -> &'static str;

    fn bind_input(&mut self, binder: &mut ModuleBinder);

    fn on_begin_line(&mut self, _ctx: &mut Context) {}

    fn on_end_line(&mut self) {}

    fn on_matches_changed(&mut self, _ctx: &mut Context) {}

    fn on_input(&mut self, input: &Input, result: &mut DispatchResult, ctx: &mut Context);

    fn on_terminal_resize(&mut self, _cols: u16, _rows: u16, _ctx: &mut Context) {}
}

/// Packed `(word_offset, word_length, cursor)` fingerprint `update_internal`
/// compares against the previous call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Fingerprint {
    word_offset: u32,
    word_length: u32,
    cursor: usize,
}

/// One-shot generator wrapping the script host's already-computed
/// candidates so they flow through the same pipeline as every other
/// generator (the script host is invoked synchronously from the
/// match pipeline").
struct ScriptMatches(Vec<String>);

impl MatchGenerator for ScriptMatches {
    fn generate(&mut self, _line: &str, builder: &mut MatchBuilder) -> bool {
        if self.0.is_empty() {
            return false;
        }
        for m in self.0.drain(..) {
            builder.add_match(RawMatch::new(m));
        }
        true
    }

    fn get_prefix_length(&mut self, _line: &str) -> u32 {
        0
    }
}

/// Owns the binder, resolver, line buffer, and match pipeline, and drives
/// them through the cooperative edit loop. Does not own
/// terminal I/O: the caller feeds bytes in via [`step_byte`](Self::step_byte)
/// and reads the current line back out via [`draw`](Self::draw).
pub struct LineEditorKernel {
    binder: Binder,
    resolver: BindResolver,
    buffer: LineBuffer,
    pipeline: MatchPipeline,
    generators: Vec<Box<dyn MatchGenerator>>,
    modules: Vec<Box<dyn EditorModule>>,
    config: TokenizeConfig,
    compare_policy: ComparePolicy,
    command_offset: usize,
    words: Vec<Word>,
    word_key: Option<(u32, u32)>,
    full_key: Option<Fingerprint>,
    initialised: bool,
    editing: bool,
    eof: bool,
}

impl LineEditorKernel {
    pub fn new(config: TokenizeConfig, compare_policy: ComparePolicy) -> Self {
        let binder = Binder::new();
        let group = binder.default_group();
        Self {
            binder,
            resolver: BindResolver::new(group),
            buffer: LineBuffer::new(),
            pipeline: MatchPipeline::new(),
            generators: Vec::new(),
            modules: Vec::new(),
            config,
            compare_policy,
            command_offset: 0,
            words: Vec::new(),
            word_key: None,
            full_key: None,
            initialised: false,
            editing: false,
            eof: false,
        }
    }

    pub fn add_module(&mut self, module: Box<dyn EditorModule>) {
        self.modules.push(module);
    }

    pub fn add_generator(&mut self, generator: Box<dyn MatchGenerator>) {
        self.generators.push(generator);
    }

    /// Initialise step: give each module a binder façade, once.
    pub fn initialise(&mut self) {
        if self.initialised {
            return;
        }
        for module in &mut self.modules {
            let Ok(module_id) = self.binder.register_module(module.name()) else {
                tracing::warn!(module = module.name(), "module table full, binding skipped");
                continue;
            };
            let mut facade = ModuleBinder {
                binder: &mut self.binder,
                module: module_id,
            };
            module.bind_input(&mut facade);
        }
        self.initialised = true;
    }

    /// Begin-line step: reset resolver/pipeline state and notify every module.
    pub fn begin_line(&mut self, script: &mut dyn ScriptHost) {
        self.initialise();
        self.buffer.clear();
        self.resolver = BindResolver::new(self.binder.default_group());
        self.pipeline.reset();
        self.word_key = None;
        self.full_key = None;
        self.editing = true;
        self.eof = false;
        self.update_internal(script);
        let line_state = self.line_state();
        for module in &mut self.modules {
            let mut ctx = Context {
                buffer: &mut self.buffer,
                line: line_state.clone(),
                matches: &self.pipeline,
            };
            module.on_begin_line(&mut ctx);
        }
    }

    fn end_line(&mut self) {
        self.editing = false;
        for module in self.modules.iter_mut().rev() {
            module.on_end_line();
        }
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn text(&self) -> &str {
        self.buffer.text()
    }

    pub fn line_state(&self) -> LineState {
        LineState {
            line: self.buffer.text().to_string(),
            cursor: self.buffer.cursor(),
            command_offset: self.command_offset,
            words: self.words.clone(),
        }
    }

    /// Flush the line buffer's coalesced redraw, if any is pending, once
    /// per outer loop iteration.
    pub fn draw(&mut self) -> Option<(&str, usize)> {
        self.buffer.draw()
    }

    /// Resize branch: broadcast to every module.
    pub fn dispatch_resize(&mut self, cols: u16, rows: u16) {
        let line_state = self.line_state();
        for module in &mut self.modules {
            let mut ctx = Context {
                buffer: &mut self.buffer,
                line: line_state.clone(),
                matches: &self.pipeline,
            };
            module.on_terminal_resize(cols, rows, &mut ctx);
        }
    }

    /// Abort branch: reset the buffer and end the line.
    pub fn dispatch_abort(&mut self) {
        self.buffer.clear();
        self.end_line();
        self.eof = true;
    }

    /// Feed one byte through the resolver, dispatch any
    /// bindings it yields, then re-run `update_internal`.
    pub fn step_byte(&mut self, byte: u8, script: &mut dyn ScriptHost) {
        if !self.editing {
            return;
        }
        if !self.resolver.step(&self.binder, byte) {
            return;
        }

        while let Some(binding) = self.resolver.next(&self.binder) {
            let mut result = DispatchResult::new(self.resolver.group());
            {
                let line_state = self.line_state();
                let input = Input {
                    chord: binding.chord.clone(),
                    id: binding.id,
                };
                let mut ctx = Context {
                    buffer: &mut self.buffer,
                    line: line_state,
                    matches: &self.pipeline,
                };
                if let Some(module) = self.modules.get_mut(binding.module as usize) {
                    module.on_input(&input, &mut result, &mut ctx);
                } else {
                    result.pass();
                }
            }

            if result.pass {
                continue;
            }
            self.resolver.claim(binding.depth);

            if result.done {
                self.end_line();
                if result.eof {
                    self.eof = true;
                }
            }
            if result.redraw {
                self.buffer.redraw();
            }
            if let Some(index) = result.match_index {
                self.accept_match(index);
            } else if result.append_lcd {
                self.append_match_lcd();
            }

            self.resolver.set_group(result.group);
            if !self.editing {
                break;
            }
        }

        self.update_internal(script);
    }

    fn retokenize(&mut self) {
        let line = self.buffer.text();
        let cursor = self.buffer.cursor();
        self.command_offset = find_command_bounds(line, cursor, &self.config);
        self.words = collect_words(line, cursor, self.command_offset, &self.config, &mut self.generators);
    }

    /// re-tokenise, then re-run the match pipeline
    /// stages whose inputs actually changed.
    fn update_internal(&mut self, script: &mut dyn ScriptHost) {
        self.retokenize();

        let end_word = *self.words.last().expect("collect_words always yields an end word");
        let word_key = (end_word.offset, end_word.length);
        let fingerprint = Fingerprint {
            word_offset: end_word.offset,
            word_length: end_word.length,
            cursor: self.buffer.cursor(),
        };

        if self.word_key != Some(word_key) {
            self.word_key = Some(word_key);
            let line = self.buffer.text().to_string();
            self.pipeline.reset();

            let script_matches = script.generate(&line);
            let mut chain: Vec<Box<dyn MatchGenerator>> = Vec::with_capacity(1 + self.generators.len());
            chain.push(Box::new(ScriptMatches(script_matches)));
            chain.append(&mut self.generators);
            self.pipeline.generate(&line, &mut chain);
            self.generators = chain.split_off(1);

            self.pipeline.fill_info();
        }

        if self.full_key != Some(fingerprint) {
            self.full_key = Some(fingerprint);
            let needle = self.build_needle(&end_word);
            self.pipeline.select(&needle, self.compare_policy);
            self.pipeline.coalesce();
            self.pipeline.sort();

            let line_state = self.line_state();
            for module in &mut self.modules {
                let mut ctx = Context {
                    buffer: &mut self.buffer,
                    line: line_state.clone(),
                    matches: &self.pipeline,
                };
                module.on_matches_changed(&mut ctx);
            }
        }
    }

    fn build_needle(&self, end_word: &Word) -> String {
        let line = self.buffer.text();
        let mut start = end_word.offset as usize;
        if !self.pipeline.prefix_included() {
            start += end_word.length as usize;
        }
        let cursor = self.buffer.cursor();
        let mut needle = line.get(start..cursor).unwrap_or("").to_string();
        if end_word.quoted && needle.ends_with(self.config.quote_close) {
            needle.pop();
        }
        needle
    }

    /// Insert the `index`-th selected match in place of the
    /// end-word, quoting and suffixing it as needed.
    fn accept_match(&mut self, index: usize) {
        let count = self.pipeline.selected_count();
        if index >= count {
            return;
        }
        let Some(end_word) = self.words.last().copied() else {
            return;
        };

        let info = self.pipeline.infos()[index];
        let match_text = self.pipeline.text_of(&info).to_string();
        if match_text.is_empty() {
            return;
        }
        let explicit_suffix = info.suffix;

        let word_start = end_word.offset as usize;
        let word_end = end_word.end();

        let mut to_insert = String::new();
        if !self.pipeline.prefix_included() {
            to_insert.push_str(self.buffer.text().get(word_start..word_end).unwrap_or(""));
        }
        to_insert.push_str(&match_text);

        let needs_quote =
            end_word.quoted || to_insert.bytes().any(|b| self.config.word_delims.as_bytes().contains(&b));

        let cursor = self.buffer.cursor();
        self.buffer.remove(word_start, cursor);
        self.buffer.set_cursor(word_start);

        if needs_quote && !end_word.quoted {
            self.buffer.insert(&self.config.quote_open.to_string());
        }
        self.buffer.insert(&to_insert);

        let suffix = match explicit_suffix {
            Some(b) => Some(b),
            None => {
                let prefix_len = self
                    .generators
                    .iter_mut()
                    .map(|g| g.get_prefix_length(&match_text))
                    .max()
                    .unwrap_or(0);
                if prefix_len as usize == match_text.len() {
                    None
                } else {
                    self.config.word_delims.as_bytes().first().copied()
                }
            }
        };

        if let Some(suffix_byte) = suffix {
            if needs_quote && explicit_suffix.is_none() {
                self.buffer.insert(&self.config.quote_close.to_string());
            }
            let cursor = self.buffer.cursor();
            let at_cursor = self.buffer.text().as_bytes().get(cursor).copied();
            if at_cursor == Some(suffix_byte) {
                self.buffer.set_cursor(cursor + 1);
            } else {
                self.buffer.insert(&(suffix_byte as char).to_string());
            }
        }

        self.buffer.redraw();
    }

    /// Extend the end-word by the longest common prefix
    /// of the currently selected matches.
    fn append_match_lcd(&mut self) {
        let count = self.pipeline.selected_count();
        if count == 0 {
            return;
        }
        let Some(end_word) = self.words.last().copied() else {
            return;
        };

        let lcd = self.common_prefix(count);
        if lcd.is_empty() {
            return;
        }

        let mut word_end = end_word.offset as usize;
        if !self.pipeline.prefix_included() {
            word_end += end_word.length as usize;
        }
        let cursor = self.buffer.cursor();

        if cursor != word_end + lcd.len() {
            self.buffer.remove(word_end, cursor);
            self.buffer.set_cursor(word_end);
            self.buffer.insert(&lcd);
        }

        let mut needs_quote = lcd.bytes().any(|b| self.config.word_delims.as_bytes().contains(&b));
        if !needs_quote {
            for info in &self.pipeline.infos()[..count] {
                let text = self.pipeline.text_of(info);
                if let Some(rest) = text.get(lcd.len()..) {
                    if let Some(&b) = rest.as_bytes().first() {
                        if self.config.word_delims.as_bytes().contains(&b) {
                            needs_quote = true;
                            break;
                        }
                    }
                }
            }
        }

        if needs_quote && !end_word.quoted {
            let cursor = self.buffer.cursor();
            self.buffer.set_cursor(end_word.offset as usize);
            self.buffer.insert(&self.config.quote_open.to_string());
            self.buffer.set_cursor(cursor + 1);
        }

        self.buffer.redraw();
    }

    fn common_prefix(&self, count: usize) -> String {
        let infos = &self.pipeline.infos()[..count];
        let mut texts = infos.iter().map(|info| self.pipeline.text_of(info));
        let Some(first) = texts.next() else {
            return String::new();
        };
        let mut len = first.len();
        for text in texts {
            len = first
                .bytes()
                .zip(text.bytes())
                .take(len)
                .take_while(|(a, b)| a.to_ascii_lowercase() == b.to_ascii_lowercase())
                .count()
                .min(len);
        }
        first[..len].to_string()
    }
}
