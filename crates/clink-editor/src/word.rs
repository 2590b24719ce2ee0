//! Word tokenisation: splits a line into commands and commands into words
//! under three configured delimiter sets.

use clink_matches::MatchGenerator;

/// The three delimiter sets a host shell supplies, e.g.
/// `quote_pair = "\""`, `command_delims = "&|"`, `word_delims = " \t<>=;"`.
#[derive(Debug, Clone)]
pub struct TokenizeConfig {
    pub command_delims: String,
    pub word_delims: String,
    pub quote_open: char,
    pub quote_close: char,
}

impl Default for TokenizeConfig {
    fn default() -> Self {
        Self {
            command_delims: "&|".to_string(),
            word_delims: " \t<>=;".to_string(),
            quote_open: '"',
            quote_close: '"',
        }
    }
}

/// One tokenised word: byte offset/length into the line, whether it
/// was quoted (quotes already stripped from offset/length), and the
/// delimiter byte that preceded it (0 for the first word).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Word {
    pub offset: u32,
    pub length: u32,
    pub quoted: bool,
    pub delim: u8,
}

impl Word {
    pub fn end(&self) -> usize {
        self.offset as usize + self.length as usize
    }
}

/// Read-only snapshot of one editing frame, handed to modules and
/// generators. Owned rather than borrowed from the live buffer: a module
/// handling this frame also holds a mutable reference to that same buffer
/// (via [`Context`](crate::Context)), so the snapshot can't alias it.
#[derive(Debug, Clone)]
pub struct LineState {
    pub line: String,
    pub cursor: usize,
    pub command_offset: usize,
    pub words: Vec<Word>,
}

impl LineState {
    pub fn word(&self, index: usize) -> Option<&str> {
        let w = *self.words.get(index)?;
        self.line.get(w.offset as usize..w.end())
    }

    pub fn end_word(&self) -> Option<(&str, Word)> {
        let w = *self.words.last()?;
        Some((self.line.get(w.offset as usize..w.end())?, w))
    }
}

/// Token span before quote-stripping: byte range plus the delimiter that
/// terminated it (consumed, not included in the span).
struct RawToken {
    start: usize,
    end: usize,
    delim: u8,
}

/// Splits `s` on any byte in `delims`, treating a run opened by
/// `quote_open` as transparent to delimiters until the matching
/// `quote_close` (or end of input). Delimiters are consumed and not part
/// of any token.
fn tokenize(s: &str, delims: &str, quote_open: char, quote_close: char) -> Vec<RawToken> {
    let bytes = s.as_bytes();
    let delims = delims.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut pending_delim = 0u8;

    while i < bytes.len() {
        let b = bytes[i];
        if delims.contains(&b) {
            pending_delim = b;
            i += 1;
            continue;
        }

        let start = i;
        let delim = pending_delim;
        pending_delim = 0;
        let mut in_quote = b == quote_open as u8;
        i += 1;
        while i < bytes.len() {
            let b = bytes[i];
            if in_quote {
                i += 1;
                if b == quote_close as u8 {
                    in_quote = false;
                }
                continue;
            }
            if delims.contains(&b) {
                break;
            }
            if b == quote_open as u8 {
                in_quote = true;
            }
            i += 1;
        }
        tokens.push(RawToken { start, end: i, delim });
    }

    tokens
}

/// Locates the start of the last command before `cursor`: the
/// command immediately preceding the cursor, split on `command_delims`. A
/// trailing delimiter with nothing after it yields an empty command at
/// `cursor`.
pub fn find_command_bounds(line: &str, cursor: usize, config: &TokenizeConfig) -> usize {
    let prefix = &line[..cursor];
    let tokens = tokenize(
        prefix,
        &config.command_delims,
        config.quote_open,
        config.quote_close,
    );
    match tokens.last() {
        Some(t) if t.end == cursor => t.start,
        _ => cursor,
    }
}

/// Tokenises the current command into words. `generators` are
/// consulted only to clamp the end-word's length to the longest declared
/// fixed prefix.
pub fn collect_words(
    line: &str,
    cursor: usize,
    command_offset: usize,
    config: &TokenizeConfig,
    generators: &mut [Box<dyn MatchGenerator>],
) -> Vec<Word> {
    let segment = &line[command_offset..cursor];
    let raw = tokenize(
        segment,
        &config.word_delims,
        config.quote_open,
        config.quote_close,
    );

    let mut words: Vec<Word> = raw
        .into_iter()
        .map(|t| Word {
            offset: (command_offset + t.start) as u32,
            length: (t.end - t.start) as u32,
            quoted: false,
            delim: t.delim,
        })
        .collect();

    let needs_trailing = match words.last() {
        Some(w) => w.end() < cursor,
        None => true,
    };
    if needs_trailing {
        let delim = if cursor > 0 {
            line.as_bytes()[cursor - 1]
        } else {
            0
        };
        words.push(Word {
            offset: cursor as u32,
            length: 0,
            quoted: false,
            delim,
        });
    }

    for w in &mut words {
        let start = w.offset as usize;
        let len = w.length as usize;
        if len == 0 {
            continue;
        }
        let bytes = line.as_bytes();
        let mut new_start = start;
        let mut new_len = len;
        if bytes[new_start] == config.quote_open as u8 {
            new_start += 1;
            new_len -= 1;
            w.quoted = true;
        }
        if new_len > 0 && bytes[new_start + new_len - 1] == config.quote_close as u8 {
            new_len -= 1;
            w.quoted = true;
        }
        w.offset = new_start as u32;
        w.length = new_len as u32;
    }

    if let Some(last) = words.last_mut() {
        let text = &line[last.offset as usize..last.end()];
        let max_prefix = generators
            .iter_mut()
            .map(|g| g.get_prefix_length(text))
            .max()
            .unwrap_or(0);
        last.length = last.length.min(max_prefix);
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use clink_matches::MatchBuilder;

    struct FixedPrefix(u32);
    impl MatchGenerator for FixedPrefix {
        fn generate(&mut self, _line: &str, _builder: &mut MatchBuilder) -> bool {
            false
        }
        fn get_prefix_length(&mut self, _line: &str) -> u32 {
            self.0
        }
    }

    #[test]
    fn splits_simple_words_on_space() {
        let config = TokenizeConfig::default();
        let words = collect_words("git checkout main", 18, 0, &config, &mut []);
        assert_eq!(words.len(), 3);
        assert_eq!(&"git checkout main"[words[0].offset as usize..words[0].end()], "git");
        assert_eq!(&"git checkout main"[words[2].offset as usize..words[2].end()], "main");
    }

    #[test]
    fn appends_empty_trailing_word_past_last_delimiter() {
        let config = TokenizeConfig::default();
        let line = "git checkout ";
        let words = collect_words(line, line.len(), 0, &config, &mut []);
        let last = words.last().unwrap();
        assert_eq!(last.length, 0);
        assert_eq!(last.delim, b' ');
    }

    #[test]
    fn quoted_word_strips_quotes_and_sets_flag() {
        let config = TokenizeConfig::default();
        let line = r#"cat "my file.txt""#;
        let words = collect_words(line, line.len(), 0, &config, &mut []);
        let last = words.last().unwrap();
        assert!(last.quoted);
        assert_eq!(&line[last.offset as usize..last.end()], "my file.txt");
    }

    #[test]
    fn command_delims_isolate_the_last_command() {
        let config = TokenizeConfig::default();
        let line = "echo hi && git stat";
        let cursor = line.len();
        let command_offset = find_command_bounds(line, cursor, &config);
        assert_eq!(&line[command_offset..cursor], "git stat");
        let words = collect_words(line, cursor, command_offset, &config, &mut []);
        assert_eq!(words.len(), 2);
    }

    #[test]
    fn end_word_length_is_clamped_to_declared_generator_prefix() {
        let config = TokenizeConfig::default();
        let line = "--foo=bar";
        let mut generators: Vec<Box<dyn MatchGenerator>> = vec![Box::new(FixedPrefix(4))];
        let words = collect_words(line, line.len(), 0, &config, &mut generators);
        let last = words.last().unwrap();
        assert_eq!(last.length, 4);
    }

    #[test]
    fn trailing_command_delim_yields_empty_command_at_cursor() {
        let config = TokenizeConfig::default();
        let line = "echo hi &";
        let cursor = line.len();
        let command_offset = find_command_bounds(line, cursor, &config);
        assert_eq!(command_offset, cursor);
    }
}
