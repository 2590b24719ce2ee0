//! Match store and pipeline: arena-backed match records with dual-end
//! allocation, and the four-stage `reset -> generate -> fill_info ->
//! select+coalesce -> sort` pipeline the kernel drives on every keystroke
//! that changes the completion fingerprint.

mod store;

pub use store::{ARENA_CAP, MatchStore, StoreId};

/// Case-sensitivity policy for `select`, an ambient value scoped by
/// the kernel for the duration of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComparePolicy {
    Exact,
    #[default]
    Caseless,
    /// Caseless plus `-` <-> `_` equivalence.
    Relaxed,
}

fn normalize_byte(b: u8, policy: ComparePolicy) -> u8 {
    match policy {
        ComparePolicy::Exact => b,
        ComparePolicy::Caseless => b.to_ascii_lowercase(),
        ComparePolicy::Relaxed => {
            let b = b.to_ascii_lowercase();
            if b == b'_' { b'-' } else { b }
        }
    }
}

fn is_prefix(haystack: &str, needle: &str, policy: ComparePolicy) -> bool {
    if needle.len() > haystack.len() {
        return false;
    }
    haystack
        .as_bytes()
        .iter()
        .zip(needle.as_bytes())
        .all(|(&h, &n)| normalize_byte(h, policy) == normalize_byte(n, policy))
}

fn compare_caseless(a: &str, b: &str) -> std::cmp::Ordering {
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}

/// One completion candidate handed to the builder by a generator. Owned
/// strings since the generator typically builds these on the fly (a
/// filesystem entry, a history line, a script return value).
#[derive(Debug, Clone, Default)]
pub struct RawMatch {
    pub text: String,
    pub displayable: Option<String>,
    pub aux: Option<String>,
    /// `None` means "derive from word delimiters".
    pub suffix: Option<u8>,
}

impl RawMatch {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            displayable: None,
            aux: None,
            suffix: None,
        }
    }
}

/// A stored match record: ids into the arena plus cached display metadata.
#[derive(Debug, Clone, Copy)]
pub struct MatchInfo {
    pub store_id: StoreId,
    pub displayable_id: Option<StoreId>,
    pub aux_id: Option<StoreId>,
    pub cell_count: u16,
    pub suffix: Option<u8>,
    pub select: bool,
}

/// Handle generators use to add candidates during `generate`.
pub struct MatchBuilder<'a> {
    store: &'a mut MatchStore,
    infos: &'a mut Vec<MatchInfo>,
}

impl MatchBuilder<'_> {
    /// Store one candidate. Returns `false` on arena exhaustion: the
    /// generator should stop adding matches but may still return normally.
    pub fn add_match(&mut self, m: RawMatch) -> bool {
        let Some(store_id) = self.store.push_front(&m.text) else {
            tracing::trace!(target: "matches", remaining = self.store.remaining(), "arena exhausted, dropping match");
            return false;
        };
        let displayable_id = match &m.displayable {
            Some(text) => match self.store.push_back(text) {
                Some(id) => Some(id),
                None => {
                    tracing::trace!(target: "matches", "arena exhausted on displayable text");
                    return false;
                }
            },
            None => None,
        };
        let aux_id = match &m.aux {
            Some(text) => match self.store.push_back(text) {
                Some(id) => Some(id),
                None => {
                    tracing::trace!(target: "matches", "arena exhausted on aux text");
                    return false;
                }
            },
            None => None,
        };
        self.infos.push(MatchInfo {
            store_id,
            displayable_id,
            aux_id,
            cell_count: 0,
            suffix: m.suffix,
            select: false,
        });
        true
    }
}

/// A source of match candidates. The scripted generator (out of scope
/// here, see `clink-script`) is one implementor among filesystem/history/
/// alias generators.
pub trait MatchGenerator {
    /// Populate `builder` with candidates for `line`. Returning `true`
    /// stops the generator chain.
    fn generate(&mut self, line: &str, builder: &mut MatchBuilder) -> bool;

    /// How many leading bytes of the end-word this generator considers a
    /// fixed prefix.
    fn get_prefix_length(&mut self, line: &str) -> u32;

    /// Whether this generator's matches already embed the current word
    /// prefix, so the pipeline should not re-prepend it.
    fn prefix_included(&self) -> bool {
        false
    }
}

/// Owns the arena and the parallel info vector; drives the four pipeline
/// stages in the order the kernel calls them from `update_internal`.
#[derive(Default)]
pub struct MatchPipeline {
    store: MatchStore,
    infos: Vec<MatchInfo>,
    selected_count: usize,
    prefix_included: bool,
}

impl MatchPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn infos(&self) -> &[MatchInfo] {
        &self.infos
    }

    /// The prefix `[0, selected_count())` of `infos()` after `coalesce`.
    pub fn selected_count(&self) -> usize {
        self.selected_count
    }

    pub fn store(&self) -> &MatchStore {
        &self.store
    }

    pub fn text_of(&self, info: &MatchInfo) -> &str {
        self.store.get(info.store_id)
    }

    pub fn displayable_of(&self, info: &MatchInfo) -> &str {
        match info.displayable_id {
            Some(id) => self.store.get(id),
            None => self.store.get(info.store_id),
        }
    }

    /// Stage 1: clear the info vector and both arena ends.
    pub fn reset(&mut self) {
        self.store.reset();
        self.infos.clear();
        self.selected_count = 0;
        self.prefix_included = false;
    }

    /// Stage 2: invoke generators in order, stopping at the first whose
    /// `generate` returns `true`.
    pub fn generate(&mut self, line: &str, generators: &mut [Box<dyn MatchGenerator>]) {
        for generator in generators.iter_mut() {
            let mut builder = MatchBuilder {
                store: &mut self.store,
                infos: &mut self.infos,
            };
            let stop = generator.generate(line, &mut builder);
            if stop {
                self.prefix_included = generator.prefix_included();
                return;
            }
        }
    }

    pub fn prefix_included(&self) -> bool {
        self.prefix_included
    }

    /// Stage 3: precompute `cell_count` per match from its displayable
    /// form (or the match text itself when there is none).
    pub fn fill_info(&mut self) {
        for info in &mut self.infos {
            let text = match info.displayable_id {
                Some(id) => self.store.get(id),
                None => self.store.get(info.store_id),
            };
            info.cell_count = clink_text::str_cell_count(text) as u16;
        }
    }

    /// Stage 4a: flag every match whose text is a `needle` prefix under
    /// `policy`.
    pub fn select(&mut self, needle: &str, policy: ComparePolicy) {
        for info in &mut self.infos {
            let text = self.store.get(info.store_id);
            info.select = is_prefix(text, needle, policy);
        }
    }

    /// Stage 4b: stable-partition so selected entries occupy the prefix
    /// `[0, selected_count())`, preserving relative order within each
    /// partition.
    pub fn coalesce(&mut self) -> usize {
        self.infos.sort_by_key(|info| !info.select);
        self.selected_count = self.infos.iter().filter(|info| info.select).count();
        self.selected_count
    }

    /// Stage 5: case-insensitive lexicographic sort of the selected
    /// prefix.
    pub fn sort(&mut self) {
        let count = self.selected_count;
        let store = &self.store;
        self.infos[..count].sort_by(|a, b| compare_caseless(store.get(a.store_id), store.get(b.store_id)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct FixedGenerator {
        matches: Vec<RawMatch>,
        prefix_len: u32,
    }

    impl MatchGenerator for FixedGenerator {
        fn generate(&mut self, _line: &str, builder: &mut MatchBuilder) -> bool {
            for m in self.matches.drain(..) {
                builder.add_match(m);
            }
            true
        }
        fn get_prefix_length(&mut self, _line: &str) -> u32 {
            self.prefix_len
        }
    }

    fn generators(matches: Vec<&str>) -> Vec<Box<dyn MatchGenerator>> {
        vec![Box::new(FixedGenerator {
            matches: matches.into_iter().map(RawMatch::new).collect(),
            prefix_len: 0,
        })]
    }

    #[test]
    fn full_pipeline_selects_and_sorts_matching_prefix() {
        let mut pipeline = MatchPipeline::new();
        pipeline.reset();
        let mut gens = generators(vec!["git-status", "git-commit", "grep"]);
        pipeline.generate("git-", &mut gens);
        pipeline.fill_info();
        pipeline.select("git-", ComparePolicy::Caseless);
        let selected = pipeline.coalesce();
        assert_eq!(selected, 2);
        pipeline.sort();

        let names: Vec<&str> = pipeline.infos()[..selected]
            .iter()
            .map(|info| pipeline.text_of(info))
            .collect();
        assert_eq!(names, vec!["git-commit", "git-status"]);
    }

    #[test]
    fn relaxed_policy_treats_dash_and_underscore_as_equivalent() {
        let mut pipeline = MatchPipeline::new();
        pipeline.reset();
        let mut gens = generators(vec!["foo_bar", "foobar"]);
        pipeline.generate("x", &mut gens);
        pipeline.fill_info();
        pipeline.select("foo-bar", ComparePolicy::Relaxed);
        let selected = pipeline.coalesce();
        assert_eq!(selected, 1);
        assert_eq!(pipeline.text_of(&pipeline.infos()[0]), "foo_bar");
    }

    #[test]
    fn cell_count_uses_displayable_form_when_present() {
        let mut pipeline = MatchPipeline::new();
        pipeline.reset();
        let mut gens: Vec<Box<dyn MatchGenerator>> = vec![Box::new(FixedGenerator {
            matches: vec![RawMatch {
                text: "字字".into(),
                displayable: Some("ab".into()),
                aux: None,
                suffix: None,
            }],
            prefix_len: 0,
        })];
        pipeline.generate("x", &mut gens);
        pipeline.fill_info();
        assert_eq!(pipeline.infos()[0].cell_count, 2);
    }

    #[test]
    fn add_match_returns_false_once_arena_is_exhausted() {
        let mut store = MatchStore::new();
        let mut infos = Vec::new();
        let mut builder = MatchBuilder {
            store: &mut store,
            infos: &mut infos,
        };
        let huge = "a".repeat(ARENA_CAP);
        assert!(!builder.add_match(RawMatch::new(huge)));
    }

    #[test]
    fn generator_chain_stops_at_first_true() {
        struct NeverCalled;
        impl MatchGenerator for NeverCalled {
            fn generate(&mut self, _line: &str, _builder: &mut MatchBuilder) -> bool {
                panic!("should not be invoked");
            }
            fn get_prefix_length(&mut self, _line: &str) -> u32 {
                0
            }
        }

        let mut pipeline = MatchPipeline::new();
        pipeline.reset();
        let mut gens: Vec<Box<dyn MatchGenerator>> = vec![
            Box::new(FixedGenerator {
                matches: vec![RawMatch::new("only")],
                prefix_len: 0,
            }),
            Box::new(NeverCalled),
        ];
        pipeline.generate("x", &mut gens);
        assert_eq!(pipeline.infos().len(), 1);
    }
}
