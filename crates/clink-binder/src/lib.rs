//! Chorded key-binding trie: `Binder` stores `(group, key-sequence) ->
//! (module, id)` bindings in a fixed arena; `BindResolver` streams bytes
//! through the trie and yields matching bindings.

use smallvec::SmallVec;
use thiserror::Error;
use tracing::trace;

pub const MAX_NODES: usize = 512;
pub const MAX_MODULES: usize = 64;
pub const MAX_DEPTH: u8 = 15;
pub const RING_CAP: usize = 8;

pub type ModuleId = u8;
pub type BindId = u8;
pub type GroupId = usize;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BindError {
    #[error("bad chord syntax")]
    BadChordSyntax,
    #[error("bind table is full")]
    BindTableFull,
    #[error("module table is full")]
    ModuleTableFull,
    #[error("unknown group")]
    UnknownGroup,
}

/// Translate chord syntax into the raw byte sequence it represents.
///
/// `\C-x` -> ctrl-x, `\M-x` -> esc,x, `^x` -> ctrl-x, `\M-C-x` -> esc,ctrl-x,
/// and the named escapes `\e` `\t` `\n` `\r` `\0`. Anything else passes
/// through as literal UTF-8 bytes.
pub fn translate_chord(chord: &str) -> Result<Vec<u8>, BindError> {
    let chars: Vec<char> = chord.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '^' {
            if i + 1 >= chars.len() {
                return Err(BindError::BadChordSyntax);
            }
            out.push(ctrl_byte(chars[i + 1])?);
            i += 2;
        } else if c == '\\' {
            if i + 1 >= chars.len() {
                return Err(BindError::BadChordSyntax);
            }
            match chars[i + 1] {
                'e' => {
                    out.push(0x1b);
                    i += 2;
                }
                't' => {
                    out.push(0x09);
                    i += 2;
                }
                'n' => {
                    out.push(0x0a);
                    i += 2;
                }
                'r' => {
                    out.push(0x0d);
                    i += 2;
                }
                '0' => {
                    out.push(0x00);
                    i += 2;
                }
                'M' => {
                    if i + 2 >= chars.len() || chars[i + 2] != '-' {
                        return Err(BindError::BadChordSyntax);
                    }
                    let j = i + 3;
                    if j >= chars.len() {
                        return Err(BindError::BadChordSyntax);
                    }
                    out.push(0x1b);
                    if chars[j] == 'C' {
                        if j + 1 >= chars.len() || chars[j + 1] != '-' {
                            return Err(BindError::BadChordSyntax);
                        }
                        if j + 2 >= chars.len() {
                            return Err(BindError::BadChordSyntax);
                        }
                        out.push(ctrl_byte(chars[j + 2])?);
                        i = j + 3;
                    } else {
                        let mut buf = [0u8; 4];
                        out.extend_from_slice(chars[j].encode_utf8(&mut buf).as_bytes());
                        i = j + 1;
                    }
                }
                'C' => {
                    if i + 2 >= chars.len() || chars[i + 2] != '-' {
                        return Err(BindError::BadChordSyntax);
                    }
                    if i + 3 >= chars.len() {
                        return Err(BindError::BadChordSyntax);
                    }
                    out.push(ctrl_byte(chars[i + 3])?);
                    i += 4;
                }
                _ => return Err(BindError::BadChordSyntax),
            }
        } else {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            i += 1;
        }
    }
    if out.is_empty() {
        return Err(BindError::BadChordSyntax);
    }
    Ok(out)
}

fn ctrl_byte(c: char) -> Result<u8, BindError> {
    if c.is_ascii() {
        Ok((c as u8) & 0x1f)
    } else {
        Err(BindError::BadChordSyntax)
    }
}

#[derive(Debug, Clone, Copy)]
struct BindNode {
    key: u8,
    id: BindId,
    module: ModuleId,
    bound: bool,
    depth: u8,
    next: Option<u16>,
    child: Option<u16>,
}

impl BindNode {
    fn new(key: u8, depth: u8) -> Self {
        Self {
            key,
            id: 0,
            module: 0,
            bound: false,
            depth,
            next: None,
            child: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Group {
    root: Option<u16>,
}

/// A `(module, id)` pair yielded by the resolver, together with the depth
/// and raw bytes of the chord that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub module: ModuleId,
    pub id: BindId,
    pub depth: u8,
    pub chord: Vec<u8>,
}

/// Arena-backed chord trie. Up to [`MAX_NODES`] nodes across all groups, up
/// to [`MAX_MODULES`] registered module names.
pub struct Binder {
    nodes: Vec<BindNode>,
    groups: Vec<Group>,
    modules: Vec<String>,
}

impl Default for Binder {
    fn default() -> Self {
        Self::new()
    }
}

impl Binder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            groups: vec![Group::default()],
            modules: Vec::new(),
        }
    }

    pub fn default_group(&self) -> GroupId {
        0
    }

    pub fn add_group(&mut self) -> GroupId {
        self.groups.push(Group::default());
        self.groups.len() - 1
    }

    pub fn register_module(&mut self, name: &str) -> Result<ModuleId, BindError> {
        if let Some(pos) = self.modules.iter().position(|m| m == name) {
            return Ok(pos as ModuleId);
        }
        if self.modules.len() >= MAX_MODULES {
            return Err(BindError::ModuleTableFull);
        }
        self.modules.push(name.to_string());
        Ok((self.modules.len() - 1) as ModuleId)
    }

    fn alloc_node(&mut self, key: u8, depth: u8) -> Result<u16, BindError> {
        if self.nodes.len() >= MAX_NODES {
            return Err(BindError::BindTableFull);
        }
        let idx = self.nodes.len() as u16;
        self.nodes.push(BindNode::new(key, depth));
        Ok(idx)
    }

    /// Bind `chord` (already in chord syntax) within `group` to
    /// `(module, id)`. Existing prefixes are shared; an identical exact
    /// duplicate is idempotent; a distinct binding to an already-bound exact
    /// chord is appended as a sibling so both are yielded by the resolver.
    pub fn bind(
        &mut self,
        group: GroupId,
        chord: &str,
        module: ModuleId,
        id: BindId,
    ) -> Result<(), BindError> {
        let bytes = translate_chord(chord)?;
        if group >= self.groups.len() {
            return Err(BindError::UnknownGroup);
        }
        let depth_cap = bytes.len().min(MAX_DEPTH as usize);
        let mut head = self.groups[group].root;
        let mut owner_is_root = true;
        let mut owner_node: Option<u16> = None;

        for (i, &b) in bytes.iter().take(depth_cap).enumerate() {
            let depth = (i + 1) as u8;
            let mut cur = head;
            let mut last_sibling = None;
            let mut found = None;
            while let Some(idx) = cur {
                if self.nodes[idx as usize].key == b {
                    found = Some(idx);
                    break;
                }
                last_sibling = Some(idx);
                cur = self.nodes[idx as usize].next;
            }
            let node_idx = match found {
                Some(idx) => idx,
                None => {
                    let idx = self.alloc_node(b, depth)?;
                    if let Some(last) = last_sibling {
                        self.nodes[last as usize].next = Some(idx);
                    } else if owner_is_root {
                        self.groups[group].root = Some(idx);
                    } else if let Some(owner) = owner_node {
                        self.nodes[owner as usize].child = Some(idx);
                    }
                    idx
                }
            };

            if depth as usize == depth_cap {
                let node = &mut self.nodes[node_idx as usize];
                if node.bound {
                    if node.module == module && node.id == id {
                        return Ok(());
                    }
                    drop(node);
                    let sib_next = self.nodes[node_idx as usize].next;
                    let new_idx = self.alloc_node(b, depth)?;
                    let new_node = &mut self.nodes[new_idx as usize];
                    new_node.bound = true;
                    new_node.module = module;
                    new_node.id = id;
                    new_node.next = sib_next;
                    self.nodes[node_idx as usize].next = Some(new_idx);
                } else {
                    node.bound = true;
                    node.module = module;
                    node.id = id;
                }
                trace!(target: "binder", group, depth, "bound");
            } else {
                head = self.nodes[node_idx as usize].child;
                owner_is_root = false;
                owner_node = Some(node_idx);
            }
        }
        Ok(())
    }
}

/// Streaming resolver over a [`Binder`]'s trie: feed bytes with [`step`],
/// enumerate matching bindings with [`next`], and advance past a consumed
/// chord with [`claim`].
///
/// [`step`]: BindResolver::step
/// [`next`]: BindResolver::next
/// [`claim`]: BindResolver::claim
pub struct BindResolver {
    group: GroupId,
    level: Option<u16>,
    ring: SmallVec<[u8; RING_CAP]>,
    tail: usize,
    chord_start: usize,
    yield_cursor: Option<u16>,
    yield_byte: u8,
    pending_input: bool,
}

impl BindResolver {
    pub fn new(group: GroupId) -> Self {
        Self {
            group,
            level: None,
            ring: SmallVec::new(),
            tail: 0,
            chord_start: 0,
            yield_cursor: None,
            yield_byte: 0,
            pending_input: false,
        }
    }

    pub fn set_group(&mut self, group: GroupId) {
        self.group = group;
        self.reset_walk();
        self.pending_input = true;
    }

    pub fn pending_input(&self) -> bool {
        self.pending_input
    }

    fn reset_walk(&mut self) {
        self.level = None;
        self.yield_cursor = None;
    }

    fn reset_all(&mut self) {
        self.reset_walk();
        self.ring.clear();
        self.tail = 0;
    }

    /// Feed one byte. Returns `true` when the byte reached a node with no
    /// further children (a leaf), a hint that the caller has likely
    /// finished a chord and should call [`next`](Self::next).
    pub fn step(&mut self, binder: &Binder, byte: u8) -> bool {
        if self.ring.len() - self.tail >= RING_CAP {
            trace!(target: "binder", "resolver ring overflow, resetting");
            self.reset_all();
            return false;
        }
        self.ring.push(byte);

        // `level` is `None` both at a fresh chord start and right after a
        // true leaf (no children) — in both cases the next byte begins a
        // new chord, so fall back to the group's root.
        let head = match self.level {
            Some(_) => self.level,
            None => {
                self.chord_start = self.ring.len() - 1;
                binder.groups.get(self.group).and_then(|g| g.root)
            }
        };

        let mut cur = head;
        let mut matched = None;
        let mut wildcard = None;
        while let Some(idx) = cur {
            let node = &binder.nodes[idx as usize];
            if node.key == byte && matched.is_none() {
                matched = Some(idx);
            } else if node.key == 0 && wildcard.is_none() {
                wildcard = Some(idx);
            }
            cur = node.next;
        }
        let found = matched.or(wildcard);
        match found {
            Some(idx) => {
                self.yield_cursor = found;
                self.yield_byte = byte;
                let node = &binder.nodes[idx as usize];
                self.level = node.child;
                node.child.is_none()
            }
            None => {
                trace!(target: "binder", byte, "no binding at this depth");
                self.reset_walk();
                self.yield_cursor = None;
                false
            }
        }
    }

    /// Enumerate bound nodes matching the most recently stepped byte
    /// (exact key match, or a wildcard `key == 0` catch-all). Returns
    /// `None` once exhausted.
    pub fn next(&mut self, binder: &Binder) -> Option<Binding> {
        while let Some(idx) = self.yield_cursor {
            let node = binder.nodes[idx as usize];
            self.yield_cursor = node.next;
            if (node.key == self.yield_byte || node.key == 0) && node.bound {
                let chord = self.ring[self.chord_start..].to_vec();
                return Some(Binding {
                    module: node.module,
                    id: node.id,
                    depth: node.depth,
                    chord,
                });
            }
        }
        None
    }

    /// Mark the most recently yielded binding's bytes as consumed: advance
    /// the tail past them and reset the trie walk to the group root so the
    /// next `step` starts a fresh chord.
    pub fn claim(&mut self, depth: u8) {
        self.tail += depth as usize;
        if self.tail >= self.ring.len() {
            self.ring.clear();
            self.tail = 0;
        }
        self.reset_walk();
        self.pending_input = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn translate_named_escapes() {
        assert_eq!(translate_chord("\\e").unwrap(), vec![0x1b]);
        assert_eq!(translate_chord("\\t").unwrap(), vec![0x09]);
        assert_eq!(translate_chord("\\n").unwrap(), vec![0x0a]);
        assert_eq!(translate_chord("\\r").unwrap(), vec![0x0d]);
        assert_eq!(translate_chord("\\0").unwrap(), vec![0x00]);
    }

    #[test]
    fn translate_ctrl_forms() {
        assert_eq!(translate_chord("\\C-x").unwrap(), vec![b'x' & 0x1f]);
        assert_eq!(translate_chord("^x").unwrap(), vec![b'x' & 0x1f]);
    }

    #[test]
    fn translate_meta_forms() {
        assert_eq!(translate_chord("\\M-x").unwrap(), vec![0x1b, b'x']);
        assert_eq!(
            translate_chord("\\M-C-x").unwrap(),
            vec![0x1b, b'x' & 0x1f]
        );
    }

    #[test]
    fn translate_invalid_forms_all_fail() {
        for bad in ["\\C", "\\Cx", "\\C-", "\\M", "\\Mx", "\\M-", "\\M-C-"] {
            assert!(translate_chord(bad).is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn chord_round_trip() {
        let mut binder = Binder::new();
        let g = binder.default_group();
        binder.bind(g, "\\C-x", 1, 42).unwrap();
        let bytes = translate_chord("\\C-x").unwrap();
        let mut resolver = BindResolver::new(g);
        let mut leaf = false;
        for &b in &bytes {
            leaf = resolver.step(&binder, b);
        }
        assert!(leaf);
        let binding = resolver.next(&binder).unwrap();
        assert_eq!((binding.module, binding.id), (1, 42));
    }

    #[test]
    fn resolver_tail_replay() {
        let mut binder = Binder::new();
        let g = binder.default_group();
        binder.bind(g, "\\e[1;2A", 1, 1).unwrap();
        binder.bind(g, "\\e[1;2A\\e[1;2A", 1, 2).unwrap();

        let prefix = translate_chord("\\e[1;2A").unwrap();
        let mut resolver = BindResolver::new(g);
        for &b in &prefix {
            resolver.step(&binder, b);
        }
        let first = resolver.next(&binder).unwrap();
        assert_eq!(first.id, 1);
        resolver.claim(first.depth);

        for &b in &prefix {
            resolver.step(&binder, b);
        }
        let second = resolver.next(&binder).unwrap();
        assert_eq!(second.id, 2);
    }

    #[test]
    fn duplicate_exact_chord_is_idempotent() {
        let mut binder = Binder::new();
        let g = binder.default_group();
        binder.bind(g, "a", 1, 1).unwrap();
        binder.bind(g, "a", 1, 1).unwrap();
        assert_eq!(binder.nodes.len(), 1);
    }

    #[test]
    fn distinct_binding_on_same_chord_is_yielded_alongside() {
        let mut binder = Binder::new();
        let g = binder.default_group();
        binder.bind(g, "a", 1, 1).unwrap();
        binder.bind(g, "a", 2, 7).unwrap();

        let mut resolver = BindResolver::new(g);
        resolver.step(&binder, b'a');
        let first = resolver.next(&binder).unwrap();
        let second = resolver.next(&binder).unwrap();
        assert_eq!((first.module, first.id), (1, 1));
        assert_eq!((second.module, second.id), (2, 7));
        assert!(resolver.next(&binder).is_none());
    }

    #[test]
    fn unbound_byte_yields_no_binding() {
        let mut binder = Binder::new();
        let g = binder.default_group();
        binder.bind(g, "a", 1, 1).unwrap();
        let mut resolver = BindResolver::new(g);
        resolver.step(&binder, b'z');
        assert!(resolver.next(&binder).is_none());
    }

    #[test]
    fn module_table_full_after_max_modules() {
        let mut binder = Binder::new();
        for i in 0..MAX_MODULES {
            binder.register_module(&format!("module{i}")).unwrap();
        }
        assert_eq!(
            binder.register_module("one_too_many"),
            Err(BindError::ModuleTableFull)
        );
    }

    fn base26(mut n: usize, width: usize) -> String {
        let mut s = vec!['a'; width];
        for slot in s.iter_mut().rev() {
            *slot = (b'a' + (n % 26) as u8) as char;
            n /= 26;
        }
        s.into_iter().collect()
    }

    #[test]
    fn bind_table_full_when_nodes_exhausted() {
        let mut binder = Binder::new();
        let g = binder.default_group();
        let mut last = Ok(());
        for i in 0..20_000 {
            let chord = base26(i, 3);
            last = binder.bind(g, &chord, 1, 1);
            if last.is_err() {
                break;
            }
        }
        assert_eq!(last, Err(BindError::BindTableFull));
    }

    use proptest::prelude::*;

    proptest! {
        // Chord round-trip: for every accepted chord syntax `s`, after
        // `bind(g, s, m, id)` and feeding the translated bytes of `s` into
        // the resolver seeded on group `g`, the first binding yielded has
        // `(module=m, id=id)`. Generated over plain lowercase-letter
        // chords (no `^`/`\\`) so every generated string is accepted
        // chord syntax; the escape forms are covered exhaustively by the
        // `translate_*` tests above.
        #[test]
        fn chord_round_trip_holds_for_arbitrary_plain_chords(
            chord in "[a-z]{1,6}",
            module in any::<ModuleId>(),
            id in any::<BindId>(),
        ) {
            let mut binder = Binder::new();
            let g = binder.default_group();
            binder.bind(g, &chord, module, id).unwrap();

            let bytes = translate_chord(&chord).unwrap();
            let mut resolver = BindResolver::new(g);
            let mut leaf = false;
            for &b in &bytes {
                leaf = resolver.step(&binder, b);
            }
            prop_assert!(leaf);
            let binding = resolver.next(&binder).unwrap();
            prop_assert_eq!((binding.module, binding.id), (module, id));
        }
    }
}
