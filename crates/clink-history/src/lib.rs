//! Persistent, multi-session command history: up to two banks per process
//! (an always-open master plus a per-session bank unless `history.shared`),
//! advisory-locked for cross-process safety, with tombstone deletion and a
//! startup reap that folds abandoned sessions into the master.
//!
//! `HistoryDb::expand` isn't implemented here: bash-style `!`-expansion
//! syntax (`!!`, `!42`, `:p`, `:s/a/b/`, ...) is GNU Readline's engine, not
//! this crate's own code. This crate owns the one piece of that story that
//! is ours: [`history_expand_control`], the quote-aware inhibit callback
//! Readline consults before expanding a `!`.

mod bank;
mod expand;
mod line_id;

pub use clink_config::{DupeMode, ExpandMode};
pub use expand::{QuoteState, history_expand_control, inhibits_expansion};
pub use line_id::LineId;

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use fs2::FileExt;

use bank::{LineIter, ReadLock, WriteLock};

/// A line longer than this is silently truncated on `add`.
pub const MAX_LINE_LENGTH: usize = 8192;

const MASTER_FILE: &str = "clink_history";
const BANK_PREFIX: &str = "clink_history_";

const BANK_MASTER: u8 = 0;
const BANK_SESSION: u8 = 1;

/// Settings that shape how `HistoryDb` persists and dedupes lines.
#[derive(Debug, Clone, Copy)]
pub struct HistoryOptions {
    pub shared: bool,
    pub ignore_space: bool,
    pub dupe_mode: DupeMode,
    pub expand_mode: ExpandMode,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            shared: false,
            ignore_space: true,
            dupe_mode: DupeMode::ErasePrev,
            expand_mode: ExpandMode::NotQuoted,
        }
    }
}

fn bank_path(state_dir: &Path, session_id: &str) -> PathBuf {
    state_dir.join(format!("{BANK_PREFIX}{session_id}"))
}

fn alive_path(state_dir: &Path, session_id: &str) -> PathBuf {
    state_dir.join(format!("{BANK_PREFIX}{session_id}~"))
}

/// A session is abandoned when nobody holds an exclusive lock on its alive
/// marker: a live `HistoryDb` keeps that lock for its entire lifetime, so a
/// successful `try_lock_exclusive` here means the owning process (or its
/// file descriptor) is gone — a portable stand-in for Windows
/// delete-on-close detection. Fold such a bank into `master`, then delete
/// both files. `exclude_session_id` is the caller's own id, skipped so a
/// session never reaps itself while still running.
fn reap(state_dir: &Path, master: &File, exclude_session_id: Option<&str>) -> io::Result<()> {
    let entries = match fs::read_dir(state_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy().into_owned();
        if !name.starts_with(BANK_PREFIX) || name.ends_with('~') {
            continue;
        }
        let session_id = &name[BANK_PREFIX.len()..];
        if Some(session_id) == exclude_session_id {
            continue;
        }

        let alive_path = state_dir.join(format!("{name}~"));
        let abandoned = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&alive_path)
        {
            Ok(marker) => match marker.try_lock_exclusive() {
                Ok(()) => {
                    let _ = marker.unlock();
                    true
                }
                Err(_) => false,
            },
            Err(_) => true,
        };
        if !abandoned {
            continue;
        }

        let bank_path = entry.path();
        if let Ok(bank_file) = File::open(&bank_path) {
            if let Ok(lock) = WriteLock::new(master) {
                let _ = lock.append(&bank_file);
            }
        }
        let _ = fs::remove_file(&bank_path);
        let _ = fs::remove_file(&alive_path);
    }
    Ok(())
}

fn bank_contains(file: &File, line: &str) -> io::Result<bool> {
    let mut iter = LineIter::new(file)?;
    while let Some((_, text)) = iter.next()? {
        if text == line {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Tombstone every live record in `file` equal to `line`.
fn erase_matches(file: &File, lock: &WriteLock, line: &str) -> io::Result<()> {
    let offsets = {
        let mut iter = LineIter::new(file)?;
        let mut offsets = Vec::new();
        while let Some((offset, text)) = iter.next()? {
            if text == line {
                offsets.push(offset);
            }
        }
        offsets
    };
    for offset in offsets {
        lock.remove(offset)?;
    }
    Ok(())
}

/// Iterates stored lines bank by bank (master, then session), each id
/// carrying enough to address its record directly via [`HistoryDb::remove`].
pub struct ReadLineIter<'a> {
    banks: VecDeque<(u8, ReadLock<'a>, LineIter<'a>)>,
}

impl ReadLineIter<'_> {
    pub fn next(&mut self) -> io::Result<Option<(LineId, String)>> {
        while let Some((index, _lock, iter)) = self.banks.front_mut() {
            if let Some((offset, text)) = iter.next()? {
                let id = LineId::new(*index, offset as u32, true);
                return Ok(Some((id, text)));
            }
            self.banks.pop_front();
        }
        Ok(None)
    }
}

/// The on-disk command history store: a master bank shared by every
/// session plus, unless `history.shared` is set, a private bank for this
/// process alone.
pub struct HistoryDb {
    state_dir: PathBuf,
    master: File,
    session: Option<File>,
    /// The marker path plus the handle holding its exclusive lock for as
    /// long as this `HistoryDb` lives.
    alive: Option<(PathBuf, File)>,
    options: HistoryOptions,
}

impl HistoryDb {
    /// Open (creating if needed) the master bank and, unless `shared`, a
    /// session bank under `state_dir`, then reap any abandoned sessions left
    /// behind by prior processes.
    pub fn initialise(state_dir: &Path, session_id: &str, options: HistoryOptions) -> Result<Self> {
        fs::create_dir_all(state_dir)
            .with_context(|| format!("creating history state dir {}", state_dir.display()))?;

        let master = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(state_dir.join(MASTER_FILE))
            .context("opening master history bank")?;

        let (session, alive) = if options.shared {
            (None, None)
        } else {
            let bank = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(bank_path(state_dir, session_id))
                .context("opening session history bank")?;
            let alive_file_path = alive_path(state_dir, session_id);
            let alive_file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&alive_file_path)
                .with_context(|| format!("creating alive marker {}", alive_file_path.display()))?;
            alive_file
                .lock_exclusive()
                .context("locking session alive marker")?;
            (Some(bank), Some((alive_file_path, alive_file)))
        };

        reap(state_dir, &master, Some(session_id)).context("reaping abandoned sessions")?;

        Ok(Self {
            state_dir: state_dir.to_path_buf(),
            master,
            session,
            alive,
            options,
        })
    }

    fn write_bank_index(&self) -> u8 {
        if self.session.is_some() {
            BANK_SESSION
        } else {
            BANK_MASTER
        }
    }

    fn write_bank(&self) -> &File {
        self.session.as_ref().unwrap_or(&self.master)
    }

    fn bank(&self, index: u8) -> Option<&File> {
        match index {
            BANK_MASTER => Some(&self.master),
            BANK_SESSION => self.session.as_ref(),
            _ => None,
        }
    }

    /// Append `line` to the active write bank, applying the ignore-space
    /// rule, the max-length truncation, and the configured dupe policy.
    /// Returns `None` when the line was skipped rather than stored.
    pub fn add(&mut self, line: &str) -> Result<Option<LineId>> {
        if line.is_empty() {
            return Ok(None);
        }
        if self.options.ignore_space && line.starts_with(char::is_whitespace) {
            return Ok(None);
        }

        let mut line = line.to_string();
        if line.len() > MAX_LINE_LENGTH {
            let mut end = MAX_LINE_LENGTH;
            while !line.is_char_boundary(end) {
                end -= 1;
            }
            line.truncate(end);
        }

        let bank_index = self.write_bank_index();
        let bank = self.write_bank();
        let lock = WriteLock::new(bank).context("locking write bank")?;

        match self.options.dupe_mode {
            DupeMode::Add => {}
            DupeMode::Ignore => {
                if bank_contains(bank, &line).context("scanning for duplicate")? {
                    return Ok(None);
                }
            }
            DupeMode::ErasePrev => {
                erase_matches(bank, &lock, &line).context("erasing prior duplicates")?;
            }
        }

        let offset = lock.add(&line).context("appending history line")?;
        tracing::debug!(target: "history", bank_index, offset, "added");
        Ok(Some(LineId::new(bank_index, offset as u32, true)))
    }

    /// Tombstone the record at `id`.
    pub fn remove(&mut self, id: LineId) -> Result<()> {
        let file = self
            .bank(id.bank_index())
            .ok_or_else(|| anyhow!("unknown bank index {}", id.bank_index()))?;
        let lock = WriteLock::new(file).context("locking bank for removal")?;
        lock.remove(id.offset() as u64).context("tombstoning record")?;
        Ok(())
    }

    /// Find and tombstone the first live record equal to `line`, searching
    /// master then session. Returns whether a match was found.
    pub fn remove_line(&mut self, line: &str) -> Result<bool> {
        match self.find(line)? {
            Some(id) => {
                self.remove(id)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Locate the first live record equal to `line`.
    pub fn find(&self, line: &str) -> Result<Option<LineId>> {
        for (index, file) in [
            (BANK_MASTER, Some(&self.master)),
            (BANK_SESSION, self.session.as_ref()),
        ] {
            let Some(file) = file else { continue };
            let lock = ReadLock::new(file).context("locking bank for read")?;
            let mut iter = lock.lines().context("iterating bank")?;
            while let Some((offset, text)) = iter.next()? {
                if text == line {
                    return Ok(Some(LineId::new(index, offset as u32, true)));
                }
            }
        }
        Ok(None)
    }

    /// Truncate every open bank, discarding all stored lines.
    pub fn clear(&mut self) -> Result<()> {
        WriteLock::new(&self.master)
            .context("locking master for clear")?
            .clear()
            .context("clearing master bank")?;
        if let Some(session) = &self.session {
            WriteLock::new(session)
                .context("locking session for clear")?
                .clear()
                .context("clearing session bank")?;
        }
        Ok(())
    }

    /// Iterate every live line, master bank first, then session.
    pub fn read_lines(&self) -> Result<ReadLineIter<'_>> {
        let mut banks = VecDeque::new();

        let master_lock = ReadLock::new(&self.master).context("locking master for read")?;
        let master_iter = master_lock.lines().context("iterating master bank")?;
        banks.push_back((BANK_MASTER, master_lock, master_iter));

        if let Some(session) = &self.session {
            let lock = ReadLock::new(session).context("locking session for read")?;
            let iter = lock.lines().context("iterating session bank")?;
            banks.push_back((BANK_SESSION, lock, iter));
        }

        Ok(ReadLineIter { banks })
    }

    pub fn expand_mode(&self) -> ExpandMode {
        self.options.expand_mode
    }
}

impl Drop for HistoryDb {
    fn drop(&mut self) {
        if let Some((alive_path, alive_file)) = &self.alive {
            let _ = alive_file.unlock();
            let _ = fs::remove_file(alive_path);
        }
        let _ = reap(&self.state_dir, &self.master, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn options() -> HistoryOptions {
        HistoryOptions {
            shared: false,
            ignore_space: true,
            dupe_mode: DupeMode::Add,
            expand_mode: ExpandMode::NotQuoted,
        }
    }

    fn collect(db: &HistoryDb) -> Vec<String> {
        let mut iter = db.read_lines().unwrap();
        let mut out = Vec::new();
        while let Some((_, text)) = iter.next().unwrap() {
            out.push(text);
        }
        out
    }

    #[test]
    fn add_then_read_lines_round_trips() {
        let dir = tempdir().unwrap();
        let mut db = HistoryDb::initialise(dir.path(), "s1", options()).unwrap();
        db.add("git status").unwrap();
        db.add("git commit").unwrap();
        assert_eq!(collect(&db), vec!["git status", "git commit"]);
    }

    #[test]
    fn empty_and_whitespace_led_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let mut db = HistoryDb::initialise(dir.path(), "s1", options()).unwrap();
        assert!(db.add("").unwrap().is_none());
        assert!(db.add(" leading space").unwrap().is_none());
        assert!(collect(&db).is_empty());
    }

    #[test]
    fn ignore_dupe_mode_skips_a_line_already_present() {
        let dir = tempdir().unwrap();
        let mut opts = options();
        opts.dupe_mode = DupeMode::Ignore;
        let mut db = HistoryDb::initialise(dir.path(), "s1", opts).unwrap();
        db.add("ls -la").unwrap();
        assert!(db.add("ls -la").unwrap().is_none());
        assert_eq!(collect(&db), vec!["ls -la"]);
    }

    #[test]
    fn erase_prev_dupe_mode_moves_the_line_to_the_end() {
        let dir = tempdir().unwrap();
        let mut opts = options();
        opts.dupe_mode = DupeMode::ErasePrev;
        let mut db = HistoryDb::initialise(dir.path(), "s1", opts).unwrap();
        db.add("one").unwrap();
        db.add("two").unwrap();
        db.add("one").unwrap();
        assert_eq!(collect(&db), vec!["two", "one"]);
    }

    #[test]
    fn remove_by_id_tombstones_the_record() {
        let dir = tempdir().unwrap();
        let mut db = HistoryDb::initialise(dir.path(), "s1", options()).unwrap();
        let id = db.add("temporary").unwrap().unwrap();
        db.remove(id).unwrap();
        assert!(collect(&db).is_empty());
    }

    #[test]
    fn find_locates_a_line_in_either_bank() {
        let dir = tempdir().unwrap();
        let mut db = HistoryDb::initialise(dir.path(), "s1", options()).unwrap();
        db.add("needle").unwrap();
        assert!(db.find("needle").unwrap().is_some());
        assert!(db.find("missing").unwrap().is_none());
    }

    #[test]
    fn clear_empties_every_open_bank() {
        let dir = tempdir().unwrap();
        let mut db = HistoryDb::initialise(dir.path(), "s1", options()).unwrap();
        db.add("one").unwrap();
        db.clear().unwrap();
        assert!(collect(&db).is_empty());
    }

    #[test]
    fn reap_folds_an_abandoned_session_into_master_on_next_open() {
        let dir = tempdir().unwrap();
        {
            let mut db = HistoryDb::initialise(dir.path(), "dead", options()).unwrap();
            db.add("orphaned line").unwrap();
            // Emulate a crashed process: the kernel releases its advisory
            // lock when the last fd closes, but nothing else runs. Unlock
            // by hand, then leak the handle so our own `Drop` (which would
            // otherwise clean up normally) never runs.
            if let Some((_, alive_file)) = &db.alive {
                let _ = alive_file.unlock();
            }
            std::mem::forget(db);
        }
        assert!(bank_path(dir.path(), "dead").exists());

        let db = HistoryDb::initialise(dir.path(), "s2", options()).unwrap();
        assert_eq!(collect(&db), vec!["orphaned line"]);
        assert!(!bank_path(dir.path(), "dead").exists());
    }

    #[test]
    fn a_still_alive_session_is_never_reaped() {
        let dir = tempdir().unwrap();
        let mut alive_db = HistoryDb::initialise(dir.path(), "alive", options()).unwrap();
        alive_db.add("still running").unwrap();

        let other = HistoryDb::initialise(dir.path(), "s2", options()).unwrap();
        assert!(collect(&other).is_empty());
        assert!(bank_path(dir.path(), "alive").exists());
    }

    #[test]
    fn shared_mode_opens_no_session_bank() {
        let dir = tempdir().unwrap();
        let mut opts = options();
        opts.shared = true;
        let mut db = HistoryDb::initialise(dir.path(), "s1", opts).unwrap();
        db.add("shared line").unwrap();
        assert!(!bank_path(dir.path(), "s1").exists());
        assert_eq!(collect(&db), vec!["shared line"]);
    }

    #[test]
    fn long_line_is_truncated_to_max_length() {
        let dir = tempdir().unwrap();
        let mut db = HistoryDb::initialise(dir.path(), "s1", options()).unwrap();
        let long = "a".repeat(MAX_LINE_LENGTH + 100);
        db.add(&long).unwrap();
        let stored = collect(&db);
        assert_eq!(stored[0].len(), MAX_LINE_LENGTH);
    }
}
