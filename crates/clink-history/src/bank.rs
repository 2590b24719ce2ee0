//! Buffered, lock-guarded access to one bank file: a shared-lock reader
//! that walks records in fixed-size blocks with a rollback window for
//! records straddling a block boundary, and an exclusive-lock writer that
//! appends, tombstones, or clears.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use fs2::FileExt;

/// Records shorter than this never need a rollback larger than the buffer,
/// so an 8 KiB block comfortably covers the 8192-byte line cap in one go.
const BLOCK_SIZE: usize = 8192;

/// Any byte at or below this value terminates a record; `\n` is the
/// common case but any control byte works.
fn is_terminator(b: u8) -> bool {
    b <= 0x1f
}

/// Walks a file in fixed-size blocks, re-reading a caller-specified
/// "rollback" window of unconsumed bytes at the front of each new block so a
/// record split across a block boundary is never truncated.
pub struct FileIter<'a> {
    file: &'a File,
    buf: Vec<u8>,
    buf_len: usize,
    buffer_offset: u64,
    remaining: u64,
}

impl<'a> FileIter<'a> {
    pub fn new(file: &'a File) -> io::Result<Self> {
        let mut f = file;
        f.seek(SeekFrom::Start(0))?;
        let total = file.metadata()?.len();
        Ok(Self {
            file,
            buf: vec![0u8; BLOCK_SIZE],
            buf_len: 0,
            buffer_offset: 0,
            remaining: total,
        })
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buf[..self.buf_len]
    }

    pub fn buffer_offset(&self) -> u64 {
        self.buffer_offset
    }

    /// Shift the last `rollback` bytes of the current buffer to the front,
    /// then top it up from the file. Returns the new buffer length (0 at
    /// EOF).
    pub fn next(&mut self, rollback: usize) -> io::Result<usize> {
        if self.remaining == 0 {
            self.buf_len = 0;
            return Ok(0);
        }
        let cap = self.buf.len();
        let rollback = rollback.min(cap).min(self.buf_len);
        if rollback > 0 {
            let src_start = self.buf_len - rollback;
            self.buf.copy_within(src_start..self.buf_len, 0);
        }
        self.buffer_offset += (self.buf_len - rollback) as u64;

        let needed = self.remaining.min((cap - rollback) as u64) as usize;
        let mut f = self.file;
        let read = f.read(&mut self.buf[rollback..rollback + needed])?;
        self.remaining -= read as u64;
        self.buf_len = read + rollback;
        Ok(self.buf_len)
    }
}

/// Iterates the records of a bank file in order, skipping control bytes and
/// tombstoned (`|`-prefixed) lines.
pub struct LineIter<'a> {
    file_iter: FileIter<'a>,
    remaining: usize,
}

impl<'a> LineIter<'a> {
    pub fn new(file: &'a File) -> io::Result<Self> {
        Ok(Self {
            file_iter: FileIter::new(file)?,
            remaining: 0,
        })
    }

    fn provision(&mut self) -> io::Result<bool> {
        self.remaining = self.file_iter.next(self.remaining)?;
        Ok(self.remaining != 0)
    }

    /// Returns `(offset_of_record, text)`, or `None` at EOF. A record that
    /// isn't valid UTF-8 is skipped (a corrupt record; the next boundary is
    /// the next control byte).
    pub fn next(&mut self) -> io::Result<Option<(u64, String)>> {
        loop {
            if self.remaining == 0 && !self.provision()? {
                return Ok(None);
            }

            let last = self.file_iter.buf_len;
            let mut start = last - self.remaining;

            while start != last && is_terminator(self.file_iter.buf[start]) {
                start += 1;
                self.remaining -= 1;
            }

            let mut end = start;
            while end != last && !is_terminator(self.file_iter.buf[end]) {
                end += 1;
            }

            if end == last && start != 0 {
                self.provision()?;
                continue;
            }

            let bytes = end - start;
            self.remaining -= bytes;
            let offset = self.file_iter.buffer_offset() + start as u64;

            if self.file_iter.buf[start] == b'|' {
                continue;
            }

            match std::str::from_utf8(&self.file_iter.buf[start..end]) {
                Ok(text) => return Ok(Some((offset, text.to_string()))),
                Err(_) => continue,
            }
        }
    }
}

/// Shared-lock guard for read-only bank access. The lock is released when
/// the guard drops.
pub struct ReadLock<'a> {
    file: &'a File,
}

impl<'a> ReadLock<'a> {
    pub fn new(file: &'a File) -> io::Result<Self> {
        file.lock_shared()?;
        Ok(Self { file })
    }

    pub fn lines(&self) -> io::Result<LineIter<'a>> {
        LineIter::new(self.file)
    }

    /// Read the record at `offset`, if it's still live (not tombstoned and
    /// not truncated).
    pub fn read_at(&self, offset: u64) -> io::Result<Option<String>> {
        let mut f = self.file;
        let len = self.file.metadata()?.len();
        if offset >= len {
            return Ok(None);
        }
        f.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; BLOCK_SIZE.min((len - offset) as usize)];
        let read = f.read(&mut buf)?;
        buf.truncate(read);
        if buf.first() == Some(&b'|') {
            return Ok(None);
        }
        let end = buf.iter().position(|&b| is_terminator(b)).unwrap_or(buf.len());
        match std::str::from_utf8(&buf[..end]) {
            Ok(text) if !text.is_empty() => Ok(Some(text.to_string())),
            _ => Ok(None),
        }
    }
}

impl Drop for ReadLock<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.file);
    }
}

/// Exclusive-lock guard for mutating a bank file.
pub struct WriteLock<'a> {
    file: &'a File,
}

impl<'a> WriteLock<'a> {
    pub fn new(file: &'a File) -> io::Result<Self> {
        file.lock_exclusive()?;
        Ok(Self { file })
    }

    /// Append `line` plus a terminator, returning the offset it was written
    /// at.
    pub fn add(&self, line: &str) -> io::Result<u64> {
        let mut f = self.file;
        let offset = f.seek(SeekFrom::End(0))?;
        f.write_all(line.as_bytes())?;
        f.write_all(b"\n")?;
        Ok(offset)
    }

    /// Tombstone the record at `offset` by overwriting its first byte with
    /// `|`, leaving the rest of the file untouched.
    pub fn remove(&self, offset: u64) -> io::Result<()> {
        let mut f = self.file;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(b"|")?;
        Ok(())
    }

    pub fn clear(&self) -> io::Result<()> {
        self.file.set_len(0)?;
        let mut f = self.file;
        f.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// Copy the full contents of `src` onto the end of this bank, used by
    /// `reap` to fold an abandoned session bank into the master.
    pub fn append(&self, src: &File) -> io::Result<()> {
        let mut dest = self.file;
        dest.seek(SeekFrom::End(0))?;
        let mut reader = src;
        reader.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; BLOCK_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            dest.write_all(&buf[..n])?;
        }
        Ok(())
    }
}

impl Drop for WriteLock<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.file);
    }
}
