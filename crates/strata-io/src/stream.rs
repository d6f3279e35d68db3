//! Buffered record streams over scratch files.
//!
//! Writers append; readers consume forwards or backwards. Reverse reading
//! matters because node files are written bottom-up (deepest level first)
//! while the top-down sweeps want the root first, and the arc files are
//! written top-down while Reduce wants them deepest-first.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::Path;

use tempfile::TempPath;

use strata_core::Result;

use crate::record::Record;
use crate::scratch::scratch_file;

/// Records a reverse reader loads per refill.
const REVERSE_CHUNK: usize = 1024;

/// Pull/peek access to a stream of records.
pub trait RecordStream<T> {
    fn peek(&mut self) -> Result<Option<T>>;
    fn pull(&mut self) -> Result<Option<T>>;
}

/// An append-only stream of records backed by a scratch file.
pub struct RecordWriter<T: Record> {
    inner: BufWriter<File>,
    path: TempPath,
    len: u64,
    _marker: PhantomData<T>,
}

impl<T: Record> RecordWriter<T> {
    pub fn create() -> Result<Self> {
        let (file, path) = scratch_file()?;
        Ok(RecordWriter { inner: BufWriter::new(file), path, len: 0, _marker: PhantomData })
    }

    /// Reopens a sealed stream for appending; `len` records are already
    /// present.
    pub fn append(path: TempPath, len: u64) -> Result<Self> {
        let file = OpenOptions::new().append(true).open(&path)?;
        Ok(RecordWriter { inner: BufWriter::new(file), path, len, _marker: PhantomData })
    }

    pub fn push(&mut self, record: &T) -> Result<()> {
        record.encode(&mut self.inner)?;
        self.len += 1;
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Flushes and hands back the underlying file with its record count.
    pub fn finish(mut self) -> Result<(TempPath, u64)> {
        self.inner.flush()?;
        Ok((self.path, self.len))
    }
}

/// Forward reader over a sealed record stream.
pub struct RecordReader<T: Record> {
    inner: BufReader<File>,
    remaining: u64,
    peeked: Option<T>,
    _marker: PhantomData<T>,
}

impl<T: Record> RecordReader<T> {
    pub fn open(path: &Path, len: u64) -> Result<Self> {
        let file = File::open(path)?;
        Ok(RecordReader { inner: BufReader::new(file), remaining: len, peeked: None, _marker: PhantomData })
    }

    fn read_next(&mut self) -> Result<Option<T>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(T::decode(&mut self.inner)?))
    }
}

impl<T: Record> RecordStream<T> for RecordReader<T> {
    fn peek(&mut self) -> Result<Option<T>> {
        if self.peeked.is_none() {
            self.peeked = self.read_next()?;
        }
        Ok(self.peeked)
    }

    fn pull(&mut self) -> Result<Option<T>> {
        if let Some(t) = self.peeked.take() {
            return Ok(Some(t));
        }
        self.read_next()
    }
}

/// Backward reader over a sealed record stream, serving records from the end
/// of the file towards the start in chunks.
pub struct ReverseRecordReader<T: Record> {
    file: File,
    unread: u64,
    buf: Vec<T>,
    _marker: PhantomData<T>,
}

impl<T: Record> ReverseRecordReader<T> {
    pub fn open(path: &Path, len: u64) -> Result<Self> {
        let file = File::open(path)?;
        Ok(ReverseRecordReader { file, unread: len, buf: Vec::new(), _marker: PhantomData })
    }

    fn refill(&mut self) -> Result<()> {
        debug_assert!(self.buf.is_empty());
        if self.unread == 0 {
            return Ok(());
        }
        let take = (REVERSE_CHUNK as u64).min(self.unread);
        self.unread -= take;
        self.file.seek(SeekFrom::Start(self.unread * T::BYTES as u64))?;
        let mut bytes = vec![0u8; take as usize * T::BYTES];
        self.file.read_exact(&mut bytes)?;
        let mut cursor = std::io::Cursor::new(bytes);
        self.buf.reserve(take as usize);
        for _ in 0..take {
            self.buf.push(T::decode(&mut cursor)?);
        }
        Ok(())
    }
}

impl<T: Record> RecordStream<T> for ReverseRecordReader<T> {
    fn peek(&mut self) -> Result<Option<T>> {
        if self.buf.is_empty() {
            self.refill()?;
        }
        Ok(self.buf.last().copied())
    }

    fn pull(&mut self) -> Result<Option<T>> {
        if self.buf.is_empty() {
            self.refill()?;
        }
        Ok(self.buf.pop())
    }
}
