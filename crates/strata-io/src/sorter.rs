//! External sorter: the `sorted_stream` primitive the sweeps build on.
//!
//! Records buffer in memory up to a budget; full buffers spill as sorted
//! runs to scratch files. Draining merges the in-memory remainder with all
//! runs. Within the engine, runs stay few and sequential, so the merge is a
//! linear scan over run heads rather than a tournament tree.

use std::marker::PhantomData;

use tempfile::TempPath;

use strata_core::{ItemCmp, Result};

use crate::record::Record;
use crate::stream::{RecordReader, RecordStream, RecordWriter};

/// Default in-memory buffer, in records, when no budget is given.
const DEFAULT_BUFFER: usize = 64 * 1024;

/// Buffers records and spills sorted runs, producing one sorted stream.
pub struct Sorter<T: Record, C: ItemCmp<T>> {
    buf: Vec<T>,
    capacity: usize,
    runs: Vec<(TempPath, u64)>,
    len: u64,
    _cmp: PhantomData<C>,
}

impl<T: Record, C: ItemCmp<T>> Sorter<T, C> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER)
    }

    /// `capacity` is the in-memory buffer size in records.
    pub fn with_capacity(capacity: usize) -> Self {
        Sorter {
            buf: Vec::new(),
            capacity: capacity.max(2),
            runs: Vec::new(),
            len: 0,
            _cmp: PhantomData,
        }
    }

    pub fn push(&mut self, record: T) -> Result<()> {
        if self.buf.len() >= self.capacity {
            self.spill()?;
        }
        self.buf.push(record);
        self.len += 1;
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn spill(&mut self) -> Result<()> {
        self.buf.sort_unstable_by(C::cmp);
        let mut w = RecordWriter::<T>::create()?;
        for r in self.buf.drain(..) {
            w.push(&r)?;
        }
        let run = w.finish()?;
        tracing::trace!(records = run.1, runs = self.runs.len() + 1, "sorter spilled a run");
        self.runs.push(run);
        Ok(())
    }

    /// Sorts and drains into a single merged stream.
    pub fn into_stream(mut self) -> Result<SortedStream<T, C>> {
        self.buf.sort_unstable_by(C::cmp);
        let mut readers = Vec::with_capacity(self.runs.len());
        for (path, len) in &self.runs {
            readers.push(RecordReader::open(path, *len)?);
        }
        Ok(SortedStream {
            buf: self.buf.into_iter().peekable(),
            runs: readers,
            _paths: self.runs,
            _cmp: PhantomData,
        })
    }
}

impl<T: Record, C: ItemCmp<T>> Default for Sorter<T, C> {
    fn default() -> Self {
        Self::new()
    }
}

/// The merged output of a [`Sorter`].
pub struct SortedStream<T: Record, C: ItemCmp<T>> {
    buf: std::iter::Peekable<std::vec::IntoIter<T>>,
    runs: Vec<RecordReader<T>>,
    _paths: Vec<(TempPath, u64)>,
    _cmp: PhantomData<C>,
}

impl<T: Record, C: ItemCmp<T>> SortedStream<T, C> {
    /// Index of the source holding the smallest head: `runs.len()` denotes
    /// the in-memory buffer.
    fn min_source(&mut self) -> Result<Option<usize>> {
        let mut best: Option<(usize, T)> = None;
        for i in 0..self.runs.len() {
            if let Some(head) = self.runs[i].peek()? {
                match &best {
                    Some((_, b)) if C::cmp(&head, b).is_ge() => {}
                    _ => best = Some((i, head)),
                }
            }
        }
        if let Some(&head) = self.buf.peek() {
            match &best {
                Some((_, b)) if C::cmp(&head, b).is_ge() => {}
                _ => best = Some((self.runs.len(), head)),
            }
        }
        Ok(best.map(|(i, _)| i))
    }
}

impl<T: Record, C: ItemCmp<T>> RecordStream<T> for SortedStream<T, C> {
    fn peek(&mut self) -> Result<Option<T>> {
        match self.min_source()? {
            None => Ok(None),
            Some(i) if i == self.runs.len() => Ok(self.buf.peek().copied()),
            Some(i) => self.runs[i].peek(),
        }
    }

    fn pull(&mut self) -> Result<Option<T>> {
        match self.min_source()? {
            None => Ok(None),
            Some(i) if i == self.runs.len() => Ok(self.buf.next()),
            Some(i) => self.runs[i].pull(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;
    use proptest::prelude::*;
    use strata_core::LevelInfo;

    #[derive(Default)]
    struct ByLevel;

    impl ItemCmp<LevelInfo> for ByLevel {
        fn cmp(a: &LevelInfo, b: &LevelInfo) -> Ordering {
            a.level.cmp(&b.level)
        }
    }

    fn drain(mut s: SortedStream<LevelInfo, ByLevel>) -> Vec<u32> {
        let mut out = Vec::new();
        while let Some(li) = s.pull().unwrap() {
            out.push(li.level);
        }
        out
    }

    #[test]
    fn sorts_in_memory() {
        let mut sorter = Sorter::<LevelInfo, ByLevel>::new();
        for l in [5u32, 1, 9, 3] {
            sorter.push(LevelInfo::new(l, 0)).unwrap();
        }
        assert_eq!(drain(sorter.into_stream().unwrap()), vec![1, 3, 5, 9]);
    }

    #[test]
    fn merges_spilled_runs() {
        let mut sorter = Sorter::<LevelInfo, ByLevel>::with_capacity(4);
        for l in [8u32, 2, 6, 0, 9, 1, 7, 3, 5, 4] {
            sorter.push(LevelInfo::new(l, 0)).unwrap();
        }
        assert_eq!(sorter.len(), 10);
        assert_eq!(drain(sorter.into_stream().unwrap()), (0..10).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn output_is_sorted_and_complete(mut levels in proptest::collection::vec(0u32..1000, 0..200)) {
            let mut sorter = Sorter::<LevelInfo, ByLevel>::with_capacity(16);
            for &l in &levels {
                sorter.push(LevelInfo::new(l, 0)).unwrap();
            }
            let out = drain(sorter.into_stream().unwrap());
            levels.sort_unstable();
            prop_assert_eq!(out, levels);
        }
    }
}
