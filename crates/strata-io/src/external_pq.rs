//! External-memory priority queues.
//!
//! [`ExternalPq`] is the `external_priority_queue` primitive: a keyed
//! min-queue whose in-memory heap spills sorted runs to scratch files when
//! full; pops take the minimum across the heap and all run heads.
//! [`SecondaryPq`] wraps either a plain in-memory heap or an [`ExternalPq`]
//! behind the interface the product sweeps expect from their per-level
//! queue.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::io::{Read, Write};
use std::marker::PhantomData;

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use tempfile::TempPath;

use strata_core::{Error, ItemCmp, Result};

use crate::record::Record;
use crate::stream::{RecordReader, RecordStream, RecordWriter};

/// A key/item pair; the record format of spilled runs.
#[derive(Clone, Copy)]
struct Keyed<T> {
    key: u32,
    item: T,
}

impl<T: Record> Record for Keyed<T> {
    const BYTES: usize = 8 + T::BYTES;

    fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u64::<NativeEndian>(self.key as u64)?;
        self.item.encode(w)
    }

    fn decode<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let key = r.read_u64::<NativeEndian>()? as u32;
        Ok(Keyed { key, item: T::decode(r)? })
    }
}

struct Entry<T, C> {
    key: u32,
    item: T,
    _cmp: PhantomData<C>,
}

impl<T, C: ItemCmp<T>> Entry<T, C> {
    fn new(key: u32, item: T) -> Self {
        Entry { key, item, _cmp: PhantomData }
    }
}

impl<T, C: ItemCmp<T>> Ord for Entry<T, C> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key).then_with(|| C::cmp(&self.item, &other.item))
    }
}

impl<T, C: ItemCmp<T>> PartialOrd for Entry<T, C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, C: ItemCmp<T>> PartialEq for Entry<T, C> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T, C: ItemCmp<T>> Eq for Entry<T, C> {}

/// A keyed min-priority-queue spilling to scratch files.
pub struct ExternalPq<T: Record, C: ItemCmp<T>> {
    buf: BinaryHeap<Reverse<Entry<T, C>>>,
    capacity: usize,
    runs: Vec<(RecordReader<Keyed<T>>, TempPath)>,
    len: u64,
}

impl<T: Record, C: ItemCmp<T>> ExternalPq<T, C> {
    /// `capacity` is the in-memory heap size in records.
    pub fn new(capacity: usize) -> Self {
        ExternalPq { buf: BinaryHeap::new(), capacity: capacity.max(2), runs: Vec::new(), len: 0 }
    }

    pub fn push(&mut self, key: u32, item: T) -> Result<()> {
        if self.buf.len() >= self.capacity {
            self.spill()?;
        }
        self.buf.push(Reverse(Entry::new(key, item)));
        self.len += 1;
        Ok(())
    }

    fn spill(&mut self) -> Result<()> {
        let mut w = RecordWriter::<Keyed<T>>::create()?;
        while let Some(Reverse(e)) = self.buf.pop() {
            w.push(&Keyed { key: e.key, item: e.item })?;
        }
        let (path, len) = w.finish()?;
        tracing::trace!(records = len, runs = self.runs.len() + 1, "priority queue spilled a run");
        let reader = RecordReader::open(&path, len)?;
        self.runs.push((reader, path));
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index of the source holding the global minimum: `runs.len()` denotes
    /// the in-memory heap.
    fn min_source(&mut self) -> Result<Option<usize>> {
        let mut best: Option<(usize, Keyed<T>)> = None;
        for i in 0..self.runs.len() {
            if let Some(head) = self.runs[i].0.peek()? {
                let better = match &best {
                    Some((_, b)) => {
                        head.key.cmp(&b.key).then_with(|| C::cmp(&head.item, &b.item)) == Ordering::Less
                    }
                    None => true,
                };
                if better {
                    best = Some((i, head));
                }
            }
        }
        if let Some(Reverse(top)) = self.buf.peek() {
            let better = match &best {
                Some((_, b)) => {
                    top.key.cmp(&b.key).then_with(|| C::cmp(&top.item, &b.item)) == Ordering::Less
                }
                None => true,
            };
            if better {
                return Ok(Some(self.runs.len()));
            }
        }
        Ok(best.map(|(i, _)| i))
    }

    pub fn peek(&mut self) -> Result<Option<(u32, T)>> {
        match self.min_source()? {
            None => Ok(None),
            Some(i) if i == self.runs.len() => {
                let Reverse(top) = self.buf.peek().expect("heap nonempty");
                Ok(Some((top.key, top.item)))
            }
            Some(i) => Ok(self.runs[i].0.peek()?.map(|k| (k.key, k.item))),
        }
    }

    pub fn pop(&mut self) -> Result<Option<(u32, T)>> {
        let out = match self.min_source()? {
            None => None,
            Some(i) if i == self.runs.len() => {
                let Reverse(e) = self.buf.pop().expect("heap nonempty");
                Some((e.key, e.item))
            }
            Some(i) => self.runs[i].0.pull()?.map(|k| (k.key, k.item)),
        };
        if out.is_some() {
            self.len -= 1;
        }
        Ok(out)
    }
}

/// The per-level queue of the product sweeps, internal or external per the
/// resolved memory mode.
pub struct SecondaryPq<T: Record, C: ItemCmp<T>> {
    inner: SecondaryPqInner<T, C>,
    len: u64,
    max_size: u64,
}

enum SecondaryPqInner<T: Record, C: ItemCmp<T>> {
    Internal(BinaryHeap<Reverse<Entry<T, C>>>),
    External(ExternalPq<T, C>),
}

impl<T: Record, C: ItemCmp<T>> SecondaryPq<T, C> {
    /// Memory-accounting weight of this structure.
    pub const DATA_STRUCTURES: u64 = 1;

    /// How many records a budget of `bytes` fits.
    pub fn memory_fits(bytes: u64) -> u64 {
        (bytes / T::BYTES as u64).max(16)
    }

    pub fn new(external: bool, memory_bytes: u64, max_size: u64) -> Self {
        let inner = if external {
            SecondaryPqInner::External(ExternalPq::new(Self::memory_fits(memory_bytes) as usize))
        } else {
            SecondaryPqInner::Internal(BinaryHeap::new())
        };
        SecondaryPq { inner, len: 0, max_size }
    }

    pub fn push(&mut self, item: T) -> Result<()> {
        if self.len >= self.max_size {
            return Err(Error::OutOfMemory { bound: self.max_size });
        }
        self.len += 1;
        match &mut self.inner {
            SecondaryPqInner::Internal(heap) => {
                heap.push(Reverse(Entry::new(0, item)));
                Ok(())
            }
            SecondaryPqInner::External(pq) => pq.push(0, item),
        }
    }

    pub fn peek(&mut self) -> Result<Option<T>> {
        match &mut self.inner {
            SecondaryPqInner::Internal(heap) => Ok(heap.peek().map(|Reverse(e)| e.item)),
            SecondaryPqInner::External(pq) => Ok(pq.peek()?.map(|(_, t)| t)),
        }
    }

    pub fn pop(&mut self) -> Result<Option<T>> {
        let out = match &mut self.inner {
            SecondaryPqInner::Internal(heap) => heap.pop().map(|Reverse(e)| e.item),
            SecondaryPqInner::External(pq) => pq.pop()?.map(|(_, t)| t),
        };
        if out.is_some() {
            self.len -= 1;
        }
        Ok(out)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::LevelInfo;

    #[derive(Default)]
    struct ByWidth;

    impl ItemCmp<LevelInfo> for ByWidth {
        fn cmp(a: &LevelInfo, b: &LevelInfo) -> Ordering {
            a.width.cmp(&b.width)
        }
    }

    #[test]
    fn pops_in_key_then_secondary_order() {
        let mut pq = ExternalPq::<LevelInfo, ByWidth>::new(4);
        pq.push(2, LevelInfo::new(0, 9)).unwrap();
        pq.push(1, LevelInfo::new(0, 5)).unwrap();
        pq.push(1, LevelInfo::new(0, 3)).unwrap();
        pq.push(3, LevelInfo::new(0, 1)).unwrap();

        assert_eq!(pq.pop().unwrap().unwrap(), (1, LevelInfo::new(0, 3)));
        assert_eq!(pq.pop().unwrap().unwrap(), (1, LevelInfo::new(0, 5)));
        assert_eq!(pq.pop().unwrap().unwrap(), (2, LevelInfo::new(0, 9)));
        assert_eq!(pq.pop().unwrap().unwrap(), (3, LevelInfo::new(0, 1)));
        assert!(pq.pop().unwrap().is_none());
    }

    #[test]
    fn spills_and_still_orders() {
        let mut pq = ExternalPq::<LevelInfo, ByWidth>::new(3);
        for (i, w) in [9u64, 7, 5, 3, 1, 8, 6, 4, 2, 0].into_iter().enumerate() {
            pq.push((i % 2) as u32, LevelInfo::new(0, w)).unwrap();
        }
        assert_eq!(pq.len(), 10);
        let mut out = Vec::new();
        while let Some((k, li)) = pq.pop().unwrap() {
            out.push((k, li.width));
        }
        let mut expect = out.clone();
        expect.sort();
        assert_eq!(out, expect);
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn secondary_pq_enforces_its_bound() {
        let mut pq = SecondaryPq::<LevelInfo, ByWidth>::new(false, 1024, 2);
        pq.push(LevelInfo::new(0, 1)).unwrap();
        pq.push(LevelInfo::new(0, 2)).unwrap();
        assert!(matches!(pq.push(LevelInfo::new(0, 3)), Err(Error::OutOfMemory { bound: 2 })));
    }

    #[test]
    fn secondary_pq_external_mode_round_trips() {
        let mut pq = SecondaryPq::<LevelInfo, ByWidth>::new(true, 64, 1000);
        for w in (0..100u64).rev() {
            pq.push(LevelInfo::new(0, w)).unwrap();
        }
        for w in 0..100u64 {
            assert_eq!(pq.pop().unwrap().unwrap().width, w);
        }
        assert!(pq.is_empty());
    }
}
