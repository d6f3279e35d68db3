//! The levelized priority queue driving every sweep.
//!
//! Two tiers: for each of the next `lookahead` upcoming levels (enumerated
//! in advance by a [`LevelMerger`]) an unsorted in-memory bucket; everything
//! beyond the window goes to an overflow queue ordered by `(level,
//! secondary)`. Advancing a level sorts the matching bucket and makes it the
//! active stream; the window rotates and overflow entries for newly visible
//! levels drain into their buckets.
//!
//! The caller supplies an upper bound derived from the input's i-level cuts;
//! exceeding it means the bound itself is wrong and surfaces as
//! [`Error::OutOfMemory`]. Pushing at or before the current level is a
//! programmer error and only checked in debug builds.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::marker::PhantomData;

use strata_core::{Direction, Error, ItemCmp, Level, Leveled, Result};

use crate::external_pq::ExternalPq;
use crate::level_merger::LevelMerger;
use crate::record::Record;

/// Bounds at or below which the unbucketed (`lookahead = 0`) variant is the
/// better choice: the whole queue fits comfortably in one heap.
pub fn no_lookahead_bound() -> u64 {
    4096
}

struct HeapEntry<T, C> {
    key: Level,
    item: T,
    _cmp: PhantomData<C>,
}

impl<T, C: ItemCmp<T>> Ord for HeapEntry<T, C> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key).then_with(|| C::cmp(&self.item, &other.item))
    }
}

impl<T, C: ItemCmp<T>> PartialOrd for HeapEntry<T, C> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, C: ItemCmp<T>> PartialEq for HeapEntry<T, C> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl<T, C: ItemCmp<T>> Eq for HeapEntry<T, C> {}

enum Overflow<T: Record, C: ItemCmp<T>> {
    Internal(BinaryHeap<Reverse<HeapEntry<T, C>>>),
    External(ExternalPq<T, C>),
}

impl<T: Record, C: ItemCmp<T>> Overflow<T, C> {
    fn push(&mut self, key: Level, item: T) -> Result<()> {
        match self {
            Overflow::Internal(heap) => {
                heap.push(Reverse(HeapEntry { key, item, _cmp: PhantomData }));
                Ok(())
            }
            Overflow::External(pq) => pq.push(key, item),
        }
    }

    fn peek_key(&mut self) -> Result<Option<Level>> {
        match self {
            Overflow::Internal(heap) => Ok(heap.peek().map(|Reverse(e)| e.key)),
            Overflow::External(pq) => Ok(pq.peek()?.map(|(k, _)| k)),
        }
    }

    fn pop(&mut self) -> Result<Option<(Level, T)>> {
        match self {
            Overflow::Internal(heap) => Ok(heap.pop().map(|Reverse(e)| (e.key, e.item))),
            Overflow::External(pq) => pq.pop(),
        }
    }
}

/// A levelized priority queue over items with a level projection.
pub struct LevelizedPq<T: Record + Leveled, C: ItemCmp<T>> {
    direction: Direction,
    lookahead: usize,
    levels: LevelMerger,
    buckets: VecDeque<(Level, Vec<T>)>,
    active: Vec<T>,
    active_pos: usize,
    active_level: Option<Level>,
    overflow: Overflow<T, C>,
    size: u64,
    max_size: u64,
}

impl<T: Record + Leveled, C: ItemCmp<T>> LevelizedPq<T, C> {
    /// Memory-accounting weight of this structure (buckets + overflow).
    pub const DATA_STRUCTURES: u64 = 2;

    /// How many elements a budget of `bytes` fits.
    pub fn memory_fits(bytes: u64) -> u64 {
        (bytes / (3 * T::BYTES as u64)).max(16)
    }

    /// Sets up the queue. `levels` must enumerate the union of all levels
    /// the queue will see, in sweep direction.
    pub fn new(
        external: bool,
        direction: Direction,
        lookahead: usize,
        levels: LevelMerger,
        memory_bytes: u64,
        max_size: u64,
    ) -> Self {
        let overflow = if external {
            Overflow::External(ExternalPq::new(Self::memory_fits(memory_bytes) as usize))
        } else {
            Overflow::Internal(BinaryHeap::new())
        };
        LevelizedPq {
            direction,
            lookahead,
            levels,
            buckets: VecDeque::new(),
            active: Vec::new(),
            active_pos: 0,
            active_level: None,
            overflow,
            size: 0,
            max_size,
        }
    }

    pub fn push(&mut self, item: T) -> Result<()> {
        let level = item.level();
        debug_assert!(
            self.active_level.map_or(true, |cur| self.direction.before(cur, level)),
            "pushed at or before the current level"
        );
        if self.size >= self.max_size {
            return Err(Error::OutOfMemory { bound: self.max_size });
        }
        self.size += 1;
        if let Some((_, bucket)) = self.buckets.iter_mut().find(|(l, _)| *l == level) {
            bucket.push(item);
            return Ok(());
        }
        self.overflow.push(self.direction.key(level), item)
    }

    /// Tops the bucket window up from the level stream, draining overflow
    /// entries that become visible.
    fn refill_window(&mut self) -> Result<()> {
        while self.buckets.len() < self.lookahead {
            let Some(level) = self.levels.pull()? else {
                break;
            };
            let mut bucket = Vec::new();
            let key = self.direction.key(level);
            while self.overflow.peek_key()? == Some(key) {
                bucket.push(self.overflow.pop()?.expect("peeked entry").1);
            }
            self.buckets.push_back((level, bucket));
        }
        Ok(())
    }

    /// The next level with any pending element, without activating it.
    pub fn next_level(&mut self) -> Result<Option<Level>> {
        self.refill_window()?;
        let bucket_level = self.buckets.iter().find(|(_, b)| !b.is_empty()).map(|(l, _)| *l);
        let overflow_key = self.overflow.peek_key()?;
        Ok(match (bucket_level, overflow_key) {
            (Some(b), Some(k)) if k < self.direction.key(b) => self.level_of_key(k),
            (Some(b), _) => Some(b),
            (None, Some(k)) => self.level_of_key(k),
            (None, None) => None,
        })
    }

    fn level_of_key(&self, key: Level) -> Option<Level> {
        Some(match self.direction {
            Direction::Down => key,
            Direction::Up => !key,
        })
    }

    /// Advances to the next level holding a pending element.
    pub fn setup_next_level(&mut self) -> Result<Level> {
        let level = self
            .next_level()?
            .ok_or_else(|| Error::unreachable("setup_next_level on an empty queue"))?;
        self.activate(level)?;
        Ok(level)
    }

    /// Advances to exactly `level`, which may hold no elements. Pending
    /// elements before it are an invariant violation.
    pub fn setup_level(&mut self, level: Level) -> Result<()> {
        if let Some(next) = self.next_level()? {
            if self.direction.before(next, level) {
                return Err(Error::unreachable("pending elements before the requested level"));
            }
        }
        self.activate(level)
    }

    fn activate(&mut self, level: Level) -> Result<()> {
        debug_assert!(!self.can_pull(), "advancing with the current level not drained");
        debug_assert!(
            self.active_level.map_or(true, |cur| self.direction.before(cur, level)),
            "levels must advance in sweep direction"
        );
        self.active.clear();
        self.active_pos = 0;
        self.active_level = Some(level);

        // Discard window entries for skipped levels, take the matching one.
        while let Some(&(l, _)) = self.buckets.front() {
            if self.direction.before(level, l) {
                break;
            }
            let (l, bucket) = self.buckets.pop_front().expect("checked front");
            if l == level {
                self.active = bucket;
            } else {
                debug_assert!(bucket.is_empty(), "skipped a level with pending elements");
            }
        }
        // Pull in overflow entries sitting at this level.
        let key = self.direction.key(level);
        while self.overflow.peek_key()? == Some(key) {
            self.active.push(self.overflow.pop()?.expect("peeked entry").1);
        }
        self.active.sort_unstable_by(C::cmp);
        self.refill_window()
    }

    pub fn current_level(&self) -> Option<Level> {
        self.active_level
    }

    pub fn can_pull(&self) -> bool {
        self.active_pos < self.active.len()
    }

    pub fn peek(&self) -> Option<T> {
        self.active.get(self.active_pos).copied()
    }

    pub fn pull(&mut self) -> Option<T> {
        let item = self.peek()?;
        self.active_pos += 1;
        self.size -= 1;
        Some(item)
    }

    /// Whether any element is pending across all levels.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Pending elements across all levels, the current one included.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Pending elements beyond the current level.
    pub fn size_beyond_level(&self) -> u64 {
        self.size - (self.active.len() - self.active_pos) as u64
    }
}
