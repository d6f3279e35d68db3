//! Merging level streams from several inputs.
//!
//! A sweep's look-ahead needs the union of upcoming levels across its
//! inputs: the level streams of one or two diagrams and possibly a
//! caller-supplied generator of fresh levels. Sources sit behind a small
//! trait object; merging happens well off the per-element hot path.

use strata_core::{Direction, Level, Result};

use crate::stream::RecordStream;

/// One source of levels, already ordered in sweep direction.
pub trait LevelStream {
    fn peek(&mut self) -> Result<Option<Level>>;
    fn pull(&mut self) -> Result<Option<Level>>;
}

/// A generator of levels wrapped as a [`LevelStream`].
pub struct GeneratorLevels<F> {
    gen: F,
    next: Option<Level>,
    primed: bool,
}

impl<F: FnMut() -> Option<Level>> GeneratorLevels<F> {
    pub fn new(gen: F) -> Self {
        GeneratorLevels { gen, next: None, primed: false }
    }

    fn prime(&mut self) {
        if !self.primed {
            self.next = (self.gen)();
            self.primed = true;
        }
    }
}

impl<F: FnMut() -> Option<Level>> LevelStream for GeneratorLevels<F> {
    fn peek(&mut self) -> Result<Option<Level>> {
        self.prime();
        Ok(self.next)
    }

    fn pull(&mut self) -> Result<Option<Level>> {
        self.prime();
        let out = self.next.take();
        if out.is_some() {
            self.next = (self.gen)();
        }
        Ok(out)
    }
}

/// A level-info record stream wrapped as a [`LevelStream`], with an optional
/// shift applied on the fly.
pub struct FileLevels<S> {
    inner: S,
    shift: i64,
}

impl<S: RecordStream<strata_core::LevelInfo>> FileLevels<S> {
    pub fn new(inner: S, shift: i64) -> Self {
        FileLevels { inner, shift }
    }

    fn apply(&self, level: Level) -> Level {
        (level as i64 + self.shift) as Level
    }
}

impl<S: RecordStream<strata_core::LevelInfo>> LevelStream for FileLevels<S> {
    fn peek(&mut self) -> Result<Option<Level>> {
        Ok(self.inner.peek()?.map(|li| self.apply(li.level)))
    }

    fn pull(&mut self) -> Result<Option<Level>> {
        Ok(self.inner.pull()?.map(|li| self.apply(li.level)))
    }
}

/// Enumerates the union of several level streams in sweep direction,
/// without duplicates.
pub struct LevelMerger {
    sources: Vec<Box<dyn LevelStream>>,
    direction: Direction,
}

impl LevelMerger {
    pub fn new(direction: Direction) -> Self {
        LevelMerger { sources: Vec::new(), direction }
    }

    pub fn add(&mut self, source: Box<dyn LevelStream>) {
        self.sources.push(source);
    }

    pub fn with(mut self, source: Box<dyn LevelStream>) -> Self {
        self.add(source);
        self
    }

    pub fn can_pull(&mut self) -> Result<bool> {
        for s in &mut self.sources {
            if s.peek()?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The next level across all sources.
    pub fn peek(&mut self) -> Result<Option<Level>> {
        let mut best: Option<Level> = None;
        for s in &mut self.sources {
            if let Some(l) = s.peek()? {
                best = Some(match best {
                    Some(b) if !self.direction.before(l, b) => b,
                    _ => l,
                });
            }
        }
        Ok(best)
    }

    /// The next level; every source currently at that level advances.
    pub fn pull(&mut self) -> Result<Option<Level>> {
        let Some(min) = self.peek()? else {
            return Ok(None);
        };
        for s in &mut self.sources {
            if s.peek()? == Some(min) {
                s.pull()?;
            }
        }
        Ok(Some(min))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::gen_from_iter;

    fn merger_of(direction: Direction, streams: Vec<Vec<Level>>) -> LevelMerger {
        let mut m = LevelMerger::new(direction);
        for s in streams {
            m.add(Box::new(GeneratorLevels::new(gen_from_iter(s))));
        }
        m
    }

    fn drain(mut m: LevelMerger) -> Vec<Level> {
        let mut out = Vec::new();
        while let Some(l) = m.pull().unwrap() {
            out.push(l);
        }
        out
    }

    #[test]
    fn merges_ascending_without_duplicates() {
        let m = merger_of(Direction::Down, vec![vec![0, 2, 4], vec![1, 2, 5], vec![]]);
        assert_eq!(drain(m), vec![0, 1, 2, 4, 5]);
    }

    #[test]
    fn merges_descending() {
        let m = merger_of(Direction::Up, vec![vec![4, 2, 0], vec![5, 2, 1]]);
        assert_eq!(drain(m), vec![5, 4, 2, 1, 0]);
    }

    #[test]
    fn peek_does_not_advance() {
        let mut m = merger_of(Direction::Down, vec![vec![3, 7]]);
        assert_eq!(m.peek().unwrap(), Some(3));
        assert_eq!(m.peek().unwrap(), Some(3));
        assert_eq!(m.pull().unwrap(), Some(3));
        assert_eq!(m.peek().unwrap(), Some(7));
    }

    #[test]
    fn empty_merger_is_exhausted() {
        let mut m = LevelMerger::new(Direction::Down);
        assert!(!m.can_pull().unwrap());
        assert_eq!(m.pull().unwrap(), None);
    }
}
