//! Levelized arc files: the unreduced output of a top-down sweep.
//!
//! Three streams plus metadata: internal arcs sorted by target, terminal
//! arcs sorted by source, and the per-level widths, all in ascending order
//! as the sweep emits them. Reduce consumes every stream in reverse.
//!
//! Terminal arcs mostly arrive in source order, but quantification splits
//! and intercut emit some late arcs whose sources sit levels above the
//! current one. Those detour through a sorter and merge back into the one
//! sorted terminal stream when the file is sealed.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tempfile::TempPath;

use strata_core::{Arc, ItemCmp, LevelInfo, Result};

use crate::sorter::Sorter;
use crate::stream::{RecordReader, RecordStream, RecordWriter, ReverseRecordReader};

/// Terminal arcs ordered by source.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArcBySource;

impl ItemCmp<Arc> for ArcBySource {
    fn cmp(a: &Arc, b: &Arc) -> Ordering {
        (a.source, a.target).cmp(&(b.source, b.target))
    }
}

/// Sidecar metadata of an arc file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArcFileMeta {
    pub internal_count: u64,
    /// Terminal arcs per terminal value.
    pub terminal_counts: [u64; 2],
    pub level_count: u64,
    /// Maximum number of pending requests the producing sweep observed at
    /// any level boundary; an upper bound on the unreduced 1-level cut.
    pub max_1level_cut: u64,
}

impl ArcFileMeta {
    /// All arcs in the file.
    pub fn arc_count(&self) -> u64 {
        self.internal_count + self.terminal_counts[0] + self.terminal_counts[1]
    }
}

/// A sealed levelized arc file.
pub struct ArcFile {
    pub meta: ArcFileMeta,
    internal: TempPath,
    terminal: TempPath,
    levels: TempPath,
}

impl ArcFile {
    /// Internal arcs, descending by target.
    pub fn internal_bottomup(&self) -> Result<ReverseRecordReader<Arc>> {
        ReverseRecordReader::open(&self.internal, self.meta.internal_count)
    }

    /// Terminal arcs, descending by source.
    pub fn terminal_bottomup(&self) -> Result<ReverseRecordReader<Arc>> {
        ReverseRecordReader::open(&self.terminal, self.meta.terminal_counts[0] + self.meta.terminal_counts[1])
    }

    /// Levels, descending (reverse of emission order).
    pub fn levels_bottomup(&self) -> Result<ReverseRecordReader<LevelInfo>> {
        ReverseRecordReader::open(&self.levels, self.meta.level_count)
    }
}

impl std::fmt::Debug for ArcFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArcFile").field("meta", &self.meta).finish()
    }
}

/// Streams a sweep's arcs into a fresh arc file.
pub struct ArcWriter {
    internal: RecordWriter<Arc>,
    terminal: RecordWriter<Arc>,
    late_terminal: Sorter<Arc, ArcBySource>,
    last_terminal_source: Option<strata_core::Ptr>,
    levels: RecordWriter<LevelInfo>,
    terminal_counts: [u64; 2],
    max_1level_cut: u64,
}

impl ArcWriter {
    pub fn new() -> Result<Self> {
        Ok(ArcWriter {
            internal: RecordWriter::create()?,
            terminal: RecordWriter::create()?,
            late_terminal: Sorter::new(),
            last_terminal_source: None,
            levels: RecordWriter::create()?,
            terminal_counts: [0, 0],
            max_1level_cut: 0,
        })
    }

    /// Appends an internal arc; targets must arrive in ascending order.
    pub fn push_internal(&mut self, arc: Arc) -> Result<()> {
        debug_assert!(!arc.target.is_terminal());
        self.internal.push(&arc)
    }

    /// Appends a terminal arc. Sources that run backwards detour through
    /// the late sorter.
    pub fn push_terminal(&mut self, arc: Arc) -> Result<()> {
        debug_assert!(arc.target.is_terminal());
        self.terminal_counts[arc.target.value() as usize] += 1;
        if self.last_terminal_source.map_or(false, |last| arc.source < last) {
            return self.late_terminal.push(arc);
        }
        self.last_terminal_source = Some(arc.source);
        self.terminal.push(&arc)
    }

    /// Appends a level record; levels must arrive in ascending order.
    pub fn push_level(&mut self, info: LevelInfo) -> Result<()> {
        self.levels.push(&info)
    }

    /// Folds one level boundary's pending-request count into the cut bound.
    pub fn observe_cut(&mut self, pending: u64) {
        self.max_1level_cut = self.max_1level_cut.max(pending);
    }

    /// Arcs written so far.
    pub fn len(&self) -> u64 {
        self.internal.len() + self.terminal_counts[0] + self.terminal_counts[1]
    }

    pub fn terminal_counts(&self) -> [u64; 2] {
        self.terminal_counts
    }

    pub fn seal(mut self) -> Result<ArcFile> {
        // The root arc entering from nil never dominates the cut.
        let non_terminal = self.internal.len();
        self.max_1level_cut = self.max_1level_cut.min(non_terminal.max(1));

        let terminal = if self.late_terminal.is_empty() {
            self.terminal.finish()?
        } else {
            // Merge the in-order stream with the late stragglers into one
            // source-sorted stream.
            tracing::debug!(late = self.late_terminal.len(), "merging late terminal arcs");
            let (in_order_path, in_order_len) = self.terminal.finish()?;
            let mut in_order = RecordReader::<Arc>::open(&in_order_path, in_order_len)?;
            let mut late = self.late_terminal.into_stream()?;
            let mut merged = RecordWriter::<Arc>::create()?;
            loop {
                let pick_late = match (in_order.peek()?, late.peek()?) {
                    (None, None) => break,
                    (None, Some(_)) => true,
                    (Some(_), None) => false,
                    (Some(a), Some(b)) => ArcBySource::cmp(&b, &a) == Ordering::Less,
                };
                let arc = if pick_late { late.pull()? } else { in_order.pull()? };
                merged.push(&arc.expect("peeked arc"))?;
            }
            merged.finish()?
        };

        let meta = ArcFileMeta {
            internal_count: self.internal.len(),
            terminal_counts: self.terminal_counts,
            level_count: self.levels.len(),
            max_1level_cut: self.max_1level_cut,
        };
        let (internal, _) = self.internal.finish()?;
        let (levels, _) = self.levels.finish()?;
        tracing::debug!(
            internal = meta.internal_count,
            terminal = meta.terminal_counts[0] + meta.terminal_counts[1],
            levels = meta.level_count,
            "sealed arc file"
        );
        Ok(ArcFile { meta, internal, terminal: terminal.0, levels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{Ptr, Uid};

    fn internal_arc(sl: u32, sid: u64, hi: bool, tl: u32, tid: u64) -> Arc {
        Arc::new(Uid::new(sl, sid).with_out_idx(hi), Uid::new(tl, tid).as_ptr())
    }

    fn terminal_arc(sl: u32, sid: u64, hi: bool, v: bool) -> Arc {
        Arc::new(Uid::new(sl, sid).with_out_idx(hi), Ptr::terminal(v))
    }

    #[test]
    fn reverse_readers_see_deepest_first() {
        let mut w = ArcWriter::new().unwrap();
        w.push_internal(internal_arc(0, 0, false, 1, 0)).unwrap();
        w.push_level(LevelInfo::new(0, 1)).unwrap();
        w.push_terminal(terminal_arc(1, 0, false, false)).unwrap();
        w.push_terminal(terminal_arc(1, 0, true, true)).unwrap();
        w.push_level(LevelInfo::new(1, 1)).unwrap();
        let f = w.seal().unwrap();

        assert_eq!(f.meta.internal_count, 1);
        assert_eq!(f.meta.terminal_counts, [1, 1]);

        let mut t = f.terminal_bottomup().unwrap();
        assert!(t.pull().unwrap().unwrap().out_idx());
        assert!(!t.pull().unwrap().unwrap().out_idx());

        let mut l = f.levels_bottomup().unwrap();
        assert_eq!(l.pull().unwrap().unwrap().level, 1);
        assert_eq!(l.pull().unwrap().unwrap().level, 0);
    }

    #[test]
    fn late_terminal_arcs_merge_into_source_order() {
        let mut w = ArcWriter::new().unwrap();
        w.push_terminal(terminal_arc(1, 0, false, true)).unwrap();
        w.push_terminal(terminal_arc(2, 0, false, true)).unwrap();
        // A straggler whose source sits above already-written ones.
        w.push_terminal(terminal_arc(0, 0, true, false)).unwrap();
        w.push_terminal(terminal_arc(2, 1, false, true)).unwrap();
        let f = w.seal().unwrap();

        let mut t = f.terminal_bottomup().unwrap();
        let mut sources = Vec::new();
        while let Some(a) = t.pull().unwrap() {
            sources.push(a.source);
        }
        let mut expect = sources.clone();
        expect.sort();
        expect.reverse();
        assert_eq!(sources, expect);
        assert_eq!(sources.len(), 4);
    }

    #[test]
    fn cut_observation_keeps_the_maximum() {
        let mut w = ArcWriter::new().unwrap();
        w.push_internal(internal_arc(0, 0, false, 1, 0)).unwrap();
        w.push_internal(internal_arc(0, 0, true, 1, 1)).unwrap();
        w.observe_cut(2);
        w.observe_cut(1);
        let f = w.seal().unwrap();
        assert_eq!(f.meta.max_1level_cut, 2);
    }
}
