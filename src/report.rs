//! Reconstructed, immutable view of a trace.
//!
//! Records live in one arena owned by the [`Report`] and refer to their
//! children by [`RecordId`]. The loader only allocates a record once it is
//! complete, so every child sits at a lower index than its parent; bottom-up
//! passes are a single forward scan over [`Report::records`].

use std::collections::BTreeMap;

/// Index of a record in [`Report::records`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub(crate) u32);

impl RecordId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Thread identity as written by the recorder.
pub type ThreadId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A completed begin/end interval.
    Scope,
    /// A point event, stored as a zero-width record.
    Instant,
}

/// One completed interval of work. Times are seconds from the trace epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: String,
    pub kind: RecordKind,
    pub time_start: f64,
    pub time_end: f64,
    /// Direct children, ordered by start time and non-overlapping.
    pub enclosed: Vec<RecordId>,
}

impl Record {
    pub fn duration(&self) -> f64 {
        self.time_end - self.time_start
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    pub id: ThreadId,
    pub name: String,
    /// Top-level records in start order.
    pub records: Vec<RecordId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub(crate) start_time: f64,
    pub(crate) end_time: f64,
    pub(crate) threads: BTreeMap<ThreadId, Thread>,
    pub(crate) records: Vec<Record>,
}

impl Report {
    /// Earliest record start, 0 for an empty report.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Latest record end, 0 for an empty report.
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn threads(&self) -> &BTreeMap<ThreadId, Thread> {
        &self.threads
    }

    pub fn thread(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.get(&id)
    }

    /// # Panics
    ///
    /// Panics if `id` was not issued by this report. Use [`Report::get`] for
    /// ids of unknown origin.
    pub fn record(&self, id: RecordId) -> &Record {
        &self.records[id.index()]
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.get(id.index())
    }

    /// The whole arena, children before parents.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Pre-order walk over one thread's trees, yielding `(depth, id)` with
    /// top-level records at depth 0.
    pub fn walk<'a>(&'a self, thread: &'a Thread) -> Walk<'a> {
        Walk {
            report: self,
            stack: thread.records.iter().rev().map(|&id| (0, id)).collect(),
        }
    }
}

/// Iterator returned by [`Report::walk`].
pub struct Walk<'a> {
    report: &'a Report,
    stack: Vec<(usize, RecordId)>,
}

impl Iterator for Walk<'_> {
    type Item = (usize, RecordId);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, id) = self.stack.pop()?;
        let children = &self.report.record(id).enclosed;
        self.stack
            .extend(children.iter().rev().map(|&child| (depth + 1, child)));
        Some((depth, id))
    }
}
