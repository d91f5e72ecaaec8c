//! Rebuild per-thread call trees from a flat trace stream.
//!
//! Events are partitioned by thread (cross-thread interleaving carries no
//! meaning) and each thread is replayed once against an explicit stack of
//! open records: a start pushes, an end pops and attaches the completed
//! record to the new top or to the thread's top level, an instant attaches a
//! zero-width record the same way. No recursion, so nesting depth is bounded
//! only by memory.
//!
//! Timestamps are clamped to be non-decreasing per thread before use, which
//! keeps containment and sibling ordering intact even for a misbehaving
//! clock.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use spanline_runtime::Event;

use crate::error::Error;
use crate::report::{Record, RecordId, RecordKind, Report, Thread, ThreadId};
use crate::trace::read_trace;

/// What to do with a thread whose events do not form a well-nested stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Ignore unmatched ends, drop unterminated records and keep their
    /// completed children at the thread's top level.
    #[default]
    Truncate,
    /// Leave the whole thread out of the report.
    DropThread,
    /// Abort the load on the first problem.
    Fail,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub malformed: MalformedPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IssueKind {
    /// A scope end with no open scope on its thread.
    UnmatchedEnd { at: f64 },
    /// A scope still open when the stream ended.
    Unterminated { name: String, start: f64 },
}

/// A structural problem found while rebuilding one thread.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralIssue {
    pub thread: ThreadId,
    pub kind: IssueKind,
}

impl fmt::Display for StructuralIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IssueKind::UnmatchedEnd { at } => write!(
                f,
                "thread {}: scope end at {at:.9}s has no matching start",
                self.thread
            ),
            IssueKind::Unterminated { name, start } => write!(
                f,
                "thread {}: scope '{name}' started at {start:.9}s never ended",
                self.thread
            ),
        }
    }
}

/// A report plus whatever had to be repaired to build it.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub report: Report,
    pub issues: Vec<StructuralIssue>,
}

/// Read the trace at `path` and rebuild its report.
pub fn load_trace(path: &Path, options: &LoadOptions) -> Result<Loaded, Error> {
    let trace = read_trace(path)?;
    tracing::debug!(
        path = %path.display(),
        events = trace.events.len(),
        run_id = trace.header.run_id.as_deref().unwrap_or("-"),
        "trace read"
    );
    build_report(trace.events, options)
}

/// Rebuild a report from events in stream order.
pub fn build_report<I>(events: I, options: &LoadOptions) -> Result<Loaded, Error>
where
    I: IntoIterator<Item = Event>,
{
    let mut per_thread: BTreeMap<ThreadId, Vec<Event>> = BTreeMap::new();
    for event in events {
        per_thread.entry(event.tid()).or_default().push(event);
    }

    let mut records: Vec<Record> = Vec::new();
    let mut threads: BTreeMap<ThreadId, Thread> = BTreeMap::new();
    let mut issues: Vec<StructuralIssue> = Vec::new();

    for (tid, events) in per_thread {
        let arena_mark = records.len();
        let built = build_thread(tid, events, &mut records);

        for issue in &built.issues {
            tracing::warn!("{issue}");
        }
        if let Some(first) = built.issues.first() {
            match options.malformed {
                MalformedPolicy::Fail => return Err(Error::MalformedTrace(first.to_string())),
                MalformedPolicy::DropThread => {
                    records.truncate(arena_mark);
                    issues.extend(built.issues);
                    continue;
                }
                MalformedPolicy::Truncate => {}
            }
        }
        issues.extend(built.issues);
        threads.insert(tid, built.thread);
    }

    let (start_time, end_time) = if records.is_empty() {
        (0.0, 0.0)
    } else {
        records
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
                (lo.min(r.time_start), hi.max(r.time_end))
            })
    };

    Ok(Loaded {
        report: Report {
            start_time,
            end_time,
            threads,
            records,
        },
        issues,
    })
}

struct OpenRecord {
    name: String,
    start: f64,
    enclosed: Vec<RecordId>,
}

struct BuiltThread {
    thread: Thread,
    issues: Vec<StructuralIssue>,
}

fn build_thread(tid: ThreadId, events: Vec<Event>, records: &mut Vec<Record>) -> BuiltThread {
    let mut stack: Vec<OpenRecord> = Vec::new();
    let mut roots: Vec<RecordId> = Vec::new();
    let mut name: Option<String> = None;
    let mut issues = Vec::new();
    let mut last_ts = 0u64;

    let mut clamp = |ts: u64| {
        last_ts = last_ts.max(ts);
        last_ts as f64 / 1e9
    };

    for event in events {
        match event {
            Event::ThreadName { name: n, .. } => name = Some(n.into_owned()),
            Event::ScopeStart { name, ts_ns, .. } => stack.push(OpenRecord {
                name: name.into_owned(),
                start: clamp(ts_ns),
                enclosed: Vec::new(),
            }),
            Event::ScopeEnd { ts_ns, .. } => {
                let end = clamp(ts_ns);
                let Some(open) = stack.pop() else {
                    issues.push(StructuralIssue {
                        thread: tid,
                        kind: IssueKind::UnmatchedEnd { at: end },
                    });
                    continue;
                };
                let id = alloc(
                    records,
                    Record {
                        name: open.name,
                        kind: RecordKind::Scope,
                        time_start: open.start,
                        time_end: end,
                        enclosed: open.enclosed,
                    },
                );
                attach(&mut stack, &mut roots, id);
            }
            Event::Instant { name, ts_ns, .. } => {
                let at = clamp(ts_ns);
                let id = alloc(
                    records,
                    Record {
                        name: name.into_owned(),
                        kind: RecordKind::Instant,
                        time_start: at,
                        time_end: at,
                        enclosed: Vec::new(),
                    },
                );
                attach(&mut stack, &mut roots, id);
            }
        }
    }

    // Bottom of the stack first: each open record's completed children
    // precede everything recorded under the records opened after it.
    for open in stack {
        issues.push(StructuralIssue {
            thread: tid,
            kind: IssueKind::Unterminated {
                name: open.name,
                start: open.start,
            },
        });
        roots.extend(open.enclosed);
    }

    BuiltThread {
        thread: Thread {
            id: tid,
            name: name.unwrap_or_else(|| format!("thread {tid}")),
            records: roots,
        },
        issues,
    }
}

fn alloc(records: &mut Vec<Record>, record: Record) -> RecordId {
    let id = RecordId(records.len() as u32);
    records.push(record);
    id
}

fn attach(stack: &mut [OpenRecord], roots: &mut Vec<RecordId>, id: RecordId) {
    match stack.last_mut() {
        Some(parent) => parent.enclosed.push(id),
        None => roots.push(id),
    }
}
