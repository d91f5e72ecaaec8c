//! Trace stream records and the NDJSON writer.
//!
//! Line 1 is a header with the format version and run metadata. Every
//! following line is one event:
//!
//! ```text
//! {"format_version":1,"run_id":"4242_1700000000000","timestamp_ms":1700000000000}
//! {"kind":"thread_name","tid":1,"name":"main"}
//! {"kind":"scope_start","tid":1,"name":"load","ts_ns":1200}
//! {"kind":"instant","tid":1,"name":"cache miss","ts_ns":1900}
//! {"kind":"scope_end","tid":1,"ts_ns":5400}
//! ```
//!
//! Hand-written JSON via `write!()` keeps serialization off the producer's
//! dependency graph; the reader side uses serde.

use std::borrow::Cow;
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

/// Version stamped into the header line. Readers reject anything else.
pub const FORMAT_VERSION: u32 = 1;

/// Discriminant of an [`Event`], mirrored by the `kind` field on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ThreadName,
    ScopeStart,
    ScopeEnd,
    Instant,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ThreadName => "thread_name",
            EventKind::ScopeStart => "scope_start",
            EventKind::ScopeEnd => "scope_end",
            EventKind::Instant => "instant",
        }
    }
}

/// One immutable entry of the trace stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ThreadName {
        tid: u64,
        name: Cow<'static, str>,
    },
    ScopeStart {
        tid: u64,
        name: Cow<'static, str>,
        ts_ns: u64,
    },
    ScopeEnd {
        tid: u64,
        ts_ns: u64,
    },
    Instant {
        tid: u64,
        name: Cow<'static, str>,
        ts_ns: u64,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ThreadName { .. } => EventKind::ThreadName,
            Event::ScopeStart { .. } => EventKind::ScopeStart,
            Event::ScopeEnd { .. } => EventKind::ScopeEnd,
            Event::Instant { .. } => EventKind::Instant,
        }
    }

    pub fn tid(&self) -> u64 {
        match *self {
            Event::ThreadName { tid, .. }
            | Event::ScopeStart { tid, .. }
            | Event::ScopeEnd { tid, .. }
            | Event::Instant { tid, .. } => tid,
        }
    }

    /// Timestamp in nanoseconds, `None` for thread names.
    pub fn timestamp_ns(&self) -> Option<u64> {
        match *self {
            Event::ThreadName { .. } => None,
            Event::ScopeStart { ts_ns, .. }
            | Event::ScopeEnd { ts_ns, .. }
            | Event::Instant { ts_ns, .. } => Some(ts_ns),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Event::ThreadName { name, .. }
            | Event::ScopeStart { name, .. }
            | Event::Instant { name, .. } => Some(name),
            Event::ScopeEnd { .. } => None,
        }
    }
}

/// Appends events to an underlying writer, one JSON object per line.
pub struct TraceWriter<W: Write> {
    out: W,
    events_written: u64,
}

impl<W: Write> TraceWriter<W> {
    /// Wrap `out` and emit the header line.
    pub fn new(mut out: W) -> io::Result<Self> {
        writeln!(
            out,
            "{{\"format_version\":{},\"run_id\":\"{}\",\"timestamp_ms\":{}}}",
            FORMAT_VERSION,
            run_id(),
            timestamp_ms()
        )?;
        Ok(Self {
            out,
            events_written: 0,
        })
    }

    pub fn write_event(&mut self, event: &Event) -> io::Result<()> {
        let out = &mut self.out;
        write!(
            out,
            "{{\"kind\":\"{}\",\"tid\":{}",
            event.kind().as_str(),
            event.tid()
        )?;
        if let Some(name) = event.name() {
            write!(out, ",\"name\":")?;
            write_json_str(out, name)?;
        }
        if let Some(ts_ns) = event.timestamp_ns() {
            write!(out, ",\"ts_ns\":{}", ts_ns)?;
        }
        writeln!(out, "}}")?;
        self.events_written += 1;
        Ok(())
    }

    pub fn write_all<'a>(&mut self, events: impl IntoIterator<Item = &'a Event>) -> io::Result<()> {
        for event in events {
            self.write_event(event)?;
        }
        Ok(())
    }

    pub fn events_written(&self) -> u64 {
        self.events_written
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Write `s` as a quoted JSON string.
fn write_json_str<W: Write>(out: &mut W, s: &str) -> io::Result<()> {
    out.write_all(b"\"")?;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        let escaped: Option<&str> = match c {
            '"' => Some("\\\""),
            '\\' => Some("\\\\"),
            '\n' => Some("\\n"),
            '\r' => Some("\\r"),
            '\t' => Some("\\t"),
            _ => None,
        };
        if escaped.is_none() && (c as u32) >= 0x20 {
            continue;
        }
        out.write_all(s[start..i].as_bytes())?;
        match escaped {
            Some(e) => out.write_all(e.as_bytes())?,
            None => write!(out, "\\u{:04x}", c as u32)?,
        }
        start = i + c.len_utf8();
    }
    out.write_all(s[start..].as_bytes())?;
    out.write_all(b"\"")
}

/// Process id plus wall-clock milliseconds, unique enough to tell runs apart.
fn run_id() -> String {
    format!("{}_{}", std::process::id(), timestamp_ms())
}

fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}
