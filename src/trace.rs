//! Reading trace streams written by spanline-runtime.

use std::borrow::Cow;
use std::io::BufRead;
use std::path::Path;

use spanline_runtime::{Event, FORMAT_VERSION};

use crate::error::Error;

/// First line of every trace file.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TraceHeader {
    pub format_version: u32,
    #[serde(default)]
    pub run_id: Option<String>,
    pub timestamp_ms: u64,
}

/// One event line as it appears on disk.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RawEvent {
    ThreadName { tid: u64, name: String },
    ScopeStart { tid: u64, name: String, ts_ns: u64 },
    ScopeEnd { tid: u64, ts_ns: u64 },
    Instant { tid: u64, name: String, ts_ns: u64 },
}

impl From<RawEvent> for Event {
    fn from(raw: RawEvent) -> Self {
        match raw {
            RawEvent::ThreadName { tid, name } => Event::ThreadName {
                tid,
                name: Cow::Owned(name),
            },
            RawEvent::ScopeStart { tid, name, ts_ns } => Event::ScopeStart {
                tid,
                name: Cow::Owned(name),
                ts_ns,
            },
            RawEvent::ScopeEnd { tid, ts_ns } => Event::ScopeEnd { tid, ts_ns },
            RawEvent::Instant { tid, name, ts_ns } => Event::Instant {
                tid,
                name: Cow::Owned(name),
                ts_ns,
            },
        }
    }
}

/// A fully read trace stream, in file order.
#[derive(Debug, Clone)]
pub struct Trace {
    pub header: TraceHeader,
    pub events: Vec<Event>,
}

/// Read a trace file from disk.
pub fn read_trace(path: &Path) -> Result<Trace, Error> {
    let file = std::fs::File::open(path).map_err(|source| Error::TraceReadError {
        path: path.to_path_buf(),
        source,
    })?;
    parse_trace(std::io::BufReader::new(file), path)
}

/// Parse a trace stream. `path` is only used in error messages.
pub fn parse_trace<R: BufRead>(reader: R, path: &Path) -> Result<Trace, Error> {
    let mut header: Option<TraceHeader> = None;
    let mut events = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| Error::TraceReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if header.is_none() {
            let h: TraceHeader =
                serde_json::from_str(line).map_err(|e| Error::UnsupportedFormat {
                    path: path.to_path_buf(),
                    reason: format!("missing or invalid header: {e}"),
                })?;
            if h.format_version != FORMAT_VERSION {
                return Err(Error::UnsupportedFormat {
                    path: path.to_path_buf(),
                    reason: format!(
                        "format_version {} (expected {FORMAT_VERSION})",
                        h.format_version
                    ),
                });
            }
            header = Some(h);
            continue;
        }

        let raw: RawEvent = serde_json::from_str(line).map_err(|e| Error::InvalidTraceData {
            path: path.to_path_buf(),
            line: index + 1,
            reason: e.to_string(),
        })?;
        events.push(raw.into());
    }

    let header = header.ok_or_else(|| Error::UnsupportedFormat {
        path: path.to_path_buf(),
        reason: "empty trace".into(),
    })?;
    Ok(Trace { header, events })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const HEADER: &str = r#"{"format_version":1,"run_id":"1_2","timestamp_ms":1700000000000}"#;

    fn parse(text: &str) -> Result<Trace, Error> {
        parse_trace(text.as_bytes(), Path::new("mem.trace"))
    }

    #[test]
    fn parses_every_event_kind() {
        let text = format!(
            "{HEADER}\n\
             {{\"kind\":\"thread_name\",\"tid\":1,\"name\":\"main\"}}\n\
             {{\"kind\":\"scope_start\",\"tid\":1,\"name\":\"load\",\"ts_ns\":10}}\n\
             \n\
             {{\"kind\":\"instant\",\"tid\":1,\"name\":\"hit\",\"ts_ns\":15}}\n\
             {{\"kind\":\"scope_end\",\"tid\":1,\"ts_ns\":20}}\n"
        );
        let trace = parse(&text).unwrap();
        assert_eq!(trace.header.format_version, 1);
        assert_eq!(trace.header.run_id.as_deref(), Some("1_2"));
        assert_eq!(
            trace.events,
            vec![
                Event::ThreadName {
                    tid: 1,
                    name: "main".into(),
                },
                Event::ScopeStart {
                    tid: 1,
                    name: "load".into(),
                    ts_ns: 10,
                },
                Event::Instant {
                    tid: 1,
                    name: "hit".into(),
                    ts_ns: 15,
                },
                Event::ScopeEnd { tid: 1, ts_ns: 20 },
            ]
        );
    }

    #[test]
    fn rejects_unknown_version() {
        let text = r#"{"format_version":99,"timestamp_ms":0}"#;
        let err = parse(text).unwrap_err();
        assert!(err.to_string().contains("format_version 99"), "unexpected error: {err}");
    }

    #[test]
    fn rejects_missing_header() {
        let err = parse(r#"{"kind":"scope_end","tid":1,"ts_ns":20}"#).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }), "{err}");
        assert!(matches!(parse("").unwrap_err(), Error::UnsupportedFormat { .. }));
    }

    #[test]
    fn reports_line_of_corrupt_event() {
        let text = format!(
            "{HEADER}\n{{\"kind\":\"scope_end\",\"tid\":1,\"ts_ns\":1}}\n{{\"kind\":\"bogus\"}}\n"
        );
        match parse(&text).unwrap_err() {
            Error::InvalidTraceData { line, .. } => assert_eq!(line, 3),
            other => panic!("expected InvalidTraceData, got {other}"),
        }
    }

    #[test]
    fn read_trace_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_trace(&dir.path().join("nope.trace")).unwrap_err();
        assert!(matches!(err, Error::TraceReadError { .. }), "{err}");
    }

    #[test]
    fn read_trace_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.trace");
        fs::write(
            &path,
            format!("{HEADER}\n{{\"kind\":\"thread_name\",\"tid\":4,\"name\":\"io\"}}\n"),
        )
        .unwrap();
        let trace = read_trace(&path).unwrap();
        assert_eq!(trace.events.len(), 1);
        assert_eq!(trace.events[0].tid(), 4);
    }
}
