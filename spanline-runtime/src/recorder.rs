//! Per-thread event recorder with RAII scope guards.
//!
//! Instrumented code calls `begin_scope(name)` / `end_scope(handle)` (or the
//! `scope()` guard that pairs them) and `log_event(name)`. Every call appends
//! to a buffer owned by the calling thread; nothing crosses threads on the hot
//! path.
//!
//! Flush strategy: each thread's events live in an `Arc<Mutex<ThreadBuffer>>`
//! registered in the recorder's `threads` Vec on the thread's first call. The
//! per-thread mutex is only ever contended by `flush()`/`shutdown()`.
//! `shutdown()` walks every registered buffer, closes it, drains it and writes
//! the result to the trace stream, so each buffered event is written exactly
//! once, including events from pool workers whose TLS destructors never run.
//!
//! Several recorders may coexist (tests do this); the thread-local lookup
//! table is keyed by recorder id.

use std::borrow::Cow;
use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock::{Clock, MonotonicClock};
use crate::stream::{Event, TraceWriter};

/// What `end_scope` does with an interval whose start and end timestamps
/// are identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroLengthPolicy {
    /// Keep every interval.
    Allow,
    /// Drop intervals that measured zero time.
    #[default]
    Skip,
}

/// Construction-time recorder settings.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Default policy for scopes opened without an explicit one.
    pub zero_length: ZeroLengthPolicy,
    /// Initial capacity, in events, of each thread's buffer.
    pub buffer_capacity: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            zero_length: ZeroLengthPolicy::Skip,
            buffer_capacity: 4096,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("recorder is already initialized")]
    AlreadyInitialized,

    #[error("recorder has not been initialized")]
    NotInitialized,

    #[error("recorder has already been shut down")]
    AlreadyShutDown,

    #[error("scope is not the innermost open scope of the calling thread")]
    ScopeNotOpen,

    #[error("failed to create trace file {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write trace stream: {0}")]
    Io(#[from] io::Error),
}

/// Totals reported by a successful `shutdown()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownStats {
    pub threads: usize,
    pub events: u64,
}

const CREATED: u8 = 0;
const ACTIVE: u8 = 1;
const SHUT_DOWN: u8 = 2;

static NEXT_RECORDER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Events buffered by one thread for one recorder.
struct ThreadBuffer {
    tid: u64,
    events: Vec<Event>,
    /// Number of events already drained to the stream by `flush()`; never
    /// past the outermost open ScopeStart.
    flushed: usize,
    /// Absolute stream positions of the ScopeStart events still open.
    open: Vec<usize>,
    /// Set by `shutdown()`; later pushes are discarded.
    closed: bool,
}

impl ThreadBuffer {
    fn position(&self) -> usize {
        self.flushed + self.events.len()
    }
}

type ThreadBufferArc = Arc<Mutex<ThreadBuffer>>;

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
    static BUFFERS: RefCell<Vec<(u64, ThreadBufferArc)>> = RefCell::new(Vec::new());
}

/// Process-unique id of the calling thread, as written to the trace stream.
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}

struct Inner {
    id: u64,
    config: RecorderConfig,
    clock: Arc<dyn Clock>,
    state: AtomicU8,
    sink: Mutex<Option<TraceWriter<BufWriter<File>>>>,
    threads: Mutex<Vec<ThreadBufferArc>>,
}

/// Recorder context. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Recorder {
    inner: Arc<Inner>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new(RecorderConfig::default())
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state.load(Ordering::Relaxed))
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Token for an open scope, returned by `begin_scope` and consumed by
/// `end_scope`. Consuming it makes a second close impossible.
#[must_use = "an unclosed scope is reported as unterminated when the trace is loaded"]
#[derive(Debug)]
pub struct ScopeHandle {
    recorder_id: u64,
    tid: u64,
    /// `None` when the recorder was inactive at `begin_scope`.
    position: Option<usize>,
    start_ns: u64,
    policy: ZeroLengthPolicy,
}

impl ScopeHandle {
    pub fn start_ns(&self) -> u64 {
        self.start_ns
    }

    pub fn policy(&self) -> ZeroLengthPolicy {
        self.policy
    }
}

impl Recorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(config: RecorderConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_RECORDER_ID.fetch_add(1, Ordering::Relaxed),
                config,
                clock,
                state: AtomicU8::new(CREATED),
                sink: Mutex::new(None),
                threads: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.inner.config
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == ACTIVE
    }

    /// Current reading of the recorder's clock.
    pub fn now_ns(&self) -> u64 {
        self.inner.clock.now_ns()
    }

    /// Create the trace file at `path` and start accepting events.
    pub fn initialize(&self, path: impl AsRef<Path>) -> Result<(), RecorderError> {
        let path = path.as_ref();
        let mut sink = self.inner.sink.lock().unwrap_or_else(|e| e.into_inner());
        match self.inner.state.load(Ordering::Acquire) {
            ACTIVE => return Err(RecorderError::AlreadyInitialized),
            SHUT_DOWN => return Err(RecorderError::AlreadyShutDown),
            _ => {}
        }

        let file = File::create(path).map_err(|source| RecorderError::Create {
            path: path.to_path_buf(),
            source,
        })?;
        *sink = Some(TraceWriter::new(BufWriter::new(file))?);
        self.inner.state.store(ACTIVE, Ordering::Release);
        tracing::debug!(
            path = %path.display(),
            recorder = self.inner.id,
            "trace recording started"
        );
        Ok(())
    }

    /// Flush every thread's buffered events and close the trace stream.
    ///
    /// Must not race with producers still recording: events pushed after a
    /// thread's buffer has been drained are discarded.
    pub fn shutdown(&self) -> Result<ShutdownStats, RecorderError> {
        if let Err(state) = self.inner.state.compare_exchange(
            ACTIVE,
            SHUT_DOWN,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(match state {
                CREATED => RecorderError::NotInitialized,
                _ => RecorderError::AlreadyShutDown,
            });
        }

        // Drain under the registry lock so a thread registering concurrently
        // is either drained here or refused by `register_thread`.
        let mut drained: Vec<Vec<Event>> = Vec::new();
        {
            let mut threads = self.inner.threads.lock().unwrap_or_else(|e| e.into_inner());
            for arc in threads.iter() {
                let mut buf = arc.lock().unwrap_or_else(|e| e.into_inner());
                buf.closed = true;
                buf.open.clear();
                drained.push(std::mem::take(&mut buf.events));
            }
            threads.clear();
        }

        let mut sink = self.inner.sink.lock().unwrap_or_else(|e| e.into_inner());
        let Some(mut writer) = sink.take() else {
            return Err(RecorderError::NotInitialized);
        };
        for events in &drained {
            writer.write_all(events)?;
        }
        let stats = ShutdownStats {
            threads: drained.len(),
            events: writer.events_written(),
        };
        writer.finish()?;
        tracing::debug!(
            threads = stats.threads,
            events = stats.events,
            recorder = self.inner.id,
            "trace recording finished"
        );
        Ok(stats)
    }

    /// Write the calling thread's completed events to the stream now.
    ///
    /// Only the prefix before the outermost open ScopeStart is written, so a
    /// scope still open can be retracted by the zero-length policy.
    pub fn flush(&self) -> Result<(), RecorderError> {
        self.check_active()?;
        let flushed = self.with_buffer(|buf| -> Result<(), RecorderError> {
            let ready = match buf.open.first() {
                Some(&outermost) => outermost - buf.flushed,
                None => buf.events.len(),
            };
            if ready == 0 {
                return Ok(());
            }
            let mut sink = self.inner.sink.lock().unwrap_or_else(|e| e.into_inner());
            let writer = sink.as_mut().ok_or(RecorderError::AlreadyShutDown)?;
            writer.write_all(&buf.events[..ready])?;
            writer.flush()?;
            buf.events.drain(..ready);
            buf.flushed += ready;
            Ok(())
        });
        flushed.unwrap_or(Ok(()))
    }

    pub fn begin_scope(&self, name: impl Into<Cow<'static, str>>) -> ScopeHandle {
        self.begin_scope_with(name, self.inner.config.zero_length)
    }

    pub fn begin_scope_with(
        &self,
        name: impl Into<Cow<'static, str>>,
        policy: ZeroLengthPolicy,
    ) -> ScopeHandle {
        let tid = current_thread_id();
        let clock = &self.inner.clock;
        let opened = self.with_buffer(|buf| {
            let start_ns = clock.now_ns();
            let position = buf.position();
            buf.events.push(Event::ScopeStart {
                tid,
                name: name.into(),
                ts_ns: start_ns,
            });
            buf.open.push(position);
            (position, start_ns)
        });

        let (position, start_ns) = match opened {
            Some((position, start_ns)) => (Some(position), start_ns),
            None => (None, 0),
        };
        ScopeHandle {
            recorder_id: self.inner.id,
            tid,
            position,
            start_ns,
            policy,
        }
    }

    pub fn end_scope(&self, handle: ScopeHandle) -> Result<(), RecorderError> {
        let end_ns = self.inner.clock.now_ns();
        self.check_active()?;
        let owned = handle.recorder_id == self.inner.id && handle.tid == current_thread_id();
        let position = match handle.position {
            Some(p) if owned => p,
            _ => return Err(RecorderError::ScopeNotOpen),
        };

        let ended = self.with_buffer(|buf| {
            if buf.open.last() != Some(&position) {
                return Err(RecorderError::ScopeNotOpen);
            }
            buf.open.pop();

            // Open starts are never flushed, so the start is still buffered.
            if handle.policy == ZeroLengthPolicy::Skip && end_ns == handle.start_ns {
                // Anything recorded after the start shares its timestamp and
                // moves up one level.
                buf.events.remove(position - buf.flushed);
                return Ok(());
            }
            buf.events.push(Event::ScopeEnd {
                tid: buf.tid,
                ts_ns: end_ns.max(handle.start_ns),
            });
            Ok(())
        });
        ended.unwrap_or(Err(RecorderError::AlreadyShutDown))
    }

    pub fn log_event(&self, name: impl Into<Cow<'static, str>>) {
        let clock = &self.inner.clock;
        self.with_buffer(|buf| {
            buf.events.push(Event::Instant {
                tid: buf.tid,
                name: name.into(),
                ts_ns: clock.now_ns(),
            });
        });
    }

    pub fn log_thread_name(&self, name: impl Into<Cow<'static, str>>) {
        self.with_buffer(|buf| {
            buf.events.push(Event::ThreadName {
                tid: buf.tid,
                name: name.into(),
            });
        });
    }

    /// Open a scope that ends when the returned guard drops.
    pub fn scope(&self, name: impl Into<Cow<'static, str>>) -> Guard<'_> {
        Guard {
            recorder: self,
            handle: Some(self.begin_scope(name)),
        }
    }

    pub fn scope_with(
        &self,
        name: impl Into<Cow<'static, str>>,
        policy: ZeroLengthPolicy,
    ) -> Guard<'_> {
        Guard {
            recorder: self,
            handle: Some(self.begin_scope_with(name, policy)),
        }
    }

    fn check_active(&self) -> Result<(), RecorderError> {
        match self.inner.state.load(Ordering::Acquire) {
            ACTIVE => Ok(()),
            CREATED => Err(RecorderError::NotInitialized),
            _ => Err(RecorderError::AlreadyShutDown),
        }
    }

    /// Run `f` against the calling thread's buffer, registering it first if
    /// needed. Returns `None` when the recorder is not accepting events.
    fn with_buffer<R>(&self, f: impl FnOnce(&mut ThreadBuffer) -> R) -> Option<R> {
        if !self.is_active() {
            return None;
        }
        BUFFERS
            .try_with(|cell| {
                let mut entries = cell.borrow_mut();
                let index = match entries.iter().position(|(id, _)| *id == self.inner.id) {
                    Some(index) => index,
                    None => {
                        // Entries whose recorder dropped its registry handle
                        // (shut down or gone) are dead weight.
                        entries.retain(|(_, arc)| Arc::strong_count(arc) > 1);
                        let arc = self.register_thread()?;
                        entries.push((self.inner.id, arc));
                        entries.len() - 1
                    }
                };
                let mut buf = entries[index].1.lock().unwrap_or_else(|e| e.into_inner());
                if buf.closed {
                    return None;
                }
                Some(f(&mut *buf))
            })
            .ok()
            .flatten()
    }

    fn register_thread(&self) -> Option<ThreadBufferArc> {
        let mut threads = self.inner.threads.lock().unwrap_or_else(|e| e.into_inner());
        if !self.is_active() {
            return None;
        }
        let tid = current_thread_id();
        let mut events = Vec::with_capacity(self.inner.config.buffer_capacity);
        if let Some(name) = std::thread::current().name() {
            events.push(Event::ThreadName {
                tid,
                name: Cow::Owned(name.to_owned()),
            });
        }
        let arc = Arc::new(Mutex::new(ThreadBuffer {
            tid,
            events,
            flushed: 0,
            open: Vec::new(),
            closed: false,
        }));
        threads.push(Arc::clone(&arc));
        Some(arc)
    }
}

/// RAII scope guard. Ends its scope on drop, including during unwinding.
#[must_use = "dropping the guard immediately records an empty scope; bind it with `let _guard = ...`"]
pub struct Guard<'r> {
    recorder: &'r Recorder,
    handle: Option<ScopeHandle>,
}

impl Guard<'_> {
    /// End the scope now and report the outcome instead of logging it.
    pub fn end(mut self) -> Result<(), RecorderError> {
        match self.handle.take() {
            Some(handle) => self.recorder.end_scope(handle),
            None => Ok(()),
        }
    }
}

impl Drop for Guard<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.recorder.end_scope(handle) {
                tracing::debug!(error = %e, "scope guard could not close its scope");
            }
        }
    }
}
