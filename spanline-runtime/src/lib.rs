//! Scope and event recording for spanline traces.
//!
//! Create a [`Recorder`], `initialize` it with a trace path, instrument code
//! with [`Recorder::scope`] guards and [`Recorder::log_event`], then
//! `shutdown` to write every thread's events. The free functions and macros
//! below do the same against a lazily created process-wide recorder.
//!
//! ```no_run
//! spanline_runtime::init("app.trace").unwrap();
//! spanline_runtime::thread_name!("main");
//! {
//!     spanline_runtime::scope!("load config");
//!     spanline_runtime::event!("config parsed");
//! }
//! spanline_runtime::shutdown().unwrap();
//! ```

pub mod clock;
mod recorder;
mod stream;

use std::path::PathBuf;
use std::sync::OnceLock;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use recorder::{
    current_thread_id, Guard, Recorder, RecorderConfig, RecorderError, ScopeHandle, ShutdownStats,
    ZeroLengthPolicy,
};
pub use stream::{Event, EventKind, TraceWriter, FORMAT_VERSION};

/// Environment variable read by [`init_from_env`].
pub const TRACE_PATH_ENV: &str = "SPANLINE_TRACE_PATH";

/// Trace file used by [`init_from_env`] when the variable is unset.
pub const DEFAULT_TRACE_PATH: &str = "spanline.trace";

static GLOBAL: OnceLock<Recorder> = OnceLock::new();

/// The process-wide recorder used by the macros.
pub fn global() -> &'static Recorder {
    GLOBAL.get_or_init(Recorder::default)
}

/// Start recording to `path` with the process-wide recorder.
pub fn init(path: impl Into<PathBuf>) -> Result<(), RecorderError> {
    global().initialize(path.into())
}

/// Like [`init`], with the path taken from `SPANLINE_TRACE_PATH`.
///
/// Returns the path that was opened.
pub fn init_from_env() -> Result<PathBuf, RecorderError> {
    let path = std::env::var_os(TRACE_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TRACE_PATH));
    global().initialize(&path)?;
    Ok(path)
}

/// Flush all threads and close the process-wide trace.
pub fn shutdown() -> Result<ShutdownStats, RecorderError> {
    global().shutdown()
}

/// Time the rest of the enclosing block.
///
/// `scope!("name")` uses the recorder's default zero-length policy;
/// `scope!("name", ZeroLengthPolicy::Allow)` overrides it.
#[macro_export]
macro_rules! scope {
    ($name:expr) => {
        let _spanline_guard = $crate::global().scope($name);
    };
    ($name:expr, $policy:expr) => {
        let _spanline_guard = $crate::global().scope_with($name, $policy);
    };
}

/// Time the rest of the enclosing function, named by its path.
#[macro_export]
macro_rules! function_scope {
    () => {
        let _spanline_guard = $crate::global().scope({
            fn f() {}
            fn type_name_of<T>(_: T) -> &'static str {
                ::std::any::type_name::<T>()
            }
            let name = type_name_of(f);
            name.strip_suffix("::f").unwrap_or(name)
        });
    };
}

/// Record a named instant on the calling thread.
#[macro_export]
macro_rules! event {
    ($name:expr) => {
        $crate::global().log_event($name)
    };
}

/// Name the calling thread in the trace.
#[macro_export]
macro_rules! thread_name {
    ($name:expr) => {
        $crate::global().log_thread_name($name)
    };
}
