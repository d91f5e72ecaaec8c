use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read trace file {}: {source}", path.display())]
    TraceReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid trace data in {} line {line}: {reason}", path.display())]
    InvalidTraceData {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("unsupported trace format in {}: {reason}", path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("malformed trace: {0}")]
    MalformedTrace(String),

    #[error("invalid viewport: {0}")]
    InvalidViewport(String),

    #[error("{count} structural issue(s) in {}", path.display())]
    StructuralIssues { path: PathBuf, count: usize },
}
