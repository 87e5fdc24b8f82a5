use std::path::PathBuf;

use thiserror::Error;

/// Why no frame could be captured this cycle. Recoverable; the cycle is
/// skipped, never aborted.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no active capture target")]
    NoActiveTarget,
    #[error("capture command failed: {0}")]
    Command(String),
    #[error("capture io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single call to the generation service.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request timed out")]
    Timeout,
    #[error("generation transport error: {0}")]
    Transport(String),
    #[error("generation service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed generation response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenerationError::Timeout
        } else {
            GenerationError::Transport(e.to_string())
        }
    }
}

/// Stage-1 failure. The whole cycle is gated off when analysis fails.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("unparseable scene analysis: {0}")]
    Malformed(String),
}

/// A single persona's synthesis call failed. Isolated to that persona; the
/// sibling calls of the same cycle are unaffected.
#[derive(Debug, Error)]
#[error("synthesis for '{persona}' failed: {source}")]
pub struct SynthesisError {
    pub persona: String,
    #[source]
    pub source: GenerationError,
}

#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("unknown persona id '{0}' in always_include")]
    Unknown(String),
    #[error("failed to read persona file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid persona file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("comment log io error: {0}")]
    Io(#[from] std::io::Error),
}
