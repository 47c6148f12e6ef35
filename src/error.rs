use std::error::Error as StdError;

use thiserror::Error;

/// liteplayer's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// liteplayer's crate-wide error type.
///
/// This is intentionally decoupled from `anyhow` so downstream libraries aren't forced to
/// adopt `anyhow` in their own public APIs. Internal modules (demuxers, atom walking) use
/// `anyhow::Result` for ergonomic `.context()` chaining and convert at the boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// A source/sink adapter call failed (open/read/seek/write/close).
    #[error("adapter error: {0}")]
    Adapter(String),

    /// Container demuxing or seek-table construction failed.
    #[error("demux error: {0}")]
    Demux(String),

    /// The codec wrapper rejected data or failed to produce PCM.
    #[error("codec error: {0}")]
    Codec(String),

    /// A ringbuffer peer called `abort`.
    #[error("ringbuffer aborted")]
    Aborted,

    /// A blocking call exceeded its timeout.
    #[error("operation timed out")]
    Timeout,

    /// The public API was called in a state that doesn't permit it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The resource is structurally valid but exceeds a supported limit
    /// (e.g. an M4A `stsz` table requiring more than 128 KiB, or a sample
    /// size that doesn't fit in 16 bits).
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::Other(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_display_is_bare() {
        let err = Error::msg("boom");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn anyhow_conversion_keeps_context_chain() {
        let inner = anyhow::anyhow!("root cause").context("while doing thing");
        let err: Error = inner.into();
        assert!(err.to_string().contains("while doing thing"));
    }
}
