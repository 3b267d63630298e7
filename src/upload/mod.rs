//! The resumable upload state machine.
//!
//! An [`UploadSession`] negotiates a session url, streams the file to it,
//! probes the server for progress while a transmission is in flight and, after
//! a failure, asks the server where to resume before trying again.

use crate::api;
use std::{fmt, io, path::PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;

mod initiator;
mod monitor;
pub mod retry;
mod session;
pub mod stream;
mod transmitter;

#[cfg(test)]
pub(crate) mod testing;

pub use retry::RetryBudget;
pub use session::{
    guess_content_type, ContentTypeLookup, SessionState, UploadOutcome, UploadSession,
    DEFAULT_CONTENT_TYPE,
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Metadata serialization error: {0:?}")]
    Metadata(#[from] serde_json::Error),
    #[error("Cannot read the file {0:?}: {1:?}")]
    FileAccess(PathBuf, #[source] io::Error),
    #[error("Cannot open the file stream at offset {0}: {1:?}")]
    StreamOpen(u64, #[source] io::Error),
    #[error("Upload negotiation failed: {0}")]
    Negotiation(#[source] api::Error),
    #[error("The negotiation response does not contain a location header. status: {0}")]
    MissingLocation(u16),
    #[error("Upload transmission failed: {0}")]
    Transmission(#[source] api::Error),
    #[error("Unexpected response status {status} for the upload. body: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

impl Error {
    /// Failures caused by the local file rather than the network. These are
    /// never retried.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Error::Metadata(_) | Error::FileAccess(..) | Error::StreamOpen(..)
        )
    }

    /// Whether another attempt could succeed. Local failures never go away on
    /// their own, nor does a transmission rejected with a client error other
    /// than `408` or `429`. A negotiation without session url is always
    /// retried, whatever its status.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::UnexpectedStatus { status, .. } => !is_permanent_status(*status),
            _ => !self.is_local(),
        }
    }
}

fn is_permanent_status(status: u16) -> bool {
    (400..500).contains(&status) && status != 408 && status != 429
}

/// The step a retry starts over.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    Negotiation,
    Transmission,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            Stage::Negotiation => "negotiation",
            Stage::Transmission => "transmission",
        };
        write!(f, "{}", result)
    }
}

/// What a running session reports to its caller.
#[derive(Debug)]
pub enum UploadEvent {
    /// `end` is the last byte index the server acknowledged, `N` of
    /// `bytes=0-<N>`; `file_size` is the size declared at negotiation.
    Progress { end: u64, file_size: u64 },
    /// A failed step is about to be retried.
    Retrying { stage: Stage, remaining: RetryBudget },
    Failed(Error),
    /// The body of the final successful response.
    Completed(String),
    /// The retry budget ran out after the last `Failed` event.
    GaveUp,
}

/// Sending side of the event channel. A dropped receiver is not an error: the
/// upload goes on without an audience.
#[derive(Clone)]
pub(crate) struct EventSink {
    tx: mpsc::UnboundedSender<UploadEvent>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<UploadEvent>) -> Self {
        EventSink { tx }
    }

    pub(crate) fn emit(&self, event: UploadEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unexpected(status: u16) -> Error {
        Error::UnexpectedStatus {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn client_errors_are_permanent() {
        assert!(!unexpected(400).is_retryable());
        assert!(!unexpected(401).is_retryable());
        assert!(!unexpected(403).is_retryable());
        assert!(!unexpected(404).is_retryable());
    }

    #[test]
    fn throttling_and_server_errors_are_retried() {
        assert!(unexpected(408).is_retryable());
        assert!(unexpected(429).is_retryable());
        assert!(unexpected(500).is_retryable());
        assert!(unexpected(503).is_retryable());
        assert!(unexpected(308).is_retryable());
        assert!(Error::MissingLocation(200).is_retryable());
        assert!(Error::MissingLocation(401).is_retryable());
    }

    #[test]
    fn local_errors_are_never_retried() {
        let err = Error::StreamOpen(0, io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_local());
        assert!(!err.is_retryable());
    }
}
