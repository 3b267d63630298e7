use super::transmitter::Target;
use super::{EventSink, UploadEvent};
use crate::api::Transport;
use std::fmt;
use tracing::{debug, warn};

/// How many more times a failed negotiation or transmission may be retried.
///
/// A positive value is a finite count, zero means no retries and any negative
/// value means unlimited retries.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryBudget(i64);

impl RetryBudget {
    pub const UNLIMITED: RetryBudget = RetryBudget(-1);
    pub const NONE: RetryBudget = RetryBudget(0);

    pub fn new(retries: i64) -> Self {
        RetryBudget(retries)
    }

    pub fn is_unlimited(&self) -> bool {
        self.0 < 0
    }

    /// Remaining retries, `None` when unlimited.
    pub fn remaining(&self) -> Option<u64> {
        u64::try_from(self.0).ok()
    }

    /// Takes one retry out of the budget. Returns `false` when it is spent.
    pub fn try_consume(&mut self) -> bool {
        match self.0 {
            0 => false,
            n if n > 0 => {
                self.0 -= 1;
                true
            }
            _ => true,
        }
    }
}

impl From<i64> for RetryBudget {
    fn from(retries: i64) -> Self {
        RetryBudget(retries)
    }
}

impl fmt::Display for RetryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.remaining() {
            Some(n) => write!(f, "{}", n),
            None => write!(f, "unlimited"),
        }
    }
}

/// Parses the last acknowledged byte out of a `Range: bytes=0-<N>` header.
pub fn parse_range_end(range: &str) -> Option<u64> {
    let (_, end) = range.trim().strip_prefix("bytes=")?.split_once('-')?;
    end.trim().parse().ok()
}

/// Offset of the first byte the server has not acknowledged yet.
pub fn resume_offset(range_end: u64, file_size: u64) -> u64 {
    range_end.saturating_add(1).min(file_size)
}

/// Asks the server where the next transmission should start.
///
/// Never fails: a probe error, a missing or an unreadable `Range` header all
/// restart the file from zero.
pub(crate) async fn recover_offset<T: Transport>(
    transport: &T,
    target: &Target,
    events: &EventSink,
) -> u64 {
    let range = match transport
        .probe(&target.session_url, &target.credential, target.file_size)
        .await
    {
        Ok(Some(range)) => range,
        Ok(None) => {
            debug!("the server holds no bytes of the upload, restarting from 0");
            return 0;
        }
        Err(e) => {
            warn!("upload status probe failed, restarting from 0: {e}");
            return 0;
        }
    };

    match parse_range_end(&range) {
        Some(end) => {
            events.emit(UploadEvent::Progress {
                end,
                file_size: target.file_size,
            });
            resume_offset(end, target.file_size)
        }
        None => {
            warn!("malformed range header {range:?}, restarting from 0");
            0
        }
    }
}
