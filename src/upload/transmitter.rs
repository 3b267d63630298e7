use super::monitor::Monitor;
use super::stream::FileRangeStream;
use super::{Error, EventSink};
use crate::api::Transport;
use std::{
    path::PathBuf,
    sync::{atomic::AtomicU64, Arc},
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Where and what a transmission sends, fixed once the session url is known.
#[derive(Clone)]
pub(crate) struct Target {
    pub(crate) session_url: Arc<String>,
    pub(crate) credential: Arc<String>,
    pub(crate) content_type: Arc<String>,
    pub(crate) file_path: Arc<PathBuf>,
    pub(crate) file_size: u64,
}

/// One transmission attempt of `[offset, file_size)`, with the progress
/// monitor running for exactly as long as the request.
pub(crate) async fn transmit<T: Transport>(
    transport: &Arc<T>,
    target: &Target,
    offset: u64,
    sent: Arc<AtomicU64>,
    probe_interval: Duration,
    events: &EventSink,
    cancel: &CancellationToken,
) -> Result<String, Error> {
    let body = FileRangeStream::open(target.file_path.as_path(), offset, target.file_size)
        .await
        .map_err(|e| Error::StreamOpen(offset, e))?
        .with_counter(sent);

    debug!(offset, len = body.len(), "transmitting upload body");

    let monitor = Monitor::start(
        transport.clone(),
        target.clone(),
        probe_interval,
        events.clone(),
        cancel,
    );
    let result = transport
        .put(&target.session_url, &target.credential, &target.content_type, body)
        .await;
    monitor.stop().await;

    let response = result.map_err(Error::Transmission)?;
    if !(200..300).contains(&response.status) {
        return Err(Error::UnexpectedStatus {
            status: response.status,
            body: response.body,
        });
    }

    Ok(response.body)
}
