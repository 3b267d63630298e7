use super::retry::parse_range_end;
use super::transmitter::Target;
use super::{EventSink, UploadEvent};
use crate::api::Transport;
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Periodic progress probing bound to one transmission attempt.
///
/// Dropping the monitor cancels the task; [`Monitor::stop`] also waits for it
/// to finish, so no probe starts after `stop` returns.
pub(crate) struct Monitor {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Monitor {
    /// Starts probing every `period`. A zero `period` disables probing.
    pub(crate) fn start<T: Transport>(
        transport: Arc<T>,
        target: Target,
        period: Duration,
        events: EventSink,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let handle = if period.is_zero() {
            None
        } else {
            Some(tokio::spawn(poll_progress(
                transport,
                target,
                period,
                events,
                cancel.clone(),
            )))
        };

        Monitor { cancel, handle }
    }

    pub(crate) async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                debug!("progress monitor ended abnormally: {e}");
            }
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_progress<T: Transport>(
    transport: Arc<T>,
    target: Target,
    period: Duration,
    events: EventSink,
    cancel: CancellationToken,
) {
    // The first probe goes out one period after the attempt starts.
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = transport.probe(&target.session_url, &target.credential, target.file_size) => result,
        };

        match result {
            Ok(Some(range)) => match parse_range_end(&range) {
                Some(end) => events.emit(UploadEvent::Progress {
                    end,
                    file_size: target.file_size,
                }),
                None => trace!("ignoring malformed range header {range:?}"),
            },
            Ok(None) => trace!("progress probe without range header"),
            Err(e) => trace!("progress probe failed: {e}"),
        }
    }
}
