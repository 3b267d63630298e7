use super::initiator;
use super::retry::{self, RetryBudget};
use super::transmitter::{self, Target};
use super::{Error, EventSink, Stage, UploadEvent};
use crate::api::{HttpTransport, InitiateRequest, Transport};
use crate::config::UploadConfig;
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Content type declared when the file extension tells nothing.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// The default lookup: guesses from the file extension.
pub fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_owned()
}

/// Maps a file to the content type declared for it.
pub trait ContentTypeLookup {
    fn content_type(&self, path: &Path) -> String;
}

impl<F: Fn(&Path) -> String> ContentTypeLookup for F {
    fn content_type(&self, path: &Path) -> String {
        self(path)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitiated,
    Initiating,
    Transmitting,
    RecoveringOffset,
    Succeeded,
    Failed,
    Cancelled,
}

/// Summary of a finished session.
#[derive(Clone, Debug)]
pub struct UploadOutcome {
    pub state: SessionState,
    pub session_url: Option<String>,
    /// Offset the next transmission would have started from.
    pub byte_offset: u64,
    /// Bytes streamed over all transmission attempts, including the ones a
    /// failed request lost.
    pub bytes_sent: u64,
    pub negotiations: usize,
    pub transmissions: usize,
}

/// One resumable upload of one file.
///
/// The session is consumed by [`UploadSession::run`]; everything it learns on
/// the way (session url, resume offset, remaining retries) lives in the struct
/// and changes only between attempts.
pub struct UploadSession<T: Transport = HttpTransport> {
    transport: Arc<T>,
    file_path: Arc<PathBuf>,
    metadata: String,
    credential: Arc<String>,
    content_type: Arc<String>,
    probe_interval: Duration,
    cancel: CancellationToken,

    state: SessionState,
    session_url: Option<Arc<String>>,
    file_size: u64,
    byte_offset: u64,
    retry_budget: RetryBudget,
    sent: Arc<AtomicU64>,
    negotiations: usize,
    transmissions: usize,
}

impl UploadSession<HttpTransport> {
    /// A session talking HTTP to the endpoint described by `config`.
    pub fn new(
        config: &UploadConfig,
        file_path: impl Into<PathBuf>,
        metadata: &impl Serialize,
        credential: impl Into<String>,
        retry_budget: impl Into<RetryBudget>,
    ) -> Result<Self, Error> {
        Ok(UploadSession::with_transport(
            HttpTransport::new(config),
            file_path,
            metadata,
            credential,
            retry_budget,
        )?
        .probe_interval(config.probe_interval()))
    }
}

impl<T: Transport> UploadSession<T> {
    /// A session over any [`Transport`]. `metadata` is serialized right away
    /// and the content type is guessed from the extension of `file_path`.
    pub fn with_transport(
        transport: T,
        file_path: impl Into<PathBuf>,
        metadata: &impl Serialize,
        credential: impl Into<String>,
        retry_budget: impl Into<RetryBudget>,
    ) -> Result<Self, Error> {
        let file_path = file_path.into();
        Ok(UploadSession {
            transport: Arc::new(transport),
            content_type: Arc::new(guess_content_type(&file_path)),
            file_path: Arc::new(file_path),
            metadata: serde_json::to_string(metadata)?,
            credential: Arc::new(credential.into()),
            probe_interval: UploadConfig::default().probe_interval(),
            cancel: CancellationToken::new(),
            state: SessionState::Uninitiated,
            session_url: None,
            file_size: 0,
            byte_offset: 0,
            retry_budget: retry_budget.into(),
            sent: Arc::new(AtomicU64::new(0)),
            negotiations: 0,
            transmissions: 0,
        })
    }

    /// Resolves the declared content type of the file through `lookup`
    /// instead of the extension guess.
    pub fn content_type_lookup(mut self, lookup: impl ContentTypeLookup) -> Self {
        self.content_type = Arc::new(lookup.content_type(&self.file_path));
        self
    }

    /// Time between two progress probes. `Duration::ZERO` turns probing off.
    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Cancelling `token` stops the session at the next await point.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn retry_budget(&self) -> RetryBudget {
        self.retry_budget
    }

    /// Runs the session on a new task and hands back its events.
    pub fn spawn(self) -> (JoinHandle<UploadOutcome>, mpsc::UnboundedReceiver<UploadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tokio::spawn(self.run(tx)), rx)
    }

    /// Drives the upload to a terminal state, reporting through `events`.
    pub async fn run(mut self, events: mpsc::UnboundedSender<UploadEvent>) -> UploadOutcome {
        let events = EventSink::new(events);
        let cancel = self.cancel.clone();

        let state = tokio::select! {
            biased;
            _ = cancel.cancelled() => SessionState::Cancelled,
            state = self.drive(&events) => state,
        };
        self.state = state;

        info!(
            file = ?self.file_path,
            ?state,
            byte_offset = self.byte_offset,
            bytes_sent = self.sent.load(Ordering::Relaxed),
            "upload session finished"
        );

        UploadOutcome {
            state,
            session_url: self.session_url.map(|url| url.to_string()),
            byte_offset: self.byte_offset,
            bytes_sent: self.sent.load(Ordering::Relaxed),
            negotiations: self.negotiations,
            transmissions: self.transmissions,
        }
    }

    async fn drive(&mut self, events: &EventSink) -> SessionState {
        let session_url = match self.negotiate(events).await {
            Some(url) => url,
            None => return SessionState::Failed,
        };

        let target = Target {
            session_url,
            credential: self.credential.clone(),
            content_type: self.content_type.clone(),
            file_path: self.file_path.clone(),
            file_size: self.file_size,
        };
        self.transmit(&target, events).await
    }

    /// Returns the session url, or `None` once negotiation is given up.
    async fn negotiate(&mut self, events: &EventSink) -> Option<Arc<String>> {
        loop {
            self.state = SessionState::Initiating;
            self.negotiations += 1;

            match self.try_initiate().await {
                Ok(url) => {
                    info!(file = ?self.file_path, session_url = %url, "upload session negotiated");
                    let url = Arc::new(url);
                    self.session_url = Some(url.clone());
                    return Some(url);
                }
                Err(e) if !e.is_retryable() => {
                    warn!("upload of {:?} failed: {e}", self.file_path);
                    events.emit(UploadEvent::Failed(e));
                    return None;
                }
                Err(e) => {
                    warn!("upload negotiation failed: {e}");
                    events.emit(UploadEvent::Failed(e));
                    if !self.retry(Stage::Negotiation, events) {
                        return None;
                    }
                }
            }
        }
    }

    async fn try_initiate(&mut self) -> Result<String, Error> {
        self.file_size = initiator::file_size(&self.file_path).await?;

        initiator::initiate(
            self.transport.as_ref(),
            InitiateRequest {
                credential: &self.credential,
                metadata: &self.metadata,
                file_size: self.file_size,
                content_type: &self.content_type,
            },
        )
        .await
    }

    async fn transmit(&mut self, target: &Target, events: &EventSink) -> SessionState {
        loop {
            self.state = SessionState::Transmitting;
            self.transmissions += 1;

            let result = transmitter::transmit(
                &self.transport,
                target,
                self.byte_offset,
                self.sent.clone(),
                self.probe_interval,
                events,
                &self.cancel,
            )
            .await;

            match result {
                Ok(body) => {
                    self.byte_offset = self.file_size;
                    events.emit(UploadEvent::Completed(body));
                    return SessionState::Succeeded;
                }
                Err(e) if !e.is_retryable() => {
                    warn!("upload of {:?} failed: {e}", self.file_path);
                    events.emit(UploadEvent::Failed(e));
                    return SessionState::Failed;
                }
                Err(e) => {
                    warn!(offset = self.byte_offset, "upload transmission failed: {e}");
                    events.emit(UploadEvent::Failed(e));
                    if !self.retry(Stage::Transmission, events) {
                        return SessionState::Failed;
                    }

                    self.state = SessionState::RecoveringOffset;
                    self.byte_offset =
                        retry::recover_offset(self.transport.as_ref(), target, events).await;
                    info!(offset = self.byte_offset, "resuming upload");
                }
            }
        }
    }

    /// Spends one retry, or reports that the budget is gone.
    fn retry(&mut self, stage: Stage, events: &EventSink) -> bool {
        if self.retry_budget.try_consume() {
            info!(%stage, remaining = %self.retry_budget, "retrying upload");
            events.emit(UploadEvent::Retrying {
                stage,
                remaining: self.retry_budget,
            });
            true
        } else {
            warn!(%stage, "no retries left, giving up the upload");
            events.emit(UploadEvent::GaveUp);
            false
        }
    }
}
