//! An in-memory upload server for exercising sessions without a network.

use super::stream::FileRangeStream;
use crate::api::{self, InitiateRequest, InitiateResponse, PutResponse, Transport};
use async_trait::async_trait;
use futures::StreamExt;
use std::{collections::VecDeque, io, sync::Mutex, time::Duration};
use tokio::time::Instant;

pub(crate) const SESSION_URL: &str = "https://upload.test/session/1";
pub(crate) const DEFAULT_BODY: &str = r#"{"id":"uploaded"}"#;

pub(crate) enum InitiateStep {
    TransportError,
    MissingLocation,
    /// Answers with `status` and no session url.
    Rejected(u16),
}

pub(crate) enum PutOutcome {
    Succeed(String),
    /// The server keeps the first `n` bytes, then the connection breaks.
    FailAfter(usize),
    Status(u16, String),
}

pub(crate) struct PutStep {
    delay: Duration,
    outcome: PutOutcome,
}

impl PutStep {
    pub(crate) fn succeed(body: &str) -> Self {
        PutStep {
            delay: Duration::ZERO,
            outcome: PutOutcome::Succeed(body.to_owned()),
        }
    }

    pub(crate) fn fail_after(kept: usize) -> Self {
        PutStep {
            delay: Duration::ZERO,
            outcome: PutOutcome::FailAfter(kept),
        }
    }

    pub(crate) fn status(status: u16, body: &str) -> Self {
        PutStep {
            delay: Duration::ZERO,
            outcome: PutOutcome::Status(status, body.to_owned()),
        }
    }

    /// The response arrives `delay` after the body was read.
    pub(crate) fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

pub(crate) enum ProbeStep {
    Range(String),
    NoRange,
    Error,
}

#[derive(Clone, Debug)]
pub(crate) struct InitiateRecord {
    pub(crate) credential: String,
    pub(crate) metadata: String,
    pub(crate) file_size: u64,
    pub(crate) content_type: String,
}

#[derive(Clone, Debug)]
pub(crate) struct PutRecord {
    pub(crate) credential: String,
    pub(crate) content_type: String,
    pub(crate) offset: u64,
    pub(crate) declared_len: u64,
    /// Bytes the server read off the body before answering.
    pub(crate) bytes: Vec<u8>,
    pub(crate) finished_at: Instant,
}

#[derive(Default)]
struct State {
    initiate_steps: VecDeque<InitiateStep>,
    put_steps: VecDeque<PutStep>,
    probe_steps: VecDeque<ProbeStep>,
    initiates: Vec<InitiateRecord>,
    puts: Vec<PutRecord>,
    probes: Vec<Instant>,
    received: Vec<u8>,
}

/// Answers requests from queued steps.
///
/// When a queue is empty the server behaves well: negotiation grants
/// [`SESSION_URL`], a transmission succeeds with [`DEFAULT_BODY`] and a probe
/// reports the bytes received so far.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    state: Mutex<State>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        ScriptedTransport::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub(crate) fn push_initiate(&self, step: InitiateStep) {
        self.state().initiate_steps.push_back(step);
    }

    pub(crate) fn push_put(&self, step: PutStep) {
        self.state().put_steps.push_back(step);
    }

    pub(crate) fn push_probe(&self, step: ProbeStep) {
        self.state().probe_steps.push_back(step);
    }

    pub(crate) fn initiate_count(&self) -> usize {
        self.state().initiates.len()
    }

    pub(crate) fn initiates(&self) -> Vec<InitiateRecord> {
        self.state().initiates.clone()
    }

    pub(crate) fn puts(&self) -> Vec<PutRecord> {
        self.state().puts.clone()
    }

    pub(crate) fn probe_count(&self) -> usize {
        self.state().probes.len()
    }

    pub(crate) fn probe_times(&self) -> Vec<Instant> {
        self.state().probes.clone()
    }

    /// The bytes the server holds for the session.
    pub(crate) fn received(&self) -> Vec<u8> {
        self.state().received.clone()
    }
}

fn connection_reset() -> api::Error {
    api::Error::Io(io::Error::new(
        io::ErrorKind::ConnectionReset,
        "connection reset by peer",
    ))
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn initiate(&self, request: InitiateRequest<'_>) -> Result<InitiateResponse, api::Error> {
        let mut state = self.state();
        state.initiates.push(InitiateRecord {
            credential: request.credential.to_owned(),
            metadata: request.metadata.to_owned(),
            file_size: request.file_size,
            content_type: request.content_type.to_owned(),
        });

        match state.initiate_steps.pop_front() {
            Some(InitiateStep::TransportError) => Err(connection_reset()),
            Some(InitiateStep::MissingLocation) => Ok(InitiateResponse {
                status: 200,
                location: None,
            }),
            Some(InitiateStep::Rejected(status)) => Ok(InitiateResponse {
                status,
                location: None,
            }),
            None => Ok(InitiateResponse {
                status: 200,
                location: Some(SESSION_URL.to_owned()),
            }),
        }
    }

    async fn put(
        &self,
        _session_url: &str,
        credential: &str,
        content_type: &str,
        mut body: FileRangeStream,
    ) -> Result<PutResponse, api::Error> {
        let step = self
            .state()
            .put_steps
            .pop_front()
            .unwrap_or_else(|| PutStep::succeed(DEFAULT_BODY));
        let offset = body.offset();
        let declared_len = body.len();

        let keep = match step.outcome {
            PutOutcome::FailAfter(n) => n,
            _ => usize::MAX,
        };
        let mut bytes = vec![];
        while bytes.len() < keep {
            match body.next().await {
                Some(chunk) => bytes.extend_from_slice(&chunk?),
                None => break,
            }
        }
        bytes.truncate(keep);

        {
            let mut state = self.state();
            state.received.truncate(offset as usize);
            state.received.extend_from_slice(&bytes);
        }

        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }

        self.state().puts.push(PutRecord {
            credential: credential.to_owned(),
            content_type: content_type.to_owned(),
            offset,
            declared_len,
            bytes,
            finished_at: Instant::now(),
        });

        match step.outcome {
            PutOutcome::Succeed(body) => Ok(PutResponse { status: 200, body }),
            PutOutcome::FailAfter(_) => Err(connection_reset()),
            PutOutcome::Status(status, body) => Ok(PutResponse { status, body }),
        }
    }

    async fn probe(
        &self,
        _session_url: &str,
        _credential: &str,
        _file_size: u64,
    ) -> Result<Option<String>, api::Error> {
        let mut state = self.state();
        state.probes.push(Instant::now());

        match state.probe_steps.pop_front() {
            Some(ProbeStep::Range(range)) => Ok(Some(range)),
            Some(ProbeStep::NoRange) => Ok(None),
            Some(ProbeStep::Error) => Err(connection_reset()),
            None if state.received.is_empty() => Ok(None),
            None => Ok(Some(format!("bytes=0-{}", state.received.len() - 1))),
        }
    }
}
