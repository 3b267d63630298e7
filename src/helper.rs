use super::api::Transport;
use super::config::UploadConfig;
use super::upload::{self, RetryBudget, SessionState, UploadEvent, UploadSession};
use serde::Serialize;
use std::{
    path::Path,
    sync::{Arc, Mutex},
};
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Upload error: {0}")]
    UploadError(#[from] upload::Error),
    #[error("The upload gave up after running out of retries. Last error: {0:?}")]
    GaveUp(Option<upload::Error>),
    #[error("The upload was cancelled")]
    Cancelled,
    #[error("Tokio task join error")]
    JoinError(#[from] JoinError),
}

/// Called with the last byte index the server acknowledged and the file size.
pub type ProgressListener = Arc<Mutex<dyn FnMut(u64, u64) + Send + Sync + 'static>>;

/// Uploads the file at `path` through the HTTP endpoint of `config` and returns
/// the body of the final response.
///
/// * `metadata`: serialized as the JSON body of the negotiation request.
/// * `credential`: bearer token sent with every request.
/// * `retry_budget`: retries allowed after failures, negative for unlimited.
/// * `content_type`: declared type of the file, guessed from its extension if `None`.
pub async fn upload(
    path: impl AsRef<Path>,
    metadata: &impl Serialize,
    credential: impl AsRef<str>,
    retry_budget: impl Into<RetryBudget>,
    config: Option<&UploadConfig>,
    content_type: Option<&str>,
    progress_listener: Option<ProgressListener>,
) -> Result<String, Error> {
    let default_config = UploadConfig::default();
    let mut session = UploadSession::new(
        config.unwrap_or(&default_config),
        path.as_ref(),
        metadata,
        credential.as_ref(),
        retry_budget,
    )?;
    if let Some(content_type) = content_type {
        session = session.content_type_lookup(|_: &Path| content_type.to_owned());
    }

    run_to_completion(session, progress_listener).await
}

/// Runs `session` to its end, forwarding progress to `progress_listener`.
pub async fn run_to_completion<T: Transport>(
    session: UploadSession<T>,
    progress_listener: Option<ProgressListener>,
) -> Result<String, Error> {
    let (handle, mut events) = session.spawn();

    let mut completed = None;
    let mut last_error = None;
    while let Some(event) = events.recv().await {
        match event {
            UploadEvent::Progress { end, file_size } => {
                if let Some(pl) = progress_listener.as_ref() {
                    if let Ok(mut f) = pl.lock() {
                        f(end, file_size);
                    }
                }
            }
            UploadEvent::Failed(e) => last_error = Some(e),
            UploadEvent::Completed(body) => completed = Some(body),
            UploadEvent::Retrying { .. } | UploadEvent::GaveUp => {}
        }
    }

    let outcome = handle.await?;
    match (outcome.state, completed, last_error) {
        (SessionState::Succeeded, Some(body), _) => Ok(body),
        (SessionState::Cancelled, ..) => Err(Error::Cancelled),
        (_, _, Some(e)) if !e.is_retryable() => Err(Error::UploadError(e)),
        (_, _, last_error) => Err(Error::GaveUp(last_error)),
    }
}
