//! HTTP surface of the resumable upload protocol.
//!
//! Three requests make up the protocol: the negotiation `POST` that returns the
//! session url, the `PUT` that carries the file bytes, and the zero-length
//! `PUT` probe that asks the server how many bytes it has kept.

use crate::config::UploadConfig;
use crate::upload::stream::FileRangeStream;
use async_trait::async_trait;
use reqwest::{header, redirect, Body, Client};
use std::{io, sync::Arc};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Reqwest error: {0:?}")]
    Reqwest(#[from] reqwest::Error),
    /// Raised by transports doing their own I/O, such as in-process fakes;
    /// [`HttpTransport`] reports everything through `Reqwest`.
    #[error("IO error: {0:?}")]
    Io(#[from] io::Error),
}

/// Everything the negotiation request declares about the upcoming upload.
pub struct InitiateRequest<'a> {
    pub credential: &'a str,
    /// Serialized JSON metadata sent as the request body.
    pub metadata: &'a str,
    pub file_size: u64,
    pub content_type: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateResponse {
    pub status: u16,
    /// The `Location` header, which is the session url.
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResponse {
    pub status: u16,
    pub body: String,
}

/// The requests an upload session needs from the network.
///
/// [`HttpTransport`] is the real implementation; the session is generic over
/// this trait so another client can be plugged in.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Registers the upload intent. A transport level failure is an `Err`; a
    /// response of any status is an `Ok`.
    async fn initiate(&self, request: InitiateRequest<'_>) -> Result<InitiateResponse, Error>;

    /// Sends the byte range held by `body` to the session url.
    async fn put(
        &self,
        session_url: &str,
        credential: &str,
        content_type: &str,
        body: FileRangeStream,
    ) -> Result<PutResponse, Error>;

    /// Sends the `bytes */<file_size>` probe and returns the raw `Range`
    /// response header if the server sent one.
    async fn probe(
        &self,
        session_url: &str,
        credential: &str,
        file_size: u64,
    ) -> Result<Option<String>, Error>;
}

/// Lets several sessions share one transport.
#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn initiate(&self, request: InitiateRequest<'_>) -> Result<InitiateResponse, Error> {
        (**self).initiate(request).await
    }

    async fn put(
        &self,
        session_url: &str,
        credential: &str,
        content_type: &str,
        body: FileRangeStream,
    ) -> Result<PutResponse, Error> {
        (**self).put(session_url, credential, content_type, body).await
    }

    async fn probe(
        &self,
        session_url: &str,
        credential: &str,
        file_size: u64,
    ) -> Result<Option<String>, Error> {
        (**self).probe(session_url, credential, file_size).await
    }
}

/// [`Transport`] over a `reqwest` client.
pub struct HttpTransport {
    client: Client,
    initiate_url: String,
}

impl HttpTransport {
    /// Builds the client from `config`.
    ///
    /// Redirects are never followed: a `308` from the upload service means
    /// "resume incomplete" and must reach the session as is. Note that
    /// `timeout_secs` bounds the whole request, body included.
    pub fn new(config: &UploadConfig) -> Self {
        let mut builder = Client::builder().redirect(redirect::Policy::none());
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        HttpTransport {
            client: builder.build().unwrap_or(Client::new()),
            initiate_url: config.initiate_url(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        HttpTransport::new(&UploadConfig::default())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn initiate(&self, request: InitiateRequest<'_>) -> Result<InitiateResponse, Error> {
        debug!(url = %self.initiate_url, file_size = request.file_size, "POST upload negotiation");

        let resp = self
            .client
            .post(self.initiate_url.as_str())
            .bearer_auth(request.credential)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, request.metadata.len())
            .header("X-Upload-Content-Length", request.file_size)
            .header("X-Upload-Content-Type", request.content_type)
            .body(request.metadata.to_owned())
            .send()
            .await?;

        let location = resp
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_owned());

        Ok(InitiateResponse {
            status: resp.status().as_u16(),
            location,
        })
    }

    async fn put(
        &self,
        session_url: &str,
        credential: &str,
        content_type: &str,
        body: FileRangeStream,
    ) -> Result<PutResponse, Error> {
        debug!(url = session_url, offset = body.offset(), len = body.len(), "PUT upload body");

        let resp = self
            .client
            .put(session_url)
            .bearer_auth(credential)
            .header(header::CONTENT_LENGTH, body.len())
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::wrap_stream(body))
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(PutResponse { status, body })
    }

    async fn probe(
        &self,
        session_url: &str,
        credential: &str,
        file_size: u64,
    ) -> Result<Option<String>, Error> {
        let resp = self
            .client
            .put(session_url)
            .bearer_auth(credential)
            .header(header::CONTENT_LENGTH, 0)
            .header(header::CONTENT_RANGE, format!("bytes */{}", file_size))
            .send()
            .await?;

        let range = resp
            .headers()
            .get(header::RANGE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_owned());

        debug!(url = session_url, status = resp.status().as_u16(), ?range, "upload status probe");
        Ok(range)
    }
}
