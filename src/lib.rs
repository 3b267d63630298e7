//! `resumable-upload` is a crate to upload large files to services speaking the
//! resumable upload protocol (the YouTube Data API and Google Cloud Storage
//! style: negotiate a session url, `PUT` the bytes, probe with
//! `Content-Range: bytes */<size>` to find out what the server kept).
//!
//! These features are supported:
//! * Session negotiation with JSON metadata.
//! * Streaming the file from any byte offset without loading it in memory.
//! * Progress reports from periodic range probes while the upload runs.
//! * Resuming from the last acknowledged byte after a failure, with a finite or
//!   unlimited retry budget.
//! * Cancellation of a running upload.
//!
//! ## Example
//!
//! To upload a video:
//! ```no_run
//! # use std::sync::{Arc, Mutex};
//! # use resumable_upload::upload::RetryBudget;
//! # async fn run(auth_token: &str) -> Result<(), resumable_upload::helper::Error> {
//! let metadata = serde_json::json!({
//!     "snippet": { "title": "My video" },
//!     "status": { "privacyStatus": "private" },
//! });
//! let body = resumable_upload::helper::upload(
//!     "my_video.mp4",  // the file path
//!     &metadata,  // the negotiation body
//!     auth_token,  // the OAuth bearer token
//!     RetryBudget::UNLIMITED,  // retries after a failure
//!     None,  // custom endpoint config, `None` means the YouTube upload endpoint
//!     Some("video/mp4"),  // the content type of the file
//!     Some(Arc::new(Mutex::new(|end: u64, total: u64| {  // the progress listener
//!         println!("{}/{}", end + 1, total);
//!     }))),
//! )
//! .await?;
//! println!("{body}");
//! # Ok(())
//! # }
//! ```
//!
//! For full control, drive an [`upload::UploadSession`] and read its
//! [`upload::UploadEvent`]s:
//! ```no_run
//! # use resumable_upload::{config::UploadConfig, upload::{RetryBudget, UploadEvent, UploadSession}};
//! # async fn run(auth_token: String) -> Result<(), resumable_upload::upload::Error> {
//! let session = UploadSession::new(
//!     &UploadConfig::default(),
//!     "my_video.mp4",
//!     &serde_json::json!({ "snippet": { "title": "My video" } }),
//!     auth_token,
//!     RetryBudget::new(3),
//! )?;
//! let (handle, mut events) = session.spawn();
//! while let Some(event) = events.recv().await {
//!     match event {
//!         UploadEvent::Progress { end, file_size } => println!("{}/{}", end + 1, file_size),
//!         UploadEvent::Failed(e) => eprintln!("{e}"),
//!         UploadEvent::Completed(body) => println!("{body}"),
//!         _ => {}
//!     }
//! }
//! let outcome = handle.await.expect("upload task panicked");
//! println!("{:?}", outcome.state);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod helper;
pub mod upload;
