//! Endpoint and timing settings shared by the transport and the session.

use serde::Deserialize;
use std::time::Duration;

/// Settings for a resumable upload.
///
/// The defaults target the YouTube Data API video upload endpoint. The struct is
/// `Deserialize` so it can be embedded into a caller's own configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Scheme and host of the upload service, without a trailing slash.
    pub base_url: String,
    /// Path of the resumable upload endpoint.
    pub endpoint: String,
    /// Value of the `part` query parameter sent with the negotiation request.
    pub part: String,
    /// Seconds between two progress probes while a transmission is in flight.
    pub probe_interval_secs: u64,
    /// Optional per-request timeout for the HTTP client.
    pub timeout_secs: Option<u64>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            base_url: "https://www.googleapis.com".to_owned(),
            endpoint: "/upload/youtube/v3/videos".to_owned(),
            part: "snippet,status,contentDetails".to_owned(),
            probe_interval_secs: 5,
            timeout_secs: None,
        }
    }
}

impl UploadConfig {
    /// The full negotiation url including the query string.
    pub fn initiate_url(&self) -> String {
        format!(
            "{}{}?uploadType=resumable&part={}",
            self.base_url, self.endpoint, self.part
        )
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
