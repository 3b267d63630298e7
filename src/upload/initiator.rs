use super::Error;
use crate::api::{InitiateRequest, Transport};
use std::path::Path;
use tracing::debug;

/// Size of the file to upload, as the filesystem reports it now.
pub(crate) async fn file_size(path: &Path) -> Result<u64, Error> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| Error::FileAccess(path.to_owned(), e))?;
    Ok(metadata.len())
}

/// Registers the upload and returns the session url.
///
/// A response without a `Location` header fails like a transport error does.
pub(crate) async fn initiate<T: Transport>(
    transport: &T,
    request: InitiateRequest<'_>,
) -> Result<String, Error> {
    let response = transport
        .initiate(request)
        .await
        .map_err(Error::Negotiation)?;

    let location = response
        .location
        .ok_or(Error::MissingLocation(response.status))?;

    debug!(status = response.status, session_url = %location, "upload session granted");
    Ok(location)
}

#[cfg(test)]
mod tests {
    use super::super::testing::{InitiateStep, ScriptedTransport};
    use super::*;

    fn request() -> InitiateRequest<'static> {
        InitiateRequest {
            credential: "token",
            metadata: "{}",
            file_size: 42,
            content_type: "video/mp4",
        }
    }

    #[tokio::test]
    async fn returns_the_location() {
        let transport = ScriptedTransport::new();
        let url = initiate(&transport, request()).await.unwrap();
        assert_eq!(url, super::super::testing::SESSION_URL);
        assert_eq!(transport.initiate_count(), 1);
    }

    #[tokio::test]
    async fn missing_location_is_a_failure() {
        let transport = ScriptedTransport::new();
        transport.push_initiate(InitiateStep::MissingLocation);
        let result = initiate(&transport, request()).await;
        assert!(matches!(result, Err(Error::MissingLocation(200))));
    }

    #[tokio::test]
    async fn transport_error_is_a_negotiation_failure() {
        let transport = ScriptedTransport::new();
        transport.push_initiate(InitiateStep::TransportError);
        let result = initiate(&transport, request()).await;
        assert!(matches!(result, Err(Error::Negotiation(_))));
        assert!(!result.unwrap_err().is_local());
    }

    #[tokio::test]
    async fn size_of_a_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = file_size(&dir.path().join("nope")).await;
        let err = result.unwrap_err();
        assert!(matches!(err, Error::FileAccess(..)));
        assert!(err.is_local());
    }
}
