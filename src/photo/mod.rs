//! Photo acquisition and transcoding.
//!
//! Downloads are streamed with a hard byte cap so an oversized or endless
//! response can't exhaust memory. Check-ins without a photo fall back to a
//! placeholder image read from disk.

pub mod error;
pub mod transcode;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

pub use error::PhotoError;
pub use transcode::{Transcoder, WebpTranscoder};

use crate::feed::client::USER_AGENT;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

#[async_trait]
pub trait PhotoSource: Send + Sync {
    /// Raw image bytes for `reference`, or the placeholder when it is absent
    /// or empty.
    async fn acquire(
        &self,
        reference: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, PhotoError>;
}

pub struct HttpPhotoAcquirer {
    client: Client,
    placeholder: PathBuf,
    max_bytes: u64,
}

impl HttpPhotoAcquirer {
    pub fn new(placeholder: PathBuf, timeout: Duration, max_bytes: u64) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            placeholder,
            max_bytes,
        })
    }

    async fn read_placeholder(&self) -> Result<Vec<u8>, PhotoError> {
        tokio::fs::read(&self.placeholder)
            .await
            .map_err(|source| PhotoError::Placeholder {
                path: self.placeholder.clone(),
                source,
            })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, PhotoError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| http_error(e, url, 0))?;

        if !response.status().is_success() {
            return Err(PhotoError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let too_large = || PhotoError::TooLarge {
            url: url.to_string(),
            limit: self.max_bytes,
        };
        let content_length = response.content_length();
        if content_length.is_some_and(|len| len > self.max_bytes) {
            return Err(too_large());
        }

        let capacity = content_length.unwrap_or(0).min(self.max_bytes) as usize;
        let mut body = Vec::with_capacity(capacity);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| http_error(e, url, body.len() as u64))?;
            // Content-Length can lie; enforce the cap on what actually arrives.
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

fn http_error(source: reqwest::Error, url: &str, bytes_read: u64) -> PhotoError {
    if source.is_timeout() {
        PhotoError::Timeout {
            url: url.to_string(),
        }
    } else {
        PhotoError::Http {
            source,
            url: url.to_string(),
            bytes_read,
        }
    }
}

#[async_trait]
impl PhotoSource for HttpPhotoAcquirer {
    async fn acquire(
        &self,
        reference: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, PhotoError> {
        let url = match reference.map(str::trim).filter(|r| !r.is_empty()) {
            Some(url) => url,
            None => return self.read_placeholder().await,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PhotoError::Cancelled),
            bytes = self.download(url) => bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::io::Write;

    const PLACEHOLDER: &[u8] = b"\xFF\xD8placeholder\xFF\xD9";

    fn placeholder_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PLACEHOLDER).unwrap();
        file
    }

    fn acquirer(placeholder: PathBuf, timeout: Duration, max_bytes: u64) -> HttpPhotoAcquirer {
        HttpPhotoAcquirer::new(placeholder, timeout, max_bytes).unwrap()
    }

    #[tokio::test]
    async fn test_absent_reference_uses_placeholder() {
        let file = placeholder_file();
        let photos = acquirer(file.path().to_path_buf(), DEFAULT_TIMEOUT, DEFAULT_MAX_BYTES);
        let token = CancellationToken::new();
        assert_eq!(photos.acquire(None, &token).await.unwrap(), PLACEHOLDER);
        assert_eq!(photos.acquire(Some(""), &token).await.unwrap(), PLACEHOLDER);
        assert_eq!(photos.acquire(Some("  "), &token).await.unwrap(), PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_missing_placeholder_is_an_error() {
        let photos = acquirer(
            PathBuf::from("/nonexistent/missing.jpg"),
            DEFAULT_TIMEOUT,
            DEFAULT_MAX_BYTES,
        );
        let err = photos
            .acquire(None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PhotoError::Placeholder { .. }));
    }

    #[tokio::test]
    async fn test_download_success() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/photo.jpg");
                then.status(200).body("jpeg-bytes");
            })
            .await;

        let photos = acquirer(PathBuf::from("unused"), DEFAULT_TIMEOUT, DEFAULT_MAX_BYTES);
        let bytes = photos
            .acquire(Some(&server.url("/photo.jpg")), &CancellationToken::new())
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(bytes, b"jpeg-bytes");
    }

    #[tokio::test]
    async fn test_download_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gone.jpg");
                then.status(404);
            })
            .await;

        let photos = acquirer(PathBuf::from("unused"), DEFAULT_TIMEOUT, DEFAULT_MAX_BYTES);
        let err = photos
            .acquire(Some(&server.url("/gone.jpg")), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PhotoError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_download_over_limit() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/huge.jpg");
                then.status(200).body(vec![0u8; 64]);
            })
            .await;

        let photos = acquirer(PathBuf::from("unused"), DEFAULT_TIMEOUT, 16);
        let err = photos
            .acquire(Some(&server.url("/huge.jpg")), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PhotoError::TooLarge { limit: 16, .. }));
    }

    #[tokio::test]
    async fn test_download_at_limit_succeeds() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/exact.jpg");
                then.status(200).body(vec![7u8; 16]);
            })
            .await;

        let photos = acquirer(PathBuf::from("unused"), DEFAULT_TIMEOUT, 16);
        let bytes = photos
            .acquire(Some(&server.url("/exact.jpg")), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(bytes.len(), 16);
    }

    #[tokio::test]
    async fn test_download_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/slow.jpg");
                then.status(200)
                    .delay(Duration::from_secs(2))
                    .body("late");
            })
            .await;

        let photos = acquirer(PathBuf::from("unused"), Duration::from_millis(200), DEFAULT_MAX_BYTES);
        let err = photos
            .acquire(Some(&server.url("/slow.jpg")), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PhotoError::Timeout { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_cancelled_download() {
        let token = CancellationToken::new();
        token.cancel();
        let photos = acquirer(PathBuf::from("unused"), DEFAULT_TIMEOUT, DEFAULT_MAX_BYTES);
        let err = photos
            .acquire(Some("http://127.0.0.1:9/never.jpg"), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, PhotoError::Cancelled));
    }
}
