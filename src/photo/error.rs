use std::path::PathBuf;

use thiserror::Error;

/// Failures acquiring or transcoding a single photo. Each one fails only the
/// check-in it belongs to.
#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("Failed to read placeholder {path}: {source}")]
    Placeholder {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("HTTP error {status} downloading {url}")]
    HttpStatus { status: u16, url: String },

    #[error("HTTP error downloading {url} (bytes_so_far={bytes_read}): {source}")]
    Http {
        source: reqwest::Error,
        url: String,
        bytes_read: u64,
    },

    #[error("Timed out downloading {url}")]
    Timeout { url: String },

    #[error("Photo at {url} exceeds the {limit} byte limit")]
    TooLarge { url: String, limit: u64 },

    #[error("Image could not be transcoded: {0}")]
    Transcode(#[from] image::ImageError),

    #[error("Transcode task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Photo download cancelled")]
    Cancelled,
}

impl PhotoError {
    /// Whether the failure came from the photo's origin rather than local I/O
    /// or decoding.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            PhotoError::HttpStatus { .. }
                | PhotoError::Http { .. }
                | PhotoError::Timeout { .. }
                | PhotoError::TooLarge { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_is_remote() {
        let e = PhotoError::HttpStatus {
            status: 404,
            url: "x".into(),
        };
        assert!(e.is_remote());
        assert_eq!(e.to_string(), "HTTP error 404 downloading x");
    }

    #[test]
    fn test_too_large_is_remote() {
        let e = PhotoError::TooLarge {
            url: "x".into(),
            limit: 10,
        };
        assert!(e.is_remote());
    }

    #[test]
    fn test_placeholder_is_local() {
        let e = PhotoError::Placeholder {
            path: PathBuf::from("/missing.jpg"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(!e.is_remote());
    }

    #[test]
    fn test_cancelled_is_local() {
        assert!(!PhotoError::Cancelled.is_remote());
    }
}
