//! Error types for the CogVideo client and nodes

use std::path::PathBuf;
use std::time::Duration;

/// Boxed underlying cause of a transport failure
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for CogVideo operations
pub type Result<T> = std::result::Result<T, CogVideoError>;

/// Coarse classification callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection or request-layer failure, possibly after retries
    Network,
    /// The remote API answered but refused or garbled the request
    ApiRejection,
    /// The job itself failed or ended in an unusable state
    SemanticFailure,
    /// The caller cancelled the generation
    Cancelled,
    /// Local filesystem failure
    Io,
    /// Bad image tensor or job identifier
    InvalidInput,
    /// Invalid or missing configuration
    Configuration,
}

/// Error types for CogVideo operations
#[derive(thiserror::Error, Debug)]
pub enum CogVideoError {
    #[error("Network error during {operation}: {source}")]
    Network {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Maximum retries ({attempts}) reached: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<CogVideoError>,
    },

    #[error("{operation} failed with status {status}: {body}")]
    ApiRejection {
        operation: String,
        status: u16,
        api_status: Option<i64>,
        api_message: Option<String>,
        body: String,
    },

    #[error("Malformed {operation} response (HTTP {status}): {reason}: {body}")]
    MalformedResponse {
        operation: String,
        status: u16,
        reason: String,
        body: String,
    },

    #[error("Video generation failed for {chat_id}: {message}")]
    GenerationFailed { chat_id: String, message: String },

    #[error("Video generation for {chat_id} completed but no video URL found")]
    MissingVideoUrl { chat_id: String },

    #[error("Video generation for {chat_id} did not finish within {waited:?}")]
    Timeout { chat_id: String, waited: Duration },

    #[error("Video generation for {chat_id} was cancelled")]
    Cancelled { chat_id: String },

    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Image encoding error: {0}")]
    ImageEncoding(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CogVideoError {
    pub fn network(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Network {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } | Self::RetriesExhausted { .. } => ErrorKind::Network,
            Self::ApiRejection { .. } | Self::MalformedResponse { .. } => ErrorKind::ApiRejection,
            Self::GenerationFailed { .. } | Self::MissingVideoUrl { .. } | Self::Timeout { .. } => {
                ErrorKind::SemanticFailure
            }
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Io { .. } => ErrorKind::Io,
            Self::InvalidInput(_) | Self::ImageEncoding(_) => ErrorKind::InvalidInput,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Transient failures worth another attempt. An exhausted retry is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// HTTP status carried by API rejections
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::ApiRejection { status, .. } | Self::MalformedResponse { status, .. } => Some(*status),
            Self::RetriesExhausted { last, .. } => last.http_status(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CogVideoError {
    fn from(err: reqwest::Error) -> Self {
        let operation = match err.url() {
            Some(url) => format!("request to {}", url.path()),
            None => "request".to_string(),
        };
        Self::network(operation, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection_refused() -> CogVideoError {
        CogVideoError::network(
            "upload",
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        )
    }

    #[test]
    fn test_kinds() {
        assert_eq!(connection_refused().kind(), ErrorKind::Network);
        assert_eq!(
            CogVideoError::MissingVideoUrl { chat_id: "J1".into() }.kind(),
            ErrorKind::SemanticFailure
        );
        assert_eq!(
            CogVideoError::Cancelled { chat_id: "J1".into() }.kind(),
            ErrorKind::Cancelled
        );
        assert_eq!(
            CogVideoError::InvalidInput("empty".into()).kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_only_network_errors_are_transient() {
        assert!(connection_refused().is_transient());

        let exhausted = CogVideoError::RetriesExhausted {
            attempts: 3,
            last: Box::new(connection_refused()),
        };
        assert!(!exhausted.is_transient());
        assert_eq!(exhausted.kind(), ErrorKind::Network);

        let rejection = CogVideoError::ApiRejection {
            operation: "Upload".into(),
            status: 500,
            api_status: None,
            api_message: None,
            body: "oops".into(),
        };
        assert!(!rejection.is_transient());
    }

    #[test]
    fn test_rejection_message_carries_status_and_body() {
        let err = CogVideoError::ApiRejection {
            operation: "Upload".into(),
            status: 500,
            api_status: None,
            api_message: None,
            body: "internal error".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("500"));
        assert!(msg.contains("internal error"));
        assert_eq!(err.http_status(), Some(500));
    }

    #[test]
    fn test_exhausted_message_names_attempts() {
        let err = CogVideoError::RetriesExhausted {
            attempts: 3,
            last: Box::new(connection_refused()),
        };
        let msg = err.to_string();
        assert!(msg.contains("(3)"));
        assert!(msg.contains("refused"));
    }
}
