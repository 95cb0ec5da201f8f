use shared::protocol::DraftError;
use thiserror::Error;

/// Failure reported by a [`crate::CommunitySource`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("validation error: {0}")]
    Validation(String),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Network(_) => ErrorKind::Network,
            ClientError::Server { .. } => ErrorKind::Server,
            ClientError::Validation(_) => ErrorKind::Validation,
        }
    }

    /// Message suitable for showing to the user, without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            ClientError::Network(message)
            | ClientError::Server { message, .. }
            | ClientError::Validation(message) => message,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Server { status: 401, .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return ClientError::Server {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
            };
        }
        if err.is_timeout() {
            return ClientError::Network("request timed out".to_string());
        }
        ClientError::Network(err.to_string())
    }
}

impl From<DraftError> for ClientError {
    fn from(err: DraftError) -> Self {
        ClientError::Validation(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Server,
    Validation,
}

/// Error recorded in controller state; controllers never return errors to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ClientError> for FeedError {
    fn from(err: &ClientError) -> Self {
        Self {
            kind: err.kind(),
            message: err.message().to_string(),
        }
    }
}
