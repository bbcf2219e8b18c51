//! Error type returned by [`AntiddosApi`](super::AntiddosApi) implementations.

use thiserror::Error;

use crate::classify::ErrorCode;

/// Failures reported by the remote Anti-DDoS API.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ApiError {
    /// The service answered with an error code.
    #[error("[TencentCloudSDKError] Code={code}, Message={message}, RequestId={request_id}")]
    Service {
        /// Dotted error code such as `ResourceInUse`.
        code: String,
        /// Human-readable message from the service.
        message: String,
        /// Request identifier for support tickets.
        request_id: String,
    },
    /// The request never produced a service answer.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },
}

impl ApiError {
    /// Builds a service error without a request identifier.
    #[must_use]
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            code: code.into(),
            message: message.into(),
            request_id: String::new(),
        }
    }

    /// Builds a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

impl ErrorCode for ApiError {
    fn error_code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => Some(code.as_str()),
            Self::Transport { .. } => None,
        }
    }
}
