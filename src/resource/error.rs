//! Error type shared by resource handlers and lifecycle drivers.

use thiserror::Error;

use crate::api::ApiError;
use crate::poll::WaitError;
use crate::retry::RetryError;

/// Errors raised while managing a resource.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// A remote call failed fatally or exhausted its retry budget.
    #[error("api[{action}] failed: {source}")]
    Call {
        /// Cloud API action that failed.
        action: &'static str,
        /// Retry failure, carrying the last API error.
        #[source]
        source: Box<RetryError<ApiError>>,
    },
    /// The entity did not reach the expected status after a mutation.
    #[error("waiting for convergence failed: {0}")]
    Converge(#[source] Box<WaitError<ApiError>>),
    /// A stored identifier did not split into the expected parts.
    #[error("malformed {resource} id {id:?}: expected {parts} non-empty parts joined by '#'")]
    MalformedId {
        /// Resource type name.
        resource: &'static str,
        /// Offending identifier.
        id: String,
        /// Number of parts required.
        parts: usize,
    },
    /// Import was requested for an entity the provider does not report.
    #[error("{resource} {id} does not exist and cannot be imported")]
    ImportNotFound {
        /// Resource type name.
        resource: &'static str,
        /// Requested identifier.
        id: String,
    },
    /// A create call succeeded but the new entity could not be found.
    #[error("{resource} created on {instance_id} but no matching entry was listed")]
    NotLocated {
        /// Resource type name.
        resource: &'static str,
        /// Instance the entity was created on.
        instance_id: String,
    },
    /// The resource only supports replacement, not in-place updates.
    #[error("{resource} does not support in-place updates")]
    Immutable {
        /// Resource type name.
        resource: &'static str,
    },
    /// An operation needing a tracked entity was given empty state.
    #[error("{resource} is not tracked in state")]
    Untracked {
        /// Resource type name.
        resource: &'static str,
    },
}

impl ResourceError {
    /// Wraps a retry failure for `action`.
    #[must_use]
    pub fn call(action: &'static str, source: RetryError<ApiError>) -> Self {
        Self::Call {
            action,
            source: Box::new(source),
        }
    }

    /// Returns true when a retry or poll budget ran out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Call { source, .. } => source.is_timeout(),
            Self::Converge(source) => source.is_timeout(),
            _ => false,
        }
    }
}

impl From<WaitError<ApiError>> for ResourceError {
    fn from(value: WaitError<ApiError>) -> Self {
        Self::Converge(Box::new(value))
    }
}
