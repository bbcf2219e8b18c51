//! Central error classification shared by the retry wrapper and the poller.

use std::collections::BTreeSet;

/// Outcome of classifying a failed remote call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// Transient failure; the call may be repeated within budget.
    Retryable,
    /// The desired end state already holds or will self-resolve; treat the
    /// call as a successful no-op.
    Acceptable,
    /// Permanent failure; surface it without further attempts.
    Fatal,
}

/// Maps an error value onto an [`ErrorClass`].
pub trait Classify<E: ?Sized> {
    /// Classifies `error`.
    fn classify(&self, error: &E) -> ErrorClass;
}

impl<E, F> Classify<E> for F
where
    E: ?Sized,
    F: Fn(&E) -> ErrorClass,
{
    fn classify(&self, error: &E) -> ErrorClass {
        self(error)
    }
}

/// Implemented by errors that may carry a cloud error code.
pub trait ErrorCode {
    /// Returns the cloud error code, or `None` for transport-level failures.
    fn error_code(&self) -> Option<&str>;
}

/// Error codes that indicate malformed input or missing permissions.
pub const DEFAULT_FATAL_CODES: &[&str] = &[
    "AuthFailure",
    "UnauthorizedOperation",
    "InvalidParameter",
    "InvalidParameterValue",
    "MissingParameter",
    "UnknownParameter",
    "UnsupportedOperation",
];

/// Code-based classifier.
///
/// Codes are dotted hierarchies (`AuthFailure.SignatureExpire`): an entry
/// matches the identical code and every code nested below it. Acceptable
/// entries take precedence over fatal ones; anything else is retryable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CodeClassifier {
    acceptable: BTreeSet<String>,
    fatal: BTreeSet<String>,
}

impl Default for CodeClassifier {
    fn default() -> Self {
        Self {
            acceptable: BTreeSet::new(),
            fatal: DEFAULT_FATAL_CODES
                .iter()
                .map(|code| (*code).to_owned())
                .collect(),
        }
    }
}

impl CodeClassifier {
    /// Creates a classifier with the default fatal codes and no acceptable codes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `code` (and its sub-codes) as acceptable.
    #[must_use]
    pub fn accept(mut self, code: impl Into<String>) -> Self {
        self.acceptable.insert(code.into());
        self
    }

    /// Marks `code` (and its sub-codes) as fatal.
    #[must_use]
    pub fn fatal(mut self, code: impl Into<String>) -> Self {
        self.fatal.insert(code.into());
        self
    }

    /// Classifies a raw code. `None` means the failure happened before the
    /// service answered and is always retryable.
    #[must_use]
    pub fn classify_code(&self, code: Option<&str>) -> ErrorClass {
        let Some(value) = code else {
            return ErrorClass::Retryable;
        };
        if matches_any(&self.acceptable, value) {
            ErrorClass::Acceptable
        } else if matches_any(&self.fatal, value) {
            ErrorClass::Fatal
        } else {
            ErrorClass::Retryable
        }
    }
}

impl<E: ErrorCode + ?Sized> Classify<E> for CodeClassifier {
    fn classify(&self, error: &E) -> ErrorClass {
        self.classify_code(error.error_code())
    }
}

fn matches_any(entries: &BTreeSet<String>, code: &str) -> bool {
    entries.iter().any(|entry| {
        code.strip_prefix(entry.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
    })
}
