use std::collections::HashSet;

// ============================================================================
// Processing Errors & Classification
// ============================================================================
//
// Classification happens at two independent points:
//
// 1. Coarse, at the consumer boundary: Ignored errors skip backoff entirely,
//    everything else runs the full retry schedule.
// 2. Fine, inside the recovery callback: recoverable-infrastructure failures
//    persist as RETRY for the scheduler, everything else as DEAD.
//
// Both points key off the same error value but are deliberately separate
// call sites; keep them consistent when adding new kinds.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("event id is missing")]
    MissingId,

    #[error("no event exists with id {0}")]
    UnknownEvent(i32),

    #[error("recoverable infrastructure failure: {0}")]
    RecoverableInfra(String),
}

impl ProcessingError {
    pub fn infra(err: impl std::fmt::Display) -> Self {
        ProcessingError::RecoverableInfra(err.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessingError::Deserialization(_) => ErrorKind::Deserialization,
            ProcessingError::MissingId => ErrorKind::MissingId,
            ProcessingError::UnknownEvent(_) => ErrorKind::UnknownEvent,
            ProcessingError::RecoverableInfra(_) => ErrorKind::RecoverableInfra,
        }
    }

    /// The fine-grained check used by recovery callbacks: does this failure
    /// stand a chance of succeeding later without a code change?
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProcessingError::RecoverableInfra(_))
    }
}

/// Discriminant of `ProcessingError`, used for allowlist membership and as
/// the `exception-class` header value on republished records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Deserialization,
    MissingId,
    UnknownEvent,
    RecoverableInfra,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Deserialization => "deserialization",
            ErrorKind::MissingId => "missing-id",
            ErrorKind::UnknownEvent => "unknown-event",
            ErrorKind::RecoverableInfra => "recoverable-infra",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Allowlisted: no retries, immediate terminal resolution.
    Ignored,
    /// Expected to succeed on a later attempt; runs the backoff schedule.
    Retryable,
    /// Permanent business-rule violation. Still runs the backoff schedule at
    /// the consumer boundary (the coarse layer only distinguishes ignored
    /// from everything else), but lands as DEAD on recovery.
    Fatal,
}

/// Maps a processing error to its coarse classification.
#[derive(Clone, Debug)]
pub struct ErrorClassifier {
    ignored: HashSet<ErrorKind>,
}

impl ErrorClassifier {
    pub fn new(ignored: impl IntoIterator<Item = ErrorKind>) -> Self {
        Self {
            ignored: ignored.into_iter().collect(),
        }
    }

    pub fn classify(&self, err: &ProcessingError) -> Classification {
        if self.ignored.contains(&err.kind()) {
            return Classification::Ignored;
        }
        if err.is_recoverable() {
            Classification::Retryable
        } else {
            Classification::Fatal
        }
    }
}

impl Default for ErrorClassifier {
    /// Only malformed payloads are allowlisted: redelivery never changes
    /// the bytes, so retrying them is pointless.
    fn default() -> Self {
        Self::new([ErrorKind::Deserialization])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deser_error() -> ProcessingError {
        serde_json::from_str::<crate::models::Event>("not json")
            .map_err(ProcessingError::from)
            .unwrap_err()
    }

    #[test]
    fn default_allowlist_ignores_deserialization() {
        let classifier = ErrorClassifier::default();
        assert_eq!(classifier.classify(&deser_error()), Classification::Ignored);
    }

    #[test]
    fn recoverable_infra_is_retryable() {
        let classifier = ErrorClassifier::default();
        let err = ProcessingError::infra("connection refused");
        assert_eq!(classifier.classify(&err), Classification::Retryable);
    }

    #[test]
    fn domain_violations_are_fatal() {
        let classifier = ErrorClassifier::default();
        assert_eq!(classifier.classify(&ProcessingError::MissingId), Classification::Fatal);
        assert_eq!(
            classifier.classify(&ProcessingError::UnknownEvent(42)),
            Classification::Fatal
        );
    }

    #[test]
    fn empty_allowlist_makes_deserialization_fatal() {
        let classifier = ErrorClassifier::new([]);
        assert_eq!(classifier.classify(&deser_error()), Classification::Fatal);
    }

    #[test]
    fn fine_classification_agrees_with_taxonomy() {
        assert!(ProcessingError::infra("timeout").is_recoverable());
        assert!(!ProcessingError::MissingId.is_recoverable());
        assert!(!deser_error().is_recoverable());
    }
}
