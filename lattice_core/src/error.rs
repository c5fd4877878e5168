//! Error taxonomy for linking, authorization, and conversion.
//!
//! The split matters for retry semantics: `NoApplicableTarget` is expected
//! and retryable (the call site stays unlinked and is offered the next
//! invocation's arguments), `AuthorizationDenied` is raised immediately and
//! never retried, and `ResolverFailure` is a configuration or programmer
//! error propagated verbatim. Contract violations (malformed operation
//! nesting, double-linking a call site) are panics, not error values.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// No resolver produced a guarded invocation for this request.
    #[error("no applicable target for operation `{operation}`")]
    NoApplicableTarget { operation: String },

    /// The caller lacks the capability required for a privileged access.
    #[error("authorization denied: {reason}")]
    AuthorizationDenied { reason: String },

    /// A value did not fit the type an adapted target expected.
    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    TypeMismatch { expected: String, found: String },

    /// An adapted target received the wrong number of arguments.
    #[error("arity mismatch: expected {expected} arguments, found {found}")]
    ArityMismatch { expected: usize, found: usize },

    /// A resolver component misbehaved; not retryable.
    #[error("resolver `{resolver}` failed: {message}")]
    ResolverFailure { resolver: String, message: String },

    /// A linked target failed while evaluating.
    #[error("evaluation failed: {message}")]
    Evaluation { message: String },
}

impl LinkError {
    pub fn no_applicable_target(operation: impl Into<String>) -> Self {
        LinkError::NoApplicableTarget {
            operation: operation.into(),
        }
    }

    pub fn authorization(reason: impl Into<String>) -> Self {
        LinkError::AuthorizationDenied {
            reason: reason.into(),
        }
    }

    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        LinkError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn arity(expected: usize, found: usize) -> Self {
        LinkError::ArityMismatch { expected, found }
    }

    pub fn resolver_failure(resolver: impl Into<String>, message: impl Into<String>) -> Self {
        LinkError::ResolverFailure {
            resolver: resolver.into(),
            message: message.into(),
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        LinkError::Evaluation {
            message: message.into(),
        }
    }

    /// True for the one expected, retryable variant.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LinkError::NoApplicableTarget { .. })
    }
}
