use std::fmt;
use thiserror::Error;

/// Sub-step of a check at which a cache or store call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStep {
    LookupSession,
    AcquireLease,
    LookupMapping,
    UpdateCredentialHash,
    MoveSession,
    UpdateMapping,
    CreateSession,
    CreateMapping,
    /// Dropping a session entry whose durable record could not be written.
    InvalidateSession,
    /// The spawned reconciliation task panicked or was aborted.
    ReconciliationTask,
}

impl fmt::Display for ReconcileStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReconcileStep::LookupSession => "lookup session",
            ReconcileStep::AcquireLease => "acquire mapping lease",
            ReconcileStep::LookupMapping => "lookup mapping",
            ReconcileStep::UpdateCredentialHash => "update credential hash",
            ReconcileStep::MoveSession => "move session",
            ReconcileStep::UpdateMapping => "update mapping",
            ReconcileStep::CreateSession => "create session",
            ReconcileStep::CreateMapping => "create mapping",
            ReconcileStep::InvalidateSession => "invalidate session",
            ReconcileStep::ReconciliationTask => "reconciliation task",
        };
        f.write_str(name)
    }
}

/// Failure of an authentication check.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No token supplied.
    #[error("No token provided")]
    EmptyToken,

    /// The hashing primitive failed.
    #[error("Hashing failure: {0}")]
    HashingFailure(String),

    /// The verifier explicitly rejected the token.
    #[error("Invalid token")]
    InvalidToken,

    /// The verifier could not be reached or answered with an unexpected shape.
    #[error("Verification unavailable: {0}")]
    VerificationUnavailable(String),

    /// A cache or store call failed partway; state may be partially applied.
    #[error("Reconciliation failed during {step}: {reason}")]
    ReconciliationFailure { step: ReconcileStep, reason: String },
}

impl AuthError {
    pub fn reconciliation(step: ReconcileStep, reason: impl Into<String>) -> Self {
        AuthError::ReconciliationFailure {
            step,
            reason: reason.into(),
        }
    }

    /// Whether repeating the whole check may succeed.
    ///
    /// `EmptyToken` and `InvalidToken` are terminal for the presented token.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AuthError::EmptyToken | AuthError::InvalidToken)
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
