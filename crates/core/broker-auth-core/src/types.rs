use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// This system's permanent identifier for a principal.
///
/// Minted once per external identity and never derived from provider data.
/// Broker credentials and ACLs are keyed on it, not on the rotating token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InternalIdentity(String);

impl InternalIdentity {
    /// Mint a fresh, globally unique identity.
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for InternalIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for InternalIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for InternalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identity provider's own identifier for a principal, stable across
/// token rotations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalIdentity(String);

impl ExternalIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Credentials handed to the broker for one authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerAuthResult {
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub username: String,
    pub password: String,
}

impl BrokerAuthResult {
    /// Client id and username are both the internal identity; the password
    /// is the credential hash of the presented token.
    pub fn new(identity: &InternalIdentity, credential_hash: String) -> Self {
        Self {
            client_id: identity.as_str().to_string(),
            username: identity.as_str().to_string(),
            password: credential_hash,
        }
    }
}

/// How a successful check was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// The token already had a live session entry. Nothing was mutated.
    Cached,
    /// A known external identity presented a new token; the session was re-keyed.
    Rotated,
    /// First sighting of the external identity; a new internal identity was minted.
    Provisioned,
}

/// Result of `check_authentication`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authentication {
    pub internal_identity: InternalIdentity,
    pub credentials: BrokerAuthResult,
    pub outcome: SessionOutcome,
}

impl Authentication {
    pub fn new(
        internal_identity: InternalIdentity,
        credential_hash: String,
        outcome: SessionOutcome,
    ) -> Self {
        let credentials = BrokerAuthResult::new(&internal_identity, credential_hash);
        Self {
            internal_identity,
            credentials,
            outcome,
        }
    }

    pub fn was_cached(&self) -> bool {
        self.outcome == SessionOutcome::Cached
    }

    pub fn was_rotated(&self) -> bool {
        self.outcome == SessionOutcome::Rotated
    }
}
