//! Core types and collaborator traits for turning identity-provider tokens
//! into message-broker credentials.
//!
//! The reconciler itself lives in `broker-identity-session`; this crate only
//! defines the vocabulary every other crate speaks: identities, the outcome of
//! an authentication check, the error taxonomy, the session-cache key layout,
//! and the traits behind which the cache, the durable store, the identity
//! verifier and the credential hasher sit.

mod acl;
mod cache;
mod error;
mod hasher;
pub mod keys;
mod store;
mod types;
mod verifier;

pub use acl::{BrokerAcl, PRIVATE_CONVERSATION_TOPIC_PATH};
pub use cache::{CacheError, CacheResult, SessionCache};
pub use error::{AuthError, AuthResult, ReconcileStep};
pub use hasher::{HashError, TokenHasher};
pub use store::{CredentialStore, StoreError, StoreResult};
pub use types::{
    Authentication, BrokerAuthResult, ExternalIdentity, InternalIdentity, SessionOutcome,
};
pub use verifier::{IdentityVerifier, VerifyError};
