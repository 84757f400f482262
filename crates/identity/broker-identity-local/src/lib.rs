//! In-process collaborators for the session reconciler.
//!
//! Provides the Argon2 token hasher plus in-memory implementations of the
//! session cache and the durable credential store. The cache follows the
//! semantics of the Redis commands named by `SessionCache`, so anything that
//! passes against it behaves the same against a real cache.

mod cache;
mod hasher;
mod store;

pub use cache::InMemorySessionCache;
pub use hasher::{Argon2TokenHasher, HasherConfig};
pub use store::InMemoryCredentialStore;

// Re-export common types for convenience
pub use broker_auth_core::{CredentialStore, SessionCache, TokenHasher};
