//! MongoDB-backed [`CredentialStore`].
//!
//! Records live in the collection the broker's auth plugin reads, one
//! document per internal identity, keyed by `client_id`.

mod store;

pub use store::{MongoCredentialStore, MongoStoreConfig};

pub use broker_auth_core::CredentialStore;
