//! HTTP service issuing broker credentials for identity provider tokens.

pub mod config;
pub mod routes;
pub mod state;

pub use config::{BackendKind, Config};
pub use routes::{build_router, cors_layer};
pub use state::{AppState, connect_backends};
