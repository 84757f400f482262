//! Session identity reconciliation for broker credentials.
//!
//! [`SessionReconciler`] turns a bearer token into broker credentials. The
//! first time an external identity is seen it gets a freshly minted internal
//! identity; later tokens from the same external identity are re-keyed onto
//! that identity so broker ACLs survive token rotation.
//!
//! [`AclProjector`] writes the durable broker credential record for every
//! identity that was provisioned or rotated.

mod config;
mod projection;
mod reconciler;

#[cfg(test)]
mod test_support;

pub use config::{CALLS_UNDER_LEASE, ReconcilerConfig};
pub use projection::AclProjector;
pub use reconciler::SessionReconciler;

pub use broker_auth_core::{
    AuthError, AuthResult, Authentication, BrokerAuthResult, ExternalIdentity, InternalIdentity,
    ReconcileStep, SessionOutcome,
};
