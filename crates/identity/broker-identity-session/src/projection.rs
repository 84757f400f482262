//! Projection of successful checks into the durable credential store.

use broker_auth_core::{
    Authentication, BrokerAcl, CredentialStore, SessionOutcome, StoreError, StoreResult,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Makes sure every identity that passed a non-cached check has a broker
/// credential record.
#[derive(Clone)]
pub struct AclProjector {
    store: Arc<dyn CredentialStore>,
}

impl AclProjector {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Returns whether a record was inserted.
    pub async fn project(&self, authentication: &Authentication) -> StoreResult<bool> {
        if authentication.outcome == SessionOutcome::Cached {
            return Ok(false);
        }

        if self
            .store
            .find_acl(&authentication.internal_identity)
            .await?
            .is_some()
        {
            return Ok(false);
        }

        match self
            .store
            .insert_acl(BrokerAcl::for_credentials(&authentication.credentials))
            .await
        {
            Ok(()) => {
                info!(
                    internal_identity = %authentication.internal_identity,
                    "Inserted broker credential record"
                );
                Ok(true)
            }
            // Lost a race with a concurrent projection for the same identity.
            Err(StoreError::Duplicate(_)) => {
                debug!(
                    internal_identity = %authentication.internal_identity,
                    "Broker credential record already present"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
