//! In-memory durable credential store.

use async_trait::async_trait;
use broker_auth_core::{BrokerAcl, CredentialStore, InternalIdentity, StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone, Default)]
pub struct InMemoryCredentialStore {
    records: Arc<RwLock<HashMap<String, BrokerAcl>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_acl(&self, identity: &InternalIdentity) -> StoreResult<Option<BrokerAcl>> {
        let records = self.records.read().await;
        Ok(records.get(identity.as_str()).cloned())
    }

    async fn insert_acl(&self, acl: BrokerAcl) -> StoreResult<()> {
        let mut records = self.records.write().await;

        if records.contains_key(&acl.client_id) {
            return Err(StoreError::Duplicate(acl.client_id));
        }

        debug!("Stored broker ACL for {}", acl.client_id);
        records.insert(acl.client_id.clone(), acl);
        Ok(())
    }

    async fn update_passhash(
        &self,
        identity: &InternalIdentity,
        passhash: &str,
    ) -> StoreResult<bool> {
        let mut records = self.records.write().await;

        match records.get_mut(identity.as_str()) {
            Some(record) => {
                record.passhash = passhash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
