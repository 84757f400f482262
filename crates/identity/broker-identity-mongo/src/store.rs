use async_trait::async_trait;
use broker_auth_core::{BrokerAcl, CredentialStore, InternalIdentity, StoreError, StoreResult};
use mongodb::bson::{Document, doc};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use tracing::{debug, info};

/// Server error code for a unique index violation.
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoStoreConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
}

impl Default for MongoStoreConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "hermesDB".to_string(),
            collection: "vmq_auth_acl".to_string(),
        }
    }
}

impl MongoStoreConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }
}

#[derive(Clone)]
pub struct MongoCredentialStore {
    collection: Collection<BrokerAcl>,
}

impl MongoCredentialStore {
    /// Connects and makes sure `client_id` is uniquely indexed.
    pub async fn connect(config: &MongoStoreConfig) -> StoreResult<Self> {
        let client = Client::with_uri_str(&config.uri).await.map_err(backend)?;
        let collection = client
            .database(&config.database)
            .collection::<BrokerAcl>(&config.collection);

        let store = Self::new(collection);
        store.ensure_indexes().await?;

        info!(
            database = %config.database,
            collection = %config.collection,
            "Connected to MongoDB credential store"
        );
        Ok(store)
    }

    pub fn new(collection: Collection<BrokerAcl>) -> Self {
        Self { collection }
    }

    /// The unique index turns a racing second insert into
    /// [`StoreError::Duplicate`].
    pub async fn ensure_indexes(&self) -> StoreResult<()> {
        let index = IndexModel::builder()
            .keys(doc! { "client_id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.collection.create_index(index).await.map_err(backend)?;
        Ok(())
    }
}

fn by_client_id(identity: &InternalIdentity) -> Document {
    doc! { "client_id": identity.as_str() }
}

fn set_passhash(passhash: &str) -> Document {
    doc! { "$set": { "passhash": passhash } }
}

fn is_duplicate_key(error: &MongoError) -> bool {
    matches!(
        error.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

fn backend(error: MongoError) -> StoreError {
    StoreError::Backend(error.to_string())
}

#[async_trait]
impl CredentialStore for MongoCredentialStore {
    async fn find_acl(&self, identity: &InternalIdentity) -> StoreResult<Option<BrokerAcl>> {
        self.collection
            .find_one(by_client_id(identity))
            .await
            .map_err(backend)
    }

    async fn insert_acl(&self, acl: BrokerAcl) -> StoreResult<()> {
        match self.collection.insert_one(&acl).await {
            Ok(_) => {
                debug!(client_id = %acl.client_id, "Inserted broker ACL document");
                Ok(())
            }
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Duplicate(acl.client_id)),
            Err(e) => Err(backend(e)),
        }
    }

    async fn update_passhash(
        &self,
        identity: &InternalIdentity,
        passhash: &str,
    ) -> StoreResult<bool> {
        let result = self
            .collection
            .update_one(by_client_id(identity), set_passhash(passhash))
            .await
            .map_err(backend)?;
        Ok(result.matched_count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_auth_core::BrokerAuthResult;

    #[test]
    fn test_default_config_targets_broker_collection() {
        let config = MongoStoreConfig::new("mongodb://db.internal:27017");

        assert_eq!(config.uri, "mongodb://db.internal:27017");
        assert_eq!(config.database, "hermesDB");
        assert_eq!(config.collection, "vmq_auth_acl");

        let config = config.with_database("broker").with_collection("acl");
        assert_eq!(config.database, "broker");
        assert_eq!(config.collection, "acl");
    }

    #[test]
    fn test_documents_use_broker_field_names() {
        let credentials = BrokerAuthResult::new(&"abc-123".into(), "hash".to_string());
        let document = mongodb::bson::to_document(&BrokerAcl::for_credentials(&credentials))
            .unwrap();

        assert_eq!(document.get_str("client_id").unwrap(), "abc-123");
        assert_eq!(document.get_str("passhash").unwrap(), "hash");
        assert!(!document.contains_key("clientID"));

        assert_eq!(
            by_client_id(&InternalIdentity::from("abc-123")),
            doc! { "client_id": "abc-123" }
        );
        assert_eq!(
            set_passhash("new-hash"),
            doc! { "$set": { "passhash": "new-hash" } }
        );
    }

    /// Runs against the server named by `BROKER_AUTH_TEST_MONGODB_URI`, if any.
    #[tokio::test]
    async fn test_store_against_live_server() {
        let Ok(uri) = std::env::var("BROKER_AUTH_TEST_MONGODB_URI") else {
            return;
        };
        let config = MongoStoreConfig::new(uri)
            .with_collection(format!("vmq_auth_acl_{}", uuid::Uuid::new_v4().simple()));
        let store = MongoCredentialStore::connect(&config).await.unwrap();

        let identity = InternalIdentity::mint();
        let credentials = BrokerAuthResult::new(&identity, "hash-1".to_string());
        let acl = BrokerAcl::for_credentials(&credentials);

        assert_eq!(store.find_acl(&identity).await.unwrap(), None);
        assert!(!store.update_passhash(&identity, "hash-0").await.unwrap());

        store.insert_acl(acl.clone()).await.unwrap();
        assert_eq!(
            store.insert_acl(acl.clone()).await,
            Err(StoreError::Duplicate(identity.as_str().to_string()))
        );

        assert!(store.update_passhash(&identity, "hash-2").await.unwrap());
        let stored = store.find_acl(&identity).await.unwrap().unwrap();
        assert_eq!(stored.passhash, "hash-2");
        assert_eq!(stored.subscribe_acl, acl.subscribe_acl);

        store.collection.drop().await.unwrap();
    }
}
