use crate::config::{BackendKind, Config};
use anyhow::{Context, Result};
use broker_auth_core::{CredentialStore, SessionCache};
use broker_identity_local::{Argon2TokenHasher, InMemoryCredentialStore, InMemorySessionCache};
use broker_identity_mongo::MongoCredentialStore;
use broker_identity_redis::RedisSessionCache;
use broker_identity_session::{AclProjector, SessionReconciler};
use broker_identity_verifier::HttpIdentityVerifier;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub reconciler: SessionReconciler,
    pub projector: AclProjector,
    /// Format pre-filter applied before a token reaches the reconciler
    pub token_pattern: Option<Regex>,
}

impl AppState {
    pub fn new(
        reconciler: SessionReconciler,
        projector: AclProjector,
        token_pattern: Option<Regex>,
    ) -> Self {
        Self {
            reconciler,
            projector,
            token_pattern,
        }
    }

    /// Wires the HTTP verifier and Argon2 hasher from `config` around the
    /// given cache and store.
    pub fn from_config(
        config: &Config,
        cache: Arc<dyn SessionCache>,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let verifier = HttpIdentityVerifier::new(&config.verifier_config())
            .context("Failed to create identity verifier")?;
        let hasher = Argon2TokenHasher::new(config.hasher_config())
            .context("Invalid hasher parameters")?;

        let reconciler = SessionReconciler::new(
            config.reconciler_config(),
            cache,
            Arc::clone(&store),
            Arc::new(verifier),
            Arc::new(hasher),
        );

        Ok(Self::new(
            reconciler,
            AclProjector::new(store),
            config.token_pattern()?,
        ))
    }
}

/// Opens the session cache and credential store selected by
/// `config.backend.kind`.
pub async fn connect_backends(
    config: &Config,
) -> Result<(Arc<dyn SessionCache>, Arc<dyn CredentialStore>)> {
    match config.backend.kind {
        BackendKind::Memory => {
            warn!("Using in-memory session cache and credential store");
            let cache = InMemorySessionCache::new();
            spawn_cache_cleanup(cache.clone());
            Ok((Arc::new(cache), Arc::new(InMemoryCredentialStore::new())))
        }
        BackendKind::External => {
            let cache = RedisSessionCache::connect(&config.backend.redis_url)
                .await
                .context("Failed to connect to Redis")?;
            let store = MongoCredentialStore::connect(&config.mongo_store_config())
                .await
                .context("Failed to connect to MongoDB")?;
            Ok((Arc::new(cache), Arc::new(store)))
        }
    }
}

fn spawn_cache_cleanup(cache: InMemorySessionCache) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CACHE_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = cache.cleanup_expired().await;
            if removed > 0 {
                debug!("Removed {} expired cache entries", removed);
            }
        }
    });
}
