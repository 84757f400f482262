//! Test doubles shared by the unit tests in this crate.

use crate::config::ReconcilerConfig;
use crate::reconciler::SessionReconciler;
use async_trait::async_trait;
use broker_auth_core::{
    BrokerAcl, CacheError, CacheResult, CredentialStore, ExternalIdentity, IdentityVerifier,
    InternalIdentity, SessionCache, StoreResult, VerifyError,
};
use broker_identity_local::{
    Argon2TokenHasher, HasherConfig, InMemoryCredentialStore, InMemorySessionCache,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn fast_hasher() -> Argon2TokenHasher {
    Argon2TokenHasher::new(HasherConfig {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    })
    .unwrap()
}

pub fn reconciler_with(
    config: ReconcilerConfig,
    cache: &FaultyCache,
    store: &CountingStore,
    verifier: &Arc<StaticVerifier>,
) -> SessionReconciler {
    SessionReconciler::new(
        config,
        Arc::new(cache.clone()),
        Arc::new(store.clone()),
        verifier.clone(),
        Arc::new(fast_hasher()),
    )
}

/// Verifier answering from a fixed token table. Unknown tokens are rejected.
#[derive(Default)]
pub struct StaticVerifier {
    tokens: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
    unavailable: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(&self, token: &str, external: &str) {
        self.tokens
            .lock()
            .unwrap()
            .insert(token.to_string(), external.to_string());
    }

    pub fn fail_with_unavailable(&self, fail: bool) {
        self.unavailable.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<ExternalIdentity, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(VerifyError::Unavailable("provider down".to_string()));
        }

        let external = self.tokens.lock().unwrap().get(token).cloned();
        external
            .map(ExternalIdentity::new)
            .ok_or(VerifyError::Rejected)
    }
}

/// In-memory cache with switchable failures and latency.
#[derive(Clone, Default)]
pub struct FaultyCache {
    inner: InMemorySessionCache,
    state: Arc<FaultState>,
}

#[derive(Default)]
struct FaultState {
    calls: AtomicUsize,
    fail_get: AtomicBool,
    fail_rename: AtomicBool,
    fail_hset: AtomicBool,
    hset_delay: Mutex<Option<Duration>>,
}

impl FaultyCache {
    pub fn new(inner: InMemorySessionCache) -> Self {
        Self {
            inner,
            state: Arc::new(FaultState::default()),
        }
    }

    pub fn inner(&self) -> &InMemorySessionCache {
        &self.inner
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn fail_get(&self, fail: bool) {
        self.state.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn fail_rename(&self, fail: bool) {
        self.state.fail_rename.store(fail, Ordering::SeqCst);
    }

    pub fn fail_hset(&self, fail: bool) {
        self.state.fail_hset.store(fail, Ordering::SeqCst);
    }

    pub fn set_hset_delay(&self, delay: Duration) {
        *self.state.hset_delay.lock().unwrap() = Some(delay);
    }

    fn count(&self) {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionCache for FaultyCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.count();
        if self.state.fail_get.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("connection reset".to_string()));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        self.count();
        self.inner.set(key, value).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        self.count();
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn hget(&self, key: &str, field: &str) -> CacheResult<Option<String>> {
        self.count();
        self.inner.hget(key, field).await
    }

    async fn hset(&self, key: &str, fields: &[(&str, &str)]) -> CacheResult<()> {
        self.count();
        let delay = *self.state.hset_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_hset.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("hset refused".to_string()));
        }
        self.inner.hset(key, fields).await
    }

    async fn rename(&self, from: &str, to: &str) -> CacheResult<()> {
        self.count();
        if self.state.fail_rename.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("rename refused".to_string()));
        }
        self.inner.rename(from, to).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.count();
        self.inner.exists(key).await
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> CacheResult<bool> {
        self.count();
        self.inner.delete_if_equals(key, value).await
    }
}

/// Credential store that counts every call.
#[derive(Clone, Default)]
pub struct CountingStore {
    inner: InMemoryCredentialStore,
    calls: Arc<AtomicUsize>,
    panic_on_update: Arc<AtomicBool>,
}

impl CountingStore {
    pub fn new(inner: InMemoryCredentialStore) -> Self {
        Self {
            inner,
            calls: Arc::new(AtomicUsize::new(0)),
            panic_on_update: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes `update_passhash` panic, taking the calling task down with it.
    pub fn panic_on_update(&self, panic: bool) {
        self.panic_on_update.store(panic, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryCredentialStore {
        &self.inner
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for CountingStore {
    async fn find_acl(&self, identity: &InternalIdentity) -> StoreResult<Option<BrokerAcl>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.find_acl(identity).await
    }

    async fn insert_acl(&self, acl: BrokerAcl) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_acl(acl).await
    }

    async fn update_passhash(
        &self,
        identity: &InternalIdentity,
        passhash: &str,
    ) -> StoreResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_update.load(Ordering::SeqCst) {
            panic!("credential store crashed");
        }
        self.inner.update_passhash(identity, passhash).await
    }
}
