//! Token verification and session identity reconciliation.
//!
//! A check runs in three phases:
//!
//! 1. Hash the token and look its session entry up. A hit ends the check.
//! 2. Ask the identity provider who owns the token.
//! 3. Under a per-mapping lease, either re-key the owner's session onto the
//!    new token (rotation) or mint a new internal identity (provisioning).
//!
//! Phase 3 runs in a spawned task so that a dropped request cannot abandon it
//! halfway. Its steps are ordered so that a failed check can be retried as a
//! whole: every step either tolerates or completes the state a previous
//! partial run left behind.

use crate::config::ReconcilerConfig;
use broker_auth_core::keys::{self, MAPPING_INTERNAL_IDENTITY_FIELD, MAPPING_TOKEN_FIELD};
use broker_auth_core::{
    AuthError, AuthResult, Authentication, CredentialStore, ExternalIdentity, IdentityVerifier,
    InternalIdentity, ReconcileStep, SessionCache, SessionOutcome, TokenHasher, VerifyError,
};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// A held mapping lease.
struct Lease {
    id: String,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct SessionReconciler {
    config: ReconcilerConfig,
    cache: Arc<dyn SessionCache>,
    store: Arc<dyn CredentialStore>,
    verifier: Arc<dyn IdentityVerifier>,
    hasher: Arc<dyn TokenHasher>,
}

impl SessionReconciler {
    pub fn new(
        config: ReconcilerConfig,
        cache: Arc<dyn SessionCache>,
        store: Arc<dyn CredentialStore>,
        verifier: Arc<dyn IdentityVerifier>,
        hasher: Arc<dyn TokenHasher>,
    ) -> Self {
        Self {
            config,
            cache,
            store,
            verifier,
            hasher,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Resolves `token` to broker credentials, provisioning or rotating the
    /// owner's session as needed.
    #[instrument(skip_all)]
    pub async fn check_authentication(&self, token: &str) -> AuthResult<Authentication> {
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }

        let credential_hash = self.hash_token(token).await?;

        let cached = self
            .bounded(
                ReconcileStep::LookupSession,
                self.cache.get(&keys::session(token)),
            )
            .await?;

        if let Some(internal) = cached {
            debug!(internal_identity = %internal, "Session cache hit");
            return Ok(Authentication::new(
                internal.into(),
                credential_hash,
                SessionOutcome::Cached,
            ));
        }

        let external = self.verify(token).await?;

        let reconciler = self.clone();
        let token = token.to_string();
        let task = tokio::spawn(async move {
            reconciler
                .reconcile(token, external, credential_hash)
                .await
        });

        task.await.map_err(|e| {
            AuthError::reconciliation(ReconcileStep::ReconciliationTask, e.to_string())
        })?
    }

    /// Drops the session entry of `token` if it still resolves to `internal`,
    /// so the next check for the token reconciles again instead of hitting
    /// the cache. Returns whether an entry was removed.
    pub async fn invalidate_session(
        &self,
        token: &str,
        internal: &InternalIdentity,
    ) -> AuthResult<bool> {
        let removed = self
            .bounded(
                ReconcileStep::InvalidateSession,
                self.cache
                    .delete_if_equals(&keys::session(token), internal.as_str()),
            )
            .await?;

        if removed {
            info!(internal_identity = %internal, "Invalidated session entry");
        }

        Ok(removed)
    }

    /// Internal identities for the given external identities. Unknown
    /// external identities are left out.
    pub async fn resolve_mappings(
        &self,
        external_identities: &[ExternalIdentity],
    ) -> AuthResult<HashMap<ExternalIdentity, InternalIdentity>> {
        let mut resolved = HashMap::with_capacity(external_identities.len());

        for external in external_identities {
            let internal = self
                .bounded(
                    ReconcileStep::LookupMapping,
                    self.cache.hget(
                        &keys::mapping(external.as_str()),
                        MAPPING_INTERNAL_IDENTITY_FIELD,
                    ),
                )
                .await?;

            if let Some(internal) = internal {
                resolved.insert(external.clone(), InternalIdentity::from(internal));
            }
        }

        Ok(resolved)
    }

    async fn hash_token(&self, token: &str) -> AuthResult<String> {
        let hasher = Arc::clone(&self.hasher);
        let token = token.to_string();

        tokio::task::spawn_blocking(move || hasher.hash(&token))
            .await
            .map_err(|e| AuthError::HashingFailure(e.to_string()))?
            .map_err(|e| AuthError::HashingFailure(e.0))
    }

    async fn verify(&self, token: &str) -> AuthResult<ExternalIdentity> {
        match timeout(self.config.call_timeout, self.verifier.verify(token)).await {
            Ok(Ok(external)) => Ok(external),
            Ok(Err(VerifyError::Rejected)) => Err(AuthError::InvalidToken),
            Ok(Err(VerifyError::Unavailable(reason))) => {
                Err(AuthError::VerificationUnavailable(reason))
            }
            Err(_) => Err(AuthError::VerificationUnavailable(
                "identity provider timed out".to_string(),
            )),
        }
    }

    /// Runs one cache or store call under the call timeout, tagging failures
    /// with the step they happened in.
    async fn bounded<T, E, F>(&self, step: ReconcileStep, call: F) -> AuthResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        match timeout(self.config.call_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AuthError::reconciliation(step, e.to_string())),
            Err(_) => Err(AuthError::reconciliation(step, "timed out")),
        }
    }

    /// Like [`Self::bounded`], but never lets a call run past the end of the
    /// lease. Once the lease is gone another request may own the mapping.
    async fn leased<T, E, F>(&self, step: ReconcileStep, lease: &Lease, call: F) -> AuthResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let remaining = lease.expires_at.saturating_duration_since(Instant::now());
        let limit = remaining.min(self.config.call_timeout);
        if limit.is_zero() {
            return Err(AuthError::reconciliation(step, "mapping lease expired"));
        }

        match timeout(limit, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AuthError::reconciliation(step, e.to_string())),
            Err(_) if limit < self.config.call_timeout => {
                Err(AuthError::reconciliation(step, "mapping lease expired"))
            }
            Err(_) => Err(AuthError::reconciliation(step, "timed out")),
        }
    }

    async fn reconcile(
        self,
        token: String,
        external: ExternalIdentity,
        credential_hash: String,
    ) -> AuthResult<Authentication> {
        let lease = self.acquire_lease(&external).await?;
        let result = self
            .reconcile_locked(&token, &external, &lease, credential_hash)
            .await;
        self.release_lease(&external, &lease.id).await;

        if let Err(e) = &result {
            error!(external_identity = %external, "Session reconciliation failed: {}", e);
        }

        result
    }

    async fn acquire_lease(&self, external: &ExternalIdentity) -> AuthResult<Lease> {
        let key = keys::mapping_lease(external.as_str());
        let lease_id = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.config.lease_wait;

        loop {
            // The TTL starts counting no later than the request is sent.
            let requested_at = Instant::now();
            let acquired = self
                .bounded(
                    ReconcileStep::AcquireLease,
                    self.cache
                        .set_if_absent(&key, &lease_id, self.config.lease_ttl),
                )
                .await?;

            if acquired {
                return Ok(Lease {
                    id: lease_id,
                    expires_at: requested_at + self.config.lease_ttl,
                });
            }

            if Instant::now() >= deadline {
                return Err(AuthError::reconciliation(
                    ReconcileStep::AcquireLease,
                    "mapping lease held by another request",
                ));
            }

            tokio::time::sleep(self.config.lease_poll_interval).await;
        }
    }

    async fn release_lease(&self, external: &ExternalIdentity, lease_id: &str) {
        let key = keys::mapping_lease(external.as_str());

        match timeout(
            self.config.call_timeout,
            self.cache.delete_if_equals(&key, lease_id),
        )
        .await
        {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                warn!(external_identity = %external, "Mapping lease expired before release")
            }
            Ok(Err(e)) => {
                warn!(external_identity = %external, "Failed to release mapping lease: {}", e)
            }
            Err(_) => {
                warn!(external_identity = %external, "Timed out releasing mapping lease")
            }
        }
    }

    async fn reconcile_locked(
        &self,
        token: &str,
        external: &ExternalIdentity,
        lease: &Lease,
        credential_hash: String,
    ) -> AuthResult<Authentication> {
        // A concurrent request for the same token may have completed while
        // this one waited for the lease.
        let cached = self
            .leased(
                ReconcileStep::LookupSession,
                lease,
                self.cache.get(&keys::session(token)),
            )
            .await?;
        if let Some(internal) = cached {
            return Ok(Authentication::new(
                internal.into(),
                credential_hash,
                SessionOutcome::Cached,
            ));
        }

        let mapping_key = keys::mapping(external.as_str());
        let previous_token = self
            .leased(
                ReconcileStep::LookupMapping,
                lease,
                self.cache.hget(&mapping_key, MAPPING_TOKEN_FIELD),
            )
            .await?;
        let internal = self
            .leased(
                ReconcileStep::LookupMapping,
                lease,
                self.cache.hget(&mapping_key, MAPPING_INTERNAL_IDENTITY_FIELD),
            )
            .await?;

        match internal {
            Some(internal) => {
                self.rotate(
                    token,
                    external,
                    lease,
                    InternalIdentity::from(internal),
                    previous_token,
                    credential_hash,
                )
                .await
            }
            // A mapping without an internal identity never finished
            // provisioning and is overwritten.
            None => {
                self.provision(token, external, lease, credential_hash)
                    .await
            }
        }
    }

    async fn rotate(
        &self,
        token: &str,
        external: &ExternalIdentity,
        lease: &Lease,
        internal: InternalIdentity,
        previous_token: Option<String>,
        credential_hash: String,
    ) -> AuthResult<Authentication> {
        let matched = self
            .leased(
                ReconcileStep::UpdateCredentialHash,
                lease,
                self.store.update_passhash(&internal, &credential_hash),
            )
            .await?;
        if !matched {
            warn!(internal_identity = %internal, "No durable credential record to update");
        }

        let new_key = keys::session(token);
        let old_key = previous_token
            .as_deref()
            .filter(|previous| *previous != token)
            .map(keys::session);

        let old_session_exists = match &old_key {
            Some(old_key) => {
                self.leased(ReconcileStep::MoveSession, lease, self.cache.exists(old_key))
                    .await?
            }
            None => false,
        };

        match old_key {
            Some(old_key) if old_session_exists => {
                self.leased(
                    ReconcileStep::MoveSession,
                    lease,
                    self.cache.rename(&old_key, &new_key),
                )
                .await?
            }
            // The previous entry is gone: either an earlier run already moved
            // it, or the same token is being restored after a partial run.
            _ => {
                self.leased(
                    ReconcileStep::MoveSession,
                    lease,
                    self.cache.set(&new_key, internal.as_str()),
                )
                .await?
            }
        }

        self.leased(
            ReconcileStep::UpdateMapping,
            lease,
            self.cache
                .hset(&keys::mapping(external.as_str()), &[(MAPPING_TOKEN_FIELD, token)]),
        )
        .await?;

        info!(
            external_identity = %external,
            internal_identity = %internal,
            "Rotated session onto new token"
        );

        Ok(Authentication::new(
            internal,
            credential_hash,
            SessionOutcome::Rotated,
        ))
    }

    async fn provision(
        &self,
        token: &str,
        external: &ExternalIdentity,
        lease: &Lease,
        credential_hash: String,
    ) -> AuthResult<Authentication> {
        let internal = InternalIdentity::mint();

        // The mapping is written before the session entry: a session entry
        // without a mapping would be served from cache forever while the
        // external identity stays unknown.
        self.leased(
            ReconcileStep::CreateMapping,
            lease,
            self.cache.hset(
                &keys::mapping(external.as_str()),
                &[
                    (MAPPING_TOKEN_FIELD, token),
                    (MAPPING_INTERNAL_IDENTITY_FIELD, internal.as_str()),
                ],
            ),
        )
        .await?;

        self.leased(
            ReconcileStep::CreateSession,
            lease,
            self.cache.set(&keys::session(token), internal.as_str()),
        )
        .await?;

        info!(
            external_identity = %external,
            internal_identity = %internal,
            "Provisioned new internal identity"
        );

        Ok(Authentication::new(
            internal,
            credential_hash,
            SessionOutcome::Provisioned,
        ))
    }
}
