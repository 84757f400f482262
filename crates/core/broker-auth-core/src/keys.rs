//! Session-cache key layout.
//!
//! Other readers of the cache depend on these names, including the mapping
//! field names, so they must not change.

/// Mapping hash field holding the most recently verified token.
pub const MAPPING_TOKEN_FIELD: &str = "token";

/// Mapping hash field holding the internal identity.
pub const MAPPING_INTERNAL_IDENTITY_FIELD: &str = "internalHermesUserID";

/// `session:<token>` → internal identity.
pub fn session(token: &str) -> String {
    format!("session:{}", token)
}

/// `mapping:<externalIdentity>` → hash of `token` and `internalHermesUserID`.
pub fn mapping(external_identity: &str) -> String {
    format!("mapping:{}", external_identity)
}

/// Single-writer lease guarding mutation of one mapping.
pub fn mapping_lease(external_identity: &str) -> String {
    format!("lock:{}", mapping(external_identity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(session("tok-1"), "session:tok-1");
        assert_eq!(mapping("ext-42"), "mapping:ext-42");
        assert_eq!(mapping_lease("ext-42"), "lock:mapping:ext-42");
    }
}
