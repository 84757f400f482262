//! Argon2id hashing of bearer tokens.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use broker_auth_core::{HashError, TokenHasher};
use rand_core::OsRng;

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HasherConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Argon2TokenHasher {
    params: Params,
}

impl Argon2TokenHasher {
    pub fn new(config: HasherConfig) -> Result<Self, HashError> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| HashError(e.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Checks `token` against a PHC string produced by [`TokenHasher::hash`].
    ///
    /// The cost parameters are read from the PHC string, so hashes produced
    /// under an older configuration still verify.
    pub fn verify(&self, token: &str, phc: &str) -> bool {
        match PasswordHash::new(phc) {
            Ok(parsed) => Argon2::default()
                .verify_password(token.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

impl Default for Argon2TokenHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl TokenHasher for Argon2TokenHasher {
    fn hash(&self, token: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(token.as_bytes(), &salt)
            .map_err(|e| HashError(e.to_string()))?;

        Ok(hash.to_string())
    }
}
