use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use crate::config::ShareConfig;
use crate::error::{AppError, Result};

/// Argon2id hasher for share passwords
#[derive(Debug, Clone)]
pub struct SharePasswordHasher {
    params: Params,
}

impl SharePasswordHasher {
    pub fn new(config: &ShareConfig) -> Result<Self> {
        let params = Params::new(
            config.password_memory_kib,
            config.password_iterations,
            config.password_parallelism,
            None,
        )
        .map_err(|e| AppError::Internal(format!("Invalid password hashing parameters: {}", e)))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a plaintext password into a PHC string
    pub fn hash(&self, plaintext: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?
            .to_string();
        Ok(hash)
    }

    /// Verify a candidate against a stored hash. The cost parameters are
    /// read from the hash itself, so older hashes keep verifying.
    pub fn verify(&self, candidate: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

        Ok(self
            .argon2()
            .verify_password(candidate.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

#[cfg(test)]
pub(crate) fn test_hasher() -> SharePasswordHasher {
    SharePasswordHasher::new(&ShareConfig {
        password_memory_kib: 1024,
        password_iterations: 1,
        ..ShareConfig::default()
    })
    .unwrap()
}
