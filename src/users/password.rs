/// Password hashing with Argon2id
use crate::{
    config::PasswordHashingConfig,
    error::{IpamError, IpamResult},
};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier, Version};

/// Argon2id hasher with configured cost
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(config: PasswordHashingConfig) -> IpamResult<Self> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| IpamError::Internal(format!("Invalid Argon2 parameters: {}", e)))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password into PHC string format
    pub fn hash(&self, password: &str) -> IpamResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| IpamError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Returns `Ok(false)` on mismatch, `Err` if the stored hash is malformed
    pub fn verify(&self, password: &str, hash: &str) -> IpamResult<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| IpamError::Internal(format!("Invalid password hash: {}", e)))?;

        // Cost parameters come from the stored hash
        match self.argon2().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(IpamError::Internal(format!("Password verification failed: {}", e))),
        }
    }
}
