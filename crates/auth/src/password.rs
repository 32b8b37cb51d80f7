//! Password hashing (Argon2id).
//!
//! One-way, salted, memory-hard hashing with verification delegated to the
//! `argon2` crate, which compares digests in constant time.

use argon2::password_hash::{self, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::HashedPassword;

const SALT_BYTES: usize = 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("invalid hashing parameters: {0}")]
    InvalidParams(String),

    #[error("stored hash is malformed")]
    MalformedHash,

    #[error("hashing failed: {0}")]
    Backend(String),
}

/// Trusted one-way hashing primitive.
///
/// Both operations are intentionally slow; async callers should run them on
/// a blocking thread.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<HashedPassword, PasswordError>;

    /// `Ok(false)` for a wrong password; `Err` only for unusable hashes.
    fn verify(&self, password: &str, hash: &HashedPassword) -> Result<bool, PasswordError>;
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Argon2PasswordHasher {
    params: Params,
}

impl Argon2PasswordHasher {
    pub fn new(config: &HashingConfig) -> Result<Self, PasswordError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| PasswordError::InvalidParams(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl Default for Argon2PasswordHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, password: &str) -> Result<HashedPassword, PasswordError> {
        let mut salt = [0u8; SALT_BYTES];
        rand::rng().fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt).map_err(|e| PasswordError::Backend(e.to_string()))?;

        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| HashedPassword::new(hash.to_string()))
            .map_err(|e| PasswordError::Backend(e.to_string()))
    }

    fn verify(&self, password: &str, hash: &HashedPassword) -> Result<bool, PasswordError> {
        let parsed = PasswordHash::new(hash.as_str()).map_err(|_| PasswordError::MalformedHash)?;

        // Cost parameters come from the encoded hash, not from `self.params`.
        match self.argon2().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::Backend(e.to_string())),
        }
    }
}

#[cfg(test)]
pub(crate) fn cheap_hasher() -> Argon2PasswordHasher {
    Argon2PasswordHasher::new(&HashingConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .expect("valid test params")
}
