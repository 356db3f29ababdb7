//! services/api/src/adapters/password.rs
//!
//! Argon2id implementation of the `CredentialHasher` port.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use pastebin_core::ports::{CredentialHasher, PortError, PortResult};
use tracing::error;

/// Hashes with the default Argon2id parameters and a fresh random salt per call.
#[derive(Default)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> PortResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| {
                error!("Failed to hash password: {:?}", e);
                PortError::backend("hashing password", e.to_string())
            })?;
        Ok(hash.to_string())
    }

    fn verify(&self, plaintext: &str, hash: &str) -> PortResult<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!("Failed to parse password hash: {:?}", e);
            PortError::backend("parsing password hash", e.to_string())
        })?;
        Ok(self
            .argon2
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok())
    }
}
