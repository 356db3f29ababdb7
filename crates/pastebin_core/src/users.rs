//! crates/pastebin_core/src/users.rs
//!
//! The user repository. Users are keyed by their normalised email, which is
//! trimmed and lowercased, so `A@B.com` and `a@b.com` are the same account.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::User;
use crate::keys;
use crate::ports::{CredentialHasher, KeyValueStore, PortError, PortResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    id: Uuid,
    email: String,
    password_hash: String,
}

impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            email: self.email,
            password_hash: self.password_hash,
        }
    }
}

/// Trims and lowercases an email; empty input is rejected.
pub fn normalize_email(email: &str) -> PortResult<String> {
    let email = email.trim();
    if email.is_empty() {
        return Err(PortError::InvalidArgument(
            "there is no email provided".to_string(),
        ));
    }
    Ok(email.to_lowercase())
}

/// Key-value backed store of `User` records.
#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn KeyValueStore>,
    hasher: Arc<dyn CredentialHasher>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn KeyValueStore>, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self { store, hasher }
    }

    /// Registers a user. The password is hashed before anything is written.
    ///
    /// Uniqueness is enforced by a conditional write on the email key, so two
    /// concurrent registrations for the same email cannot both succeed.
    pub async fn create_user(&self, email: &str, password: &str) -> PortResult<User> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(PortError::InvalidArgument(
                "there is no password provided".to_string(),
            ));
        }

        let key = keys::user_email(&email);
        // Skip the expensive hash when the answer is already known.
        if self.store.get(&key).await?.is_some() {
            return Err(PortError::AlreadyExists(format!("user {email}")));
        }

        let password_hash = self.hash(password).await?;
        let record = UserRecord {
            id: Uuid::new_v4(),
            email: email.clone(),
            password_hash,
        };
        let encoded = serde_json::to_string(&record)?;

        if !self.store.set_if_absent(&key, &encoded, None).await? {
            return Err(PortError::AlreadyExists(format!("user {email}")));
        }

        info!(user_id = %record.id, "Created user");
        Ok(record.to_domain())
    }

    pub async fn get_user_by_email(&self, email: &str) -> PortResult<User> {
        let email = normalize_email(email)?;
        let raw = self
            .store
            .get(&keys::user_email(&email))
            .await?
            .ok_or_else(|| PortError::NotFound(format!("user {email}")))?;
        let record: UserRecord = serde_json::from_str(&raw)?;
        Ok(record.to_domain())
    }

    pub async fn get_all_users(&self) -> PortResult<Vec<User>> {
        let user_keys = self.store.scan_prefix(keys::USER_EMAIL_PREFIX).await?;
        let mut users = Vec::with_capacity(user_keys.len());
        for key in user_keys {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            let record: UserRecord = serde_json::from_str(&raw)?;
            users.push(record.to_domain());
        }
        Ok(users)
    }

    /// Removes every user record and nothing else. Returns how many keys went.
    pub async fn drop_all_users(&self) -> PortResult<u64> {
        let removed = self.store.delete_prefix(keys::USER_PREFIX).await?;
        warn!(removed, "Dropped all users");
        Ok(removed)
    }

    /// Checks a plaintext password against the stored hash.
    ///
    /// Unknown emails and mismatches both yield `Ok(false)`.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> PortResult<bool> {
        let user = match self.get_user_by_email(email).await {
            Ok(user) => user,
            Err(PortError::NotFound(_)) => {
                debug!("Credential check for unknown email");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &user.password_hash))
            .await
            .map_err(|e| PortError::backend("verifying password", e))?
    }

    async fn hash(&self, password: &str) -> PortResult<String> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| PortError::backend("hashing password", e))?
    }
}
