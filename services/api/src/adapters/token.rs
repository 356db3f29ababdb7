//! services/api/src/adapters/token.rs
//!
//! HS256 bearer tokens issued on login and checked by the auth middleware.

use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Longest token lifetime honoured, ten years.
pub const MAX_TTL_HOURS: u64 = 87_600;

/// Claims carried by a login token. `sub` is the normalised email.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_hours: u64,
}

impl TokenIssuer {
    /// Lifetimes above `MAX_TTL_HOURS` are clamped to it.
    pub fn new(secret: &[u8], ttl_hours: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl_hours: ttl_hours.min(MAX_TTL_HOURS),
        }
    }

    /// Uses a random 32-byte secret; tokens die with the process.
    pub fn with_random_secret(ttl_hours: u64) -> Self {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        Self::new(&secret, ttl_hours)
    }

    pub fn issue(&self, subject: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: now.timestamp() + self.ttl_hours as i64 * 3600,
            jti: uuid::Uuid::new_v4().to_string(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
    }

    /// Checks the signature and expiry.
    pub fn validate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }
}
