//! crates/pastebin_core/src/ports.rs
//!
//! Defines the service contracts (traits) the core depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! repositories to be independent of a specific key-value store, blob backend
//! or password hashing scheme.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// Boxed source error preserved inside `PortError::Backend`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type for every core operation.
/// Backend and IO failures keep the original error as their source.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Alias already in use: {0}")]
    AliasConflict(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("IO error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Backend error while {context}: {source}")]
    Backend {
        context: String,
        #[source]
        source: BoxError,
    },
    #[error("Malformed stored record: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Operation cancelled")]
    Cancelled,
}

impl PortError {
    pub fn backend(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        PortError::Backend {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PortError::Io {
            context: context.into(),
            source,
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// A flat key-value namespace with TTLs, conditional writes and atomic counters.
///
/// Implementations are shared across concurrent requests, so every method takes
/// `&self` and must be safe to call from many tasks at once. Expired keys behave
/// exactly like absent keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<String>>;

    /// Unconditional write. `None` means the key never expires.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> PortResult<()>;

    /// Writes only when the key is absent. Returns `false` if it already existed.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>)
        -> PortResult<bool>;

    /// Writes only when the key already exists. Returns `false` if it was absent.
    async fn set_if_present(&self, key: &str, value: &str, ttl: Option<Duration>)
        -> PortResult<bool>;

    /// Replaces the value only if it still equals `expected`, keeping the key's
    /// current TTL. Returns `false` if the key is absent or holds something else.
    async fn compare_and_swap(&self, key: &str, expected: &str, value: &str)
        -> PortResult<bool>;

    /// Returns `true` if a key was removed.
    async fn delete(&self, key: &str) -> PortResult<bool>;

    /// Atomically increments an integer counter, creating it at zero first.
    /// The TTL of an existing key is kept; a created key never expires.
    async fn increment(&self, key: &str) -> PortResult<u64>;

    /// Resets the TTL of an existing key. Returns `false` if the key was absent.
    async fn expire(&self, key: &str, ttl: Duration) -> PortResult<bool>;

    /// Lists every live key starting with `prefix`, in no particular order.
    async fn scan_prefix(&self, prefix: &str) -> PortResult<Vec<String>>;

    /// Removes every key starting with `prefix` and returns how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> PortResult<u64>;
}

/// Byte storage for uploaded files.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Stores `bytes` under `name` + `extension`, overwriting any previous blob
    /// with the same reference, and returns the stable reference.
    async fn store(&self, name: &str, bytes: &[u8], extension: &str) -> PortResult<String>;

    async fn exists(&self, reference: &str) -> PortResult<bool>;

    /// Reads a whole blob. Fails with `NotFound` if it is missing.
    async fn read(&self, reference: &str) -> PortResult<Bytes>;

    /// Removes a blob. Removing a missing blob is not an error.
    async fn remove(&self, reference: &str) -> PortResult<()>;
}

/// One-way salted hashing for user credentials.
///
/// The methods are synchronous and CPU-bound; callers run them on the
/// blocking thread pool.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> PortResult<String>;

    /// Returns `Ok(false)` on a mismatch and an error only when `hash` is unusable.
    fn verify(&self, plaintext: &str, hash: &str) -> PortResult<bool>;
}
