//! crates/pastebin_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any storage backend or wire format.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Whether a bin carries its content inline or points into blob storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    File,
}

/// A shareable unit of content, addressed by id or by its alias.
#[derive(Debug, Clone, PartialEq)]
pub struct Bin {
    pub id: String,
    /// Empty when the bin is only addressable by id.
    pub alias: String,
    /// Inline text for `ContentKind::Text`, a blob reference for `ContentKind::File`.
    pub contain: String,
    pub kind: ContentKind,
    /// Number of successful alias lookups.
    pub clic: u64,
    /// Weak reference to the owning user; never cascades.
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Input for creating a text bin.
#[derive(Debug, Clone, Default)]
pub struct NewBin {
    pub alias: String,
    pub contain: String,
    pub user_id: Option<String>,
}

/// Input for creating a bin backed by an uploaded file.
#[derive(Debug, Clone)]
pub struct NewFileBin {
    pub alias: String,
    pub bytes: Bytes,
    /// File extension including the leading dot, e.g. `.png`. May be empty.
    pub extension: String,
    pub user_id: Option<String>,
}

/// The desired state of a bin for a full-replace update.
///
/// `alias`, `contain` and `user_id` overwrite the stored values. The kind of a
/// bin is fixed at creation: `kind` may only repeat it. A file bin's `contain`
/// is its blob reference and is owned by the repository, so it may only be
/// left empty or repeated.
#[derive(Debug, Clone, Default)]
pub struct BinUpdate {
    pub alias: String,
    pub contain: String,
    pub kind: Option<ContentKind>,
    pub user_id: Option<String>,
}

/// An account. The password hash is a PHC string, never the plaintext.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
}

/// Click count for a single bin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinClicks {
    pub bin_id: String,
    pub clicks: u64,
}

/// Read model recomputed from the live bin population on every request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Statistics {
    pub bin_count: usize,
    pub clicks_by_bin: Vec<BinClicks>,
}
