//! crates/pastebin_core/src/bins.rs
//!
//! The bin repository: creation with alias claiming, lookup by alias with
//! click counting, enumeration, full-replace updates, deletion and expiration.
//!
//! Aliases are resolved through an explicit `bin:alias:{alias}` index written
//! with a conditional set, and clicks live in a separate atomic counter that is
//! joined into the returned `Bin` at read time.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Bin, BinUpdate, ContentKind, NewBin, NewFileBin};
use crate::keys;
use crate::ports::{BlobStorage, KeyValueStore, PortError, PortResult};

/// Bins are passively reclaimed by the store 30 days after creation.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const MAX_ALIAS_LEN: usize = 64;

/// Aliases that would shadow fixed routes.
const RESERVED_ALIASES: &[&str] = &["statistics", "files"];

/// Compare-and-swap rounds before a contended record write gives up.
const MAX_SWAP_ATTEMPTS: usize = 8;

//=========================================================================================
// Stored Record
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum KindRecord {
    Text,
    File,
}

impl From<ContentKind> for KindRecord {
    fn from(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Text => KindRecord::Text,
            ContentKind::File => KindRecord::File,
        }
    }
}

impl From<KindRecord> for ContentKind {
    fn from(kind: KindRecord) -> Self {
        match kind {
            KindRecord::Text => ContentKind::Text,
            KindRecord::File => ContentKind::File,
        }
    }
}

/// The document stored under `bin:record:{id}`. The click count is kept in
/// its own counter key and is not part of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BinRecord {
    id: String,
    #[serde(default)]
    alias: String,
    contain: String,
    kind: KindRecord,
    #[serde(default)]
    user_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl BinRecord {
    fn to_domain(self, clic: u64) -> Bin {
        Bin {
            id: self.id,
            alias: self.alias,
            contain: self.contain,
            kind: self.kind.into(),
            clic,
            user_id: self.user_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_at: self.expires_at,
        }
    }

    /// Time left before the store reclaims this record, `None` once it is due.
    fn remaining_ttl(&self) -> Option<Duration> {
        (self.expires_at - Utc::now())
            .to_std()
            .ok()
            .filter(|ttl| !ttl.is_zero())
    }
}

//=========================================================================================
// Alias Validation
//=========================================================================================

/// Trims an alias and checks it against the allowed character set.
/// An empty alias is valid and means "addressable by id only".
pub fn normalize_alias(alias: &str) -> PortResult<String> {
    let alias = alias.trim();
    if alias.is_empty() {
        return Ok(String::new());
    }
    if alias.len() > MAX_ALIAS_LEN {
        return Err(PortError::InvalidArgument(format!(
            "alias is longer than {MAX_ALIAS_LEN} characters"
        )));
    }
    if !alias
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(PortError::InvalidArgument(format!(
            "alias '{alias}' may only contain letters, digits, '-' and '_'"
        )));
    }
    if RESERVED_ALIASES.contains(&alias) {
        return Err(PortError::InvalidArgument(format!(
            "alias '{alias}' is reserved"
        )));
    }
    Ok(alias.to_string())
}

/// `now + ttl`, rejecting lifetimes that do not fit in a timestamp.
fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> PortResult<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| {
            PortError::InvalidArgument(format!("lifetime of {}s is out of range", ttl.as_secs()))
        })
}

/// Applies the kind and blob-reference rules of a full-replace update.
fn check_update(current: &BinRecord, update: &BinUpdate) -> PortResult<()> {
    let kind = ContentKind::from(current.kind);
    if update.kind.is_some_and(|requested| requested != kind) {
        return Err(PortError::InvalidArgument(
            "the kind of a bin cannot be changed".to_string(),
        ));
    }
    if kind == ContentKind::File && !update.contain.is_empty() && update.contain != current.contain
    {
        return Err(PortError::InvalidArgument(
            "the file behind a file bin cannot be replaced".to_string(),
        ));
    }
    Ok(())
}

//=========================================================================================
// The Repository
//=========================================================================================

/// Key-value backed store of `Bin` records.
///
/// Cheap to clone; the store and blob handles are shared.
#[derive(Clone)]
pub struct BinRepository {
    store: Arc<dyn KeyValueStore>,
    blobs: Arc<dyn BlobStorage>,
    retention: Duration,
}

impl BinRepository {
    pub fn new(store: Arc<dyn KeyValueStore>, blobs: Arc<dyn BlobStorage>) -> Self {
        Self {
            store,
            blobs,
            retention: DEFAULT_RETENTION,
        }
    }

    /// Overrides the default 30 day retention.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Creates a text bin. Fails with `AliasConflict` if a live bin holds the alias.
    pub async fn create_bin(&self, new_bin: NewBin) -> PortResult<Bin> {
        let alias = normalize_alias(&new_bin.alias)?;
        let record = self.new_record(alias, new_bin.contain, ContentKind::Text, new_bin.user_id)?;

        self.claim_alias(&record.alias, &record.id, self.retention).await?;
        if let Err(e) = self.write_new_record(&record).await {
            self.release_alias(&record.alias, &record.id).await;
            return Err(e);
        }

        info!(id = %record.id, alias = %record.alias, "Created text bin");
        Ok(record.to_domain(0))
    }

    /// Creates a bin whose content is an uploaded file.
    ///
    /// The blob is named after the bin's id, which never changes, so renaming
    /// or deleting one bin can never reach another bin's file. The alias is
    /// claimed first, then the blob is written in full, and only then is the
    /// record persisted. The claim is released if either write fails.
    pub async fn create_file_bin(&self, upload: NewFileBin) -> PortResult<Bin> {
        let alias = normalize_alias(&upload.alias)?;
        let mut record = self.new_record(alias, String::new(), ContentKind::File, upload.user_id)?;

        self.claim_alias(&record.alias, &record.id, self.retention).await?;

        let extension = upload.extension.to_lowercase();
        let stored = self.blobs.store(&record.id, &upload.bytes, &extension).await;
        match stored {
            Ok(reference) => record.contain = reference,
            Err(e) => {
                self.release_alias(&record.alias, &record.id).await;
                return Err(e);
            }
        }

        if let Err(e) = self.write_new_record(&record).await {
            self.release_alias(&record.alias, &record.id).await;
            if let Err(remove_err) = self.blobs.remove(&record.contain).await {
                warn!(reference = %record.contain, "Failed to remove orphaned blob: {}", remove_err);
            }
            return Err(e);
        }

        info!(
            id = %record.id,
            alias = %record.alias,
            size = upload.bytes.len(),
            "Created file bin"
        );
        Ok(record.to_domain(0))
    }

    /// Resolves a bin by alias and counts the lookup as one click.
    ///
    /// The counter is incremented atomically in the store, so concurrent lookups
    /// never lose clicks. The returned bin carries the post-increment count.
    pub async fn get_bin_by_alias(&self, alias: &str) -> PortResult<Bin> {
        let alias = alias.trim();
        if alias.is_empty() {
            return Err(PortError::InvalidArgument("there is no alias provided".to_string()));
        }

        let id = self
            .store
            .get(&keys::bin_alias(alias))
            .await?
            .ok_or_else(|| PortError::NotFound(format!("bin with alias '{alias}'")))?;

        let record = self
            .load_record(&id)
            .await?
            .ok_or_else(|| PortError::NotFound(format!("bin with alias '{alias}'")))?;
        let remaining = record
            .remaining_ttl()
            .ok_or_else(|| PortError::NotFound(format!("bin with alias '{alias}'")))?;

        let clicks_key = keys::bin_clicks(&id);
        let clic = self.store.increment(&clicks_key).await?;
        if clic == 1 {
            // A freshly created counter has no TTL; align it with the record.
            self.store.expire(&clicks_key, remaining).await?;
        }

        debug!(id = %id, alias = %alias, clic, "Resolved bin by alias");
        Ok(record.to_domain(clic))
    }

    /// Direct lookup by id. Does not count a click.
    pub async fn get_bin_by_id(&self, id: &str) -> PortResult<Bin> {
        let record = self
            .load_record(id)
            .await?
            .ok_or_else(|| PortError::NotFound(format!("bin {id}")))?;
        let clic = self.read_clicks(id).await?;
        Ok(record.to_domain(clic))
    }

    /// Enumerates every live bin, in no particular order.
    ///
    /// Aborts with `PortError::Cancelled` as soon as `cancel` fires.
    pub async fn get_all_bins(&self, cancel: &CancellationToken) -> PortResult<Vec<Bin>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Bin enumeration cancelled");
                Err(PortError::Cancelled)
            }
            bins = self.scan_bins() => bins,
        }
    }

    /// Replaces the stored state of bin `id` with `update`.
    ///
    /// `id`, `kind`, `created_at`, `expires_at` and the click counter are kept;
    /// `updated_at` is set to now. A file bin keeps its blob reference. Changing
    /// the alias claims the new one and releases the old one.
    ///
    /// The record is written with a compare-and-swap against the version it was
    /// derived from, so a concurrent `set_expiration` or update is never undone.
    pub async fn update_bin(&self, id: &str, update: BinUpdate) -> PortResult<Bin> {
        let alias = normalize_alias(&update.alias)?;
        let snapshot = self
            .load_raw_record(id)
            .await?
            .ok_or_else(|| PortError::NotFound(format!("bin {id}")))?;
        let remaining = snapshot
            .1
            .remaining_ttl()
            .ok_or_else(|| PortError::NotFound(format!("bin {id}")))?;
        check_update(&snapshot.1, &update)?;

        let claimed = alias != snapshot.1.alias;
        if claimed {
            self.claim_alias(&alias, id, remaining).await?;
        }

        let swapped = self
            .swap_record(id, snapshot, |current| {
                check_update(current, &update)?;
                let contain = match current.kind {
                    KindRecord::File => current.contain.clone(),
                    KindRecord::Text => update.contain.clone(),
                };
                Ok(BinRecord {
                    alias: alias.clone(),
                    contain,
                    user_id: update.user_id.clone(),
                    updated_at: Utc::now(),
                    ..current.clone()
                })
            })
            .await;
        let (previous, updated) = match swapped {
            Ok(pair) => pair,
            Err(e) => {
                if claimed {
                    self.release_alias(&alias, id).await;
                }
                return Err(e);
            }
        };

        if previous.alias != updated.alias {
            self.release_alias(&previous.alias, id).await;
        }
        // The claim used the lifetime seen before the swap; follow the record.
        if claimed {
            if let Some(ttl) = updated.remaining_ttl() {
                self.store.expire(&keys::bin_alias(&updated.alias), ttl).await?;
            }
        }

        let clic = self.read_clicks(id).await?;
        info!(id = %id, alias = %updated.alias, "Updated bin");
        Ok(updated.to_domain(clic))
    }

    /// Deletes bin `id` and returns its last state, click count included.
    pub async fn delete_bin_by_id(&self, id: &str) -> PortResult<Bin> {
        let record = self
            .load_record(id)
            .await?
            .ok_or_else(|| PortError::NotFound(format!("bin {id}")))?;
        let clic = self.read_clicks(id).await?;

        if !self.store.delete(&keys::bin_record(id)).await? {
            return Err(PortError::NotFound(format!("bin {id}")));
        }
        self.release_alias(&record.alias, id).await;
        self.store.delete(&keys::bin_clicks(id)).await?;

        if record.kind == KindRecord::File {
            if let Err(e) = self.blobs.remove(&record.contain).await {
                warn!(id = %id, reference = %record.contain, "Failed to remove blob: {}", e);
            }
        }

        info!(id = %id, alias = %record.alias, "Deleted bin");
        Ok(record.to_domain(clic))
    }

    /// Moves the expiration of bin `id` to `ttl` from now.
    pub async fn set_expiration(&self, id: &str, ttl: Duration) -> PortResult<Bin> {
        if ttl.is_zero() {
            return Err(PortError::InvalidArgument(
                "expiration must be greater than zero".to_string(),
            ));
        }
        let expires_at = expiry_after(Utc::now(), ttl)?;
        let snapshot = self
            .load_raw_record(id)
            .await?
            .ok_or_else(|| PortError::NotFound(format!("bin {id}")))?;

        let (_, record) = self
            .swap_record(id, snapshot, |current| {
                Ok(BinRecord {
                    expires_at,
                    ..current.clone()
                })
            })
            .await?;

        if !self.store.expire(&keys::bin_record(id), ttl).await? {
            return Err(PortError::NotFound(format!("bin {id}")));
        }
        if !record.alias.is_empty() {
            self.store.expire(&keys::bin_alias(&record.alias), ttl).await?;
        }
        self.store.expire(&keys::bin_clicks(id), ttl).await?;

        let clic = self.read_clicks(id).await?;
        debug!(id = %id, ttl_secs = ttl.as_secs(), "Reset bin expiration");
        Ok(record.to_domain(clic))
    }

    /// Reads the blob behind a file bin.
    ///
    /// Fails with `NotFound` for text bins and for blobs that no longer exist.
    pub async fn read_file(&self, bin: &Bin) -> PortResult<Bytes> {
        if bin.kind != ContentKind::File {
            return Err(PortError::NotFound(format!("bin {} has no file", bin.id)));
        }
        if !self.blobs.exists(&bin.contain).await? {
            return Err(PortError::NotFound("file not found".to_string()));
        }
        self.blobs.read(&bin.contain).await
    }

    //-------------------------------------------------------------------------------------
    // Helpers
    //-------------------------------------------------------------------------------------

    /// Builds a fresh record with a new id and the configured retention.
    fn new_record(
        &self,
        alias: String,
        contain: String,
        kind: ContentKind,
        user_id: Option<String>,
    ) -> PortResult<BinRecord> {
        let now = Utc::now();
        Ok(BinRecord {
            id: Uuid::new_v4().to_string(),
            alias,
            contain,
            kind: kind.into(),
            user_id,
            created_at: now,
            updated_at: now,
            expires_at: expiry_after(now, self.retention)?,
        })
    }

    async fn write_new_record(&self, record: &BinRecord) -> PortResult<()> {
        let encoded = serde_json::to_string(record)?;
        self.store
            .set(&keys::bin_record(&record.id), &encoded, Some(self.retention))
            .await
    }

    async fn load_record(&self, id: &str) -> PortResult<Option<BinRecord>> {
        Ok(self.load_raw_record(id).await?.map(|(_, record)| record))
    }

    /// The stored document alongside its decoded form.
    async fn load_raw_record(&self, id: &str) -> PortResult<Option<(String, BinRecord)>> {
        match self.store.get(&keys::bin_record(id)).await? {
            Some(raw) => {
                let record = serde_json::from_str(&raw)?;
                Ok(Some((raw, record)))
            }
            None => Ok(None),
        }
    }

    /// Rewrites the record of bin `id` with `change` applied, retrying on a
    /// fresh read whenever another writer got there first. The key keeps its
    /// TTL. Returns the replaced and the written record.
    async fn swap_record<F>(
        &self,
        id: &str,
        snapshot: (String, BinRecord),
        change: F,
    ) -> PortResult<(BinRecord, BinRecord)>
    where
        F: Fn(&BinRecord) -> PortResult<BinRecord> + Send + Sync,
    {
        let key = keys::bin_record(id);
        let (mut raw, mut current) = snapshot;
        for _ in 0..MAX_SWAP_ATTEMPTS {
            let next = change(&current)?;
            let encoded = serde_json::to_string(&next)?;
            if self.store.compare_and_swap(&key, &raw, &encoded).await? {
                return Ok((current, next));
            }
            debug!(id = %id, "Bin changed under us, retrying");
            (raw, current) = self
                .load_raw_record(id)
                .await?
                .ok_or_else(|| PortError::NotFound(format!("bin {id}")))?;
        }
        Err(PortError::backend(
            format!("writing bin {id}"),
            format!("gave up after {MAX_SWAP_ATTEMPTS} concurrent modifications"),
        ))
    }

    async fn read_clicks(&self, id: &str) -> PortResult<u64> {
        match self.store.get(&keys::bin_clicks(id)).await? {
            Some(raw) => raw
                .parse()
                .map_err(|e| PortError::backend(format!("parsing click counter of bin {id}"), e)),
            None => Ok(0),
        }
    }

    /// Conditionally writes the alias index. An empty alias claims nothing.
    async fn claim_alias(&self, alias: &str, id: &str, ttl: Duration) -> PortResult<()> {
        if alias.is_empty() {
            return Ok(());
        }
        if self
            .store
            .set_if_absent(&keys::bin_alias(alias), id, Some(ttl))
            .await?
        {
            Ok(())
        } else {
            debug!(alias = %alias, "Alias already claimed");
            Err(PortError::AliasConflict(format!(
                "{alias} already exists as an alias"
            )))
        }
    }

    /// Removes the alias index if it still points at `id`. Best effort.
    async fn release_alias(&self, alias: &str, id: &str) {
        if alias.is_empty() {
            return;
        }
        let key = keys::bin_alias(alias);
        let result = async {
            if self.store.get(&key).await?.as_deref() == Some(id) {
                self.store.delete(&key).await?;
            }
            Ok::<(), PortError>(())
        }
        .await;
        if let Err(e) = result {
            warn!(alias = %alias, id = %id, "Failed to release alias: {}", e);
        }
    }

    async fn scan_bins(&self) -> PortResult<Vec<Bin>> {
        let record_keys = self.store.scan_prefix(keys::BIN_RECORD_PREFIX).await?;
        let mut bins = Vec::with_capacity(record_keys.len());

        for key in record_keys {
            let Some(id) = key.strip_prefix(keys::BIN_RECORD_PREFIX) else {
                continue;
            };
            // Keys can expire between the scan and the read.
            let Some(record) = self.load_record(id).await? else {
                debug!(id = %id, "Bin vanished during scan");
                continue;
            };
            let clic = self.read_clicks(id).await?;
            bins.push(record.to_domain(clic));
        }

        debug!(count = bins.len(), "Scanned bins");
        Ok(bins)
    }
}
