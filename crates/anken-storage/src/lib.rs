//! Content fingerprinting and the entry store contract.

use anken_core::{EntryId, NewEntry, ParsedEntry, StoredEntry, Tag, TagCategory, TagId};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

mod memory;
mod postgres;

pub use memory::MemoryEntryStore;
pub use postgres::PgEntryStore;

pub const CRATE_NAME: &str = "anken-storage";

pub const FINGERPRINT_LEN: usize = 24;

/// The seven identity fields, absence as `""`, line breaks (`\n`, `\r\n`)
/// removed from each value, joined by `\n`.
pub fn canonical_identity(entry: &ParsedEntry) -> String {
    entry
        .identity_fields()
        .iter()
        .map(|field| field.unwrap_or_default().replace("\r\n", "").replace('\n', ""))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn fingerprint(entry: &ParsedEntry) -> String {
    let digest = Sha256::digest(canonical_identity(entry).as_bytes());
    hex::encode(&digest[..FINGERPRINT_LEN / 2])
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("entry {0} not found")]
    EntryNotFound(EntryId),
    #[error("tag {0} not found")]
    TagNotFound(TagId),
    #[error("invalid stored value: {0}")]
    InvalidRow(String),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return StoreError::Conflict(db_err.message().to_string());
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Implementations must keep `(title, fingerprint)` unique for entries and
/// `name` unique for tags.
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn find_by_title_and_fingerprint(
        &self,
        title: &str,
        fingerprint: &str,
    ) -> StoreResult<Option<StoredEntry>>;

    /// Newest `updated_at` first.
    async fn list_by_title_and_company(
        &self,
        title: &str,
        company: Option<&str>,
    ) -> StoreResult<Vec<StoredEntry>>;

    /// Insert the entry and its tag associations in one step; nothing is kept on failure.
    async fn insert_entry(&self, new: NewEntry, tag_ids: &[TagId]) -> StoreResult<StoredEntry>;

    /// Overwrites parsed fields and fingerprint and bumps `updated_at`; review state stays.
    /// `Some(tag_ids)` replaces the tag associations in the same step.
    async fn update_entry(
        &self,
        id: EntryId,
        entry: &ParsedEntry,
        fingerprint: &str,
        tag_ids: Option<&[TagId]>,
    ) -> StoreResult<StoredEntry>;

    async fn update_fingerprint(&self, id: EntryId, fingerprint: &str) -> StoreResult<()>;

    async fn list_entries(&self) -> StoreResult<Vec<StoredEntry>>;

    async fn ensure_tag(&self, name: &str, category: TagCategory) -> StoreResult<Tag>;

    async fn replace_entry_tags(&self, id: EntryId, tag_ids: &[TagId]) -> StoreResult<()>;

    async fn entry_tags(&self, id: EntryId) -> StoreResult<Vec<Tag>>;
}
