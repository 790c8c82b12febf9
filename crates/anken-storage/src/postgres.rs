//! PostgreSQL-backed `EntryStore`.

use std::time::Duration;

use anken_core::{EntryId, EntryStatus, NewEntry, ParsedEntry, StoredEntry, Tag, TagCategory, TagId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{PgConnection, Row};
use tracing::info;
use uuid::Uuid;

use crate::{EntryStore, StoreError, StoreResult};

const ENTRY_COLUMNS: &str = "id, title, company, distribution, price, period, location, billing, \
     interview, time, notes, description, requirements, preferences, tech_stack, \
     status, starred, comment, fingerprint, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgEntryStore {
    pool: PgPool,
}

impl PgEntryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(20))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("database migrations applied");
        Ok(())
    }
}

fn entry_from_row(row: &PgRow) -> StoreResult<StoredEntry> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<EntryStatus>()
        .map_err(|e| StoreError::InvalidRow(e.to_string()))?;
    Ok(StoredEntry {
        id: row.try_get("id")?,
        entry: ParsedEntry {
            title: row.try_get("title")?,
            company: row.try_get("company")?,
            distribution: row.try_get("distribution")?,
            price: row.try_get("price")?,
            period: row.try_get("period")?,
            location: row.try_get("location")?,
            billing: row.try_get("billing")?,
            interview: row.try_get("interview")?,
            time: row.try_get("time")?,
            notes: row.try_get("notes")?,
            description: row.try_get("description")?,
            requirements: row.try_get("requirements")?,
            preferences: row.try_get("preferences")?,
            tech_stack: row.try_get("tech_stack")?,
        },
        status,
        starred: row.try_get("starred")?,
        comment: row.try_get("comment")?,
        fingerprint: row.try_get("fingerprint")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn tag_from_row(row: &PgRow) -> StoreResult<Tag> {
    let category: String = row.try_get("category")?;
    Ok(Tag {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        category: category
            .parse::<TagCategory>()
            .map_err(|e| StoreError::InvalidRow(e.to_string()))?,
        created_at: row.try_get("created_at")?,
    })
}

async fn attach_tags(conn: &mut PgConnection, id: EntryId, tag_ids: &[TagId]) -> StoreResult<()> {
    sqlx::query("DELETE FROM entry_tags WHERE entry_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    for tag_id in tag_ids {
        sqlx::query(
            "INSERT INTO entry_tags (entry_id, tag_id) VALUES ($1, $2) \
             ON CONFLICT (entry_id, tag_id) DO NOTHING",
        )
        .bind(id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl EntryStore for PgEntryStore {
    async fn find_by_title_and_fingerprint(
        &self,
        title: &str,
        fingerprint: &str,
    ) -> StoreResult<Option<StoredEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE title = $1 AND fingerprint = $2 LIMIT 1"
        ))
        .bind(title)
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn list_by_title_and_company(
        &self,
        title: &str,
        company: Option<&str>,
    ) -> StoreResult<Vec<StoredEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries \
             WHERE title = $1 AND company IS NOT DISTINCT FROM $2 \
             ORDER BY updated_at DESC"
        ))
        .bind(title)
        .bind(company)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn insert_entry(&self, new: NewEntry, tag_ids: &[TagId]) -> StoreResult<StoredEntry> {
        let e = &new.entry;
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "INSERT INTO entries (id, title, company, distribution, price, period, location, \
             billing, interview, time, notes, description, requirements, preferences, tech_stack, \
             status, starred, fingerprint) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, FALSE, $17) \
             RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&e.title)
        .bind(&e.company)
        .bind(&e.distribution)
        .bind(&e.price)
        .bind(&e.period)
        .bind(&e.location)
        .bind(&e.billing)
        .bind(&e.interview)
        .bind(&e.time)
        .bind(&e.notes)
        .bind(&e.description)
        .bind(&e.requirements)
        .bind(&e.preferences)
        .bind(&e.tech_stack)
        .bind(EntryStatus::New.as_str())
        .bind(&new.fingerprint)
        .fetch_one(&mut *tx)
        .await?;
        let stored = entry_from_row(&row)?;
        attach_tags(&mut tx, stored.id, tag_ids).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn update_entry(
        &self,
        id: EntryId,
        entry: &ParsedEntry,
        fingerprint: &str,
        tag_ids: Option<&[TagId]>,
    ) -> StoreResult<StoredEntry> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "UPDATE entries SET title = $2, company = $3, distribution = $4, price = $5, \
             period = $6, location = $7, billing = $8, interview = $9, time = $10, notes = $11, \
             description = $12, requirements = $13, preferences = $14, tech_stack = $15, \
             fingerprint = $16, updated_at = now() \
             WHERE id = $1 RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(id)
        .bind(&entry.title)
        .bind(&entry.company)
        .bind(&entry.distribution)
        .bind(&entry.price)
        .bind(&entry.period)
        .bind(&entry.location)
        .bind(&entry.billing)
        .bind(&entry.interview)
        .bind(&entry.time)
        .bind(&entry.notes)
        .bind(&entry.description)
        .bind(&entry.requirements)
        .bind(&entry.preferences)
        .bind(&entry.tech_stack)
        .bind(fingerprint)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Err(StoreError::EntryNotFound(id));
        };
        let stored = entry_from_row(&row)?;
        if let Some(tag_ids) = tag_ids {
            attach_tags(&mut tx, id, tag_ids).await?;
        }
        tx.commit().await?;
        Ok(stored)
    }

    async fn update_fingerprint(&self, id: EntryId, fingerprint: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE entries SET fingerprint = $2 WHERE id = $1")
            .bind(id)
            .bind(fingerprint)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::EntryNotFound(id));
        }
        Ok(())
    }

    async fn list_entries(&self) -> StoreResult<Vec<StoredEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn ensure_tag(&self, name: &str, category: TagCategory) -> StoreResult<Tag> {
        // no-op update so RETURNING yields the existing row
        let row = sqlx::query(
            "INSERT INTO tags (id, name, category) VALUES ($1, $2, $3) \
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
             RETURNING id, name, category, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(category.as_str())
        .fetch_one(&self.pool)
        .await?;
        tag_from_row(&row)
    }

    async fn replace_entry_tags(&self, id: EntryId, tag_ids: &[TagId]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let exists = sqlx::query("SELECT 1 FROM entries WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::EntryNotFound(id));
        }

        attach_tags(&mut tx, id, tag_ids).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn entry_tags(&self, id: EntryId) -> StoreResult<Vec<Tag>> {
        let rows = sqlx::query(
            "SELECT t.id, t.name, t.category, t.created_at FROM tags t \
             JOIN entry_tags et ON et.tag_id = t.id \
             WHERE et.entry_id = $1 ORDER BY t.name",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(tag_from_row).collect()
    }
}
