//! In-memory `EntryStore` for tests and dry runs.

use std::collections::{BTreeMap, HashMap};

use anken_core::{EntryId, EntryStatus, NewEntry, ParsedEntry, StoredEntry, Tag, TagCategory, TagId};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{EntryStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct MemoryState {
    entries: Vec<StoredEntry>,
    tags: BTreeMap<String, Tag>,
    entry_tags: HashMap<EntryId, Vec<TagId>>,
}

impl MemoryState {
    fn entry_mut(&mut self, id: EntryId) -> StoreResult<&mut StoredEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(StoreError::EntryNotFound(id))
    }

    fn known_tags(&self, tag_ids: &[TagId]) -> StoreResult<Vec<TagId>> {
        let mut ids: Vec<TagId> = Vec::with_capacity(tag_ids.len());
        for tid in tag_ids {
            if !self.tags.values().any(|t| t.id == *tid) {
                return Err(StoreError::TagNotFound(*tid));
            }
            if !ids.contains(tid) {
                ids.push(*tid);
            }
        }
        Ok(ids)
    }
}

#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    state: Mutex<MemoryState>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entry_count(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn tag_count(&self) -> usize {
        self.state.lock().await.tags.len()
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    async fn find_by_title_and_fingerprint(
        &self,
        title: &str,
        fingerprint: &str,
    ) -> StoreResult<Option<StoredEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .iter()
            .find(|e| e.entry.title == title && e.fingerprint == fingerprint)
            .cloned())
    }

    async fn list_by_title_and_company(
        &self,
        title: &str,
        company: Option<&str>,
    ) -> StoreResult<Vec<StoredEntry>> {
        let state = self.state.lock().await;
        let mut found: Vec<StoredEntry> = state
            .entries
            .iter()
            .filter(|e| e.entry.title == title && e.entry.company.as_deref() == company)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(found)
    }

    async fn insert_entry(&self, new: NewEntry, tag_ids: &[TagId]) -> StoreResult<StoredEntry> {
        let mut state = self.state.lock().await;
        if state
            .entries
            .iter()
            .any(|e| e.entry.title == new.entry.title && e.fingerprint == new.fingerprint)
        {
            return Err(StoreError::Conflict(format!(
                "entry ({}, {}) already exists",
                new.entry.title, new.fingerprint
            )));
        }

        let tag_ids = state.known_tags(tag_ids)?;

        let now = Utc::now();
        let stored = StoredEntry {
            id: Uuid::new_v4(),
            entry: new.entry,
            status: EntryStatus::New,
            starred: false,
            comment: None,
            fingerprint: new.fingerprint,
            created_at: now,
            updated_at: now,
        };
        state.entries.push(stored.clone());
        state.entry_tags.insert(stored.id, tag_ids);
        Ok(stored)
    }

    async fn update_entry(
        &self,
        id: EntryId,
        entry: &ParsedEntry,
        fingerprint: &str,
        tag_ids: Option<&[TagId]>,
    ) -> StoreResult<StoredEntry> {
        let mut state = self.state.lock().await;
        if state
            .entries
            .iter()
            .any(|e| e.id != id && e.entry.title == entry.title && e.fingerprint == fingerprint)
        {
            return Err(StoreError::Conflict(format!(
                "entry ({}, {fingerprint}) already exists",
                entry.title
            )));
        }

        state.entry_mut(id)?;
        let tag_ids = tag_ids.map(|ids| state.known_tags(ids)).transpose()?;

        let stored = state.entry_mut(id)?;
        stored.entry = entry.clone();
        stored.fingerprint = fingerprint.to_string();
        // updated_at must advance even when the clock has not.
        stored.updated_at = Utc::now().max(stored.updated_at + Duration::microseconds(1));
        let stored = stored.clone();
        if let Some(ids) = tag_ids {
            state.entry_tags.insert(id, ids);
        }
        Ok(stored)
    }

    async fn update_fingerprint(&self, id: EntryId, fingerprint: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let stored = state.entry_mut(id)?;
        stored.fingerprint = fingerprint.to_string();
        Ok(())
    }

    async fn list_entries(&self) -> StoreResult<Vec<StoredEntry>> {
        Ok(self.state.lock().await.entries.clone())
    }

    async fn ensure_tag(&self, name: &str, category: TagCategory) -> StoreResult<Tag> {
        let mut state = self.state.lock().await;
        let tag = state.tags.entry(name.to_string()).or_insert_with(|| Tag {
            id: Uuid::new_v4(),
            name: name.to_string(),
            category,
            created_at: Utc::now(),
        });
        Ok(tag.clone())
    }

    async fn replace_entry_tags(&self, id: EntryId, tag_ids: &[TagId]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.entry_mut(id)?;
        let ids = state.known_tags(tag_ids)?;
        state.entry_tags.insert(id, ids);
        Ok(())
    }

    async fn entry_tags(&self, id: EntryId) -> StoreResult<Vec<Tag>> {
        let state = self.state.lock().await;
        let Some(ids) = state.entry_tags.get(&id) else {
            return Ok(Vec::new());
        };
        let mut tags: Vec<Tag> = state
            .tags
            .values()
            .filter(|t| ids.contains(&t.id))
            .cloned()
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }
}
