//! Keyword-based technology tagging.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anken_core::{EntryId, ParsedEntry, Tag, TagCandidate, TagCategory};
use anken_storage::{EntryStore, StoreResult};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::debug;

const BUILTIN_KEYWORDS: &str = include_str!("../../../rules/tech_keywords.yaml");

#[derive(Debug, Clone, Deserialize)]
struct KeywordTableFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    categories: BTreeMap<TagCategory, Vec<String>>,
}

/// Category → ordered keyword list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordTable {
    categories: Vec<(TagCategory, Vec<String>)>,
}

impl KeywordTable {
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str(BUILTIN_KEYWORDS).context("parsing built-in keyword table")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let file: KeywordTableFile = serde_yaml::from_str(text)?;
        let categories = file
            .categories
            .into_iter()
            .map(|(category, keywords)| {
                let keywords = keywords
                    .into_iter()
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect::<Vec<_>>();
                (category, keywords)
            })
            .collect::<Vec<_>>();
        if categories.iter().all(|(_, k)| k.is_empty()) {
            bail!("keyword table has no keywords");
        }
        Ok(Self { categories })
    }

    pub fn len(&self) -> usize {
        self.categories.iter().map(|(_, k)| k.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn iter(&self) -> impl Iterator<Item = (TagCategory, &str)> {
        self.categories
            .iter()
            .flat_map(|(category, keywords)| keywords.iter().map(move |k| (*category, k.as_str())))
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '#')
}

/// Whole-word, case-insensitive containment. Both arguments must already be lowercased.
///
/// Non-ASCII characters (kana, kanji) count as boundaries, so `java経験` matches
/// `java`. A `.` after the keyword is a boundary only when no alphanumeric follows,
/// which keeps `vue` from matching inside `vue.js`.
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let left_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !is_word_char(c));
        let mut after = haystack[end..].chars();
        let right_ok = match after.next() {
            None => true,
            Some('.') => !after.next().is_some_and(|c| c.is_ascii_alphanumeric()),
            Some(c) => !is_word_char(c),
        };
        left_ok && right_ok
    })
}

#[derive(Debug, Clone)]
pub struct TechTagger {
    table: KeywordTable,
}

impl TechTagger {
    pub fn new(table: KeywordTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &KeywordTable {
        &self.table
    }

    /// Every keyword found in `text`, once each, in table order.
    pub fn extract(&self, text: &str) -> Vec<TagCandidate> {
        let haystack = text.to_lowercase();
        let mut seen = BTreeSet::new();
        let mut found = Vec::new();
        for (category, keyword) in self.table.iter() {
            if seen.contains(keyword) {
                continue;
            }
            if contains_word(&haystack, &keyword.to_lowercase()) {
                seen.insert(keyword);
                found.push(TagCandidate::new(keyword, category));
            }
        }
        found
    }

    pub fn tagging_text(entry: &ParsedEntry) -> String {
        entry.tagging_fields().collect::<Vec<_>>().join(" ")
    }

    pub fn extract_for_entry(&self, entry: &ParsedEntry) -> Vec<TagCandidate> {
        self.extract(&Self::tagging_text(entry))
    }

    /// Catalog tags for the keywords found in `entry`, created on first sight.
    pub async fn resolve_tags(
        &self,
        store: &dyn EntryStore,
        entry: &ParsedEntry,
    ) -> StoreResult<Vec<Tag>> {
        let candidates = self.extract_for_entry(entry);
        let mut tags = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            tags.push(store.ensure_tag(&candidate.name, candidate.category).await?);
        }
        Ok(tags)
    }

    /// Replace the tag set of a stored entry with the tags found in its text.
    pub async fn tag_entry(
        &self,
        store: &dyn EntryStore,
        id: EntryId,
        entry: &ParsedEntry,
    ) -> StoreResult<Vec<Tag>> {
        let tags = self.resolve_tags(store, entry).await?;
        let tag_ids = tags.iter().map(|t| t.id).collect::<Vec<_>>();
        store.replace_entry_tags(id, &tag_ids).await?;
        debug!(entry_id = %id, tags = tags.len(), "tagged entry");
        Ok(tags)
    }
}
