//! Core domain model for job-listing imports.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "anken-core";

pub const SNIPPET_MAX_CHARS: usize = 300;

pub type EntryId = Uuid;
pub type TagId = Uuid;

/// `title` is always non-empty. Every other field is either a trimmed,
/// non-empty value or `None`; the extractor never stores `""`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ParsedEntry {
    pub title: String,
    pub company: Option<String>,
    pub distribution: Option<String>,
    pub price: Option<String>,
    pub period: Option<String>,
    pub location: Option<String>,
    pub billing: Option<String>,
    pub interview: Option<String>,
    pub time: Option<String>,
    pub notes: Option<String>,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub preferences: Option<String>,
    pub tech_stack: Option<String>,
}

impl ParsedEntry {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// The seven fields that make up an entry's dedup identity, in canonical order.
    pub fn identity_fields(&self) -> [Option<&str>; 7] {
        [
            Some(self.title.as_str()),
            self.company.as_deref(),
            self.distribution.as_deref(),
            self.price.as_deref(),
            self.period.as_deref(),
            self.location.as_deref(),
            self.billing.as_deref(),
        ]
    }

    pub fn tagging_fields(&self) -> impl Iterator<Item = &str> {
        [
            Some(self.title.as_str()),
            self.description.as_deref(),
            self.requirements.as_deref(),
            self.preferences.as_deref(),
            self.tech_stack.as_deref(),
        ]
        .into_iter()
        .flatten()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    #[default]
    New,
    Reviewed,
    Rejected,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Reviewed => "reviewed",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for EntryStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "reviewed" => Ok(Self::Reviewed),
            "rejected" => Ok(Self::Rejected),
            other => Err(UnknownVariant {
                kind: "entry status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagCategory {
    Language,
    Framework,
    Library,
    Cloud,
    Database,
    Devops,
    Other,
}

impl TagCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Language => "language",
            Self::Framework => "framework",
            Self::Library => "library",
            Self::Cloud => "cloud",
            Self::Database => "database",
            Self::Devops => "devops",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for TagCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagCategory {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "language" => Ok(Self::Language),
            "framework" => Ok(Self::Framework),
            "library" => Ok(Self::Library),
            "cloud" => Ok(Self::Cloud),
            "database" => Ok(Self::Database),
            "devops" => Ok(Self::Devops),
            "other" => Ok(Self::Other),
            other => Err(UnknownVariant {
                kind: "tag category",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagCandidate {
    pub name: String,
    pub category: TagCategory,
}

impl TagCandidate {
    pub fn new(name: impl Into<String>, category: TagCategory) -> Self {
        Self {
            name: name.into(),
            category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub category: TagCategory,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    pub entry: ParsedEntry,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub id: EntryId,
    #[serde(flatten)]
    pub entry: ParsedEntry,
    pub status: EntryStatus,
    pub starred: bool,
    pub comment: Option<String>,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Block-scoped structural failure. Never aborts sibling blocks.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ParseError {
    #[error("block {block_index}: no title found")]
    MissingTitle { block_index: usize, snippet: String },
    #[error("block {block_index}: unterminated multiline field {marker}")]
    UnterminatedMultilineField {
        block_index: usize,
        marker: String,
        snippet: String,
    },
    #[error("block {block_index}: corrupt block: {detail}")]
    CorruptBlock {
        block_index: usize,
        detail: String,
        snippet: String,
    },
}

impl ParseError {
    pub fn block_index(&self) -> usize {
        match self {
            Self::MissingTitle { block_index, .. }
            | Self::UnterminatedMultilineField { block_index, .. }
            | Self::CorruptBlock { block_index, .. } => *block_index,
        }
    }

    pub fn snippet(&self) -> &str {
        match self {
            Self::MissingTitle { snippet, .. }
            | Self::UnterminatedMultilineField { snippet, .. }
            | Self::CorruptBlock { snippet, .. } => snippet,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingTitle { .. } => "MissingTitle",
            Self::UnterminatedMultilineField { .. } => "UnterminatedMultilineField",
            Self::CorruptBlock { .. } => "CorruptBlock",
        }
    }
}

pub fn snippet_of(text: &str) -> String {
    text.chars().take(SNIPPET_MAX_CHARS).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedEntry {
    pub block_index: usize,
    pub entry: ParsedEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ParseResult {
    pub entries: Vec<IndexedEntry>,
    pub errors: Vec<ParseError>,
}

impl ParseResult {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.errors.is_empty()
    }

    /// True when the document produced structural errors and nothing usable.
    pub fn is_total_failure(&self) -> bool {
        self.entries.is_empty() && !self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Created,
    Updated,
    Skipped,
    Error,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
