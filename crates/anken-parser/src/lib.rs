//! Block splitting and labeled-field extraction for listing text dumps.

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::LazyLock;

use anken_core::{snippet_of, IndexedEntry, ParseError, ParseResult, ParsedEntry};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CRATE_NAME: &str = "anken-parser";

pub const BLOCK_SEPARATOR: &str = "**************************************";
pub const LABEL_SEPARATOR: char = '：';

static LISTING_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^案件([０-９0-9]+)：").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarField {
    Company,
    Distribution,
    Price,
    Period,
    Location,
    Billing,
    Interview,
    Time,
    Notes,
}

impl ScalarField {
    fn slot<'a>(&self, entry: &'a mut ParsedEntry) -> &'a mut Option<String> {
        match self {
            Self::Company => &mut entry.company,
            Self::Distribution => &mut entry.distribution,
            Self::Price => &mut entry.price,
            Self::Period => &mut entry.period,
            Self::Location => &mut entry.location,
            Self::Billing => &mut entry.billing,
            Self::Interview => &mut entry.interview,
            Self::Time => &mut entry.time,
            Self::Notes => &mut entry.notes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultilineField {
    Description,
    Requirements,
    Preferences,
    TechStack,
}

impl MultilineField {
    fn slot<'a>(&self, entry: &'a mut ParsedEntry) -> &'a mut Option<String> {
        match self {
            Self::Description => &mut entry.description,
            Self::Requirements => &mut entry.requirements,
            Self::Preferences => &mut entry.preferences,
            Self::TechStack => &mut entry.tech_stack,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarLabel {
    pub field: ScalarField,
    pub label: String,
}

/// A bracketed section. `markers` are tried in order; the first one present in
/// the block is the only one used. Without a `closing` marker the section runs
/// until the next line that starts with a next-field glyph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultilineSection {
    pub field: MultilineField,
    pub markers: Vec<String>,
    #[serde(default)]
    pub closing: Option<String>,
}

/// Marker and label vocabulary of a listing document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLayout {
    pub separator: String,
    pub scalar_labels: Vec<ScalarLabel>,
    pub sections: Vec<MultilineSection>,
    pub next_field_glyphs: Vec<char>,
}

impl Default for DocumentLayout {
    fn default() -> Self {
        let scalar = |field, label: &str| ScalarLabel {
            field,
            label: label.to_string(),
        };
        let section = |field, markers: &[&str]| MultilineSection {
            field,
            markers: markers.iter().map(ToString::to_string).collect(),
            closing: None,
        };
        Self {
            separator: BLOCK_SEPARATOR.to_string(),
            scalar_labels: vec![
                scalar(ScalarField::Company, "会社"),
                scalar(ScalarField::Distribution, "商流"),
                scalar(ScalarField::Price, "単価"),
                scalar(ScalarField::Period, "期間"),
                scalar(ScalarField::Location, "場所"),
                scalar(ScalarField::Billing, "精算"),
                scalar(ScalarField::Interview, "面談"),
                scalar(ScalarField::Time, "時間"),
                scalar(ScalarField::Notes, "備考"),
            ],
            sections: vec![
                section(MultilineField::Description, &["＜概要＞"]),
                section(MultilineField::Requirements, &["＜必須スキル＞"]),
                section(MultilineField::Preferences, &["＜尚可スキル＞"]),
                section(MultilineField::TechStack, &["＜開発環境＞", "＜環境＞"]),
            ],
            next_field_glyphs: vec!['＜', '【'],
        }
    }
}

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("invalid pattern for label {label}: {source}")]
    Pattern {
        label: String,
        #[source]
        source: regex::Error,
    },
    #[error("multiline section {0:?} has no opening marker")]
    NoMarkers(MultilineField),
    #[error("empty {0} in document layout")]
    Empty(&'static str),
}

/// One non-empty segment of a document and its 1-based position among all segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block<'a> {
    pub index: usize,
    pub text: &'a str,
}

/// Split `text` on lines whose trimmed content equals `separator`.
///
/// Whitespace-only segments are dropped but still consume an index.
pub fn split_blocks<'a>(text: &'a str, separator: &str) -> Vec<Block<'a>> {
    let mut blocks = Vec::new();
    let mut index = 1;
    let mut start = 0;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if !separator.is_empty() && line.trim() == separator {
            push_block(&mut blocks, index, &text[start..line_start]);
            index += 1;
            start = offset;
        }
    }
    push_block(&mut blocks, index, &text[start..]);
    blocks
}

fn push_block<'a>(blocks: &mut Vec<Block<'a>>, index: usize, text: &'a str) {
    if !text.trim().is_empty() {
        blocks.push(Block { index, text });
    }
}

/// Numeric part of a `案件<n>：` title prefix; full-width digits are accepted.
pub fn listing_number(title: &str) -> Option<u32> {
    let caps = LISTING_NUMBER_RE.captures(title)?;
    let digits: String = caps[1]
        .chars()
        .map(|c| match c {
            '０'..='９' => char::from(b'0' + (c as u32 - '０' as u32) as u8),
            other => other,
        })
        .collect();
    digits.parse().ok()
}

enum ExtractFailure {
    MissingTitle,
    Unterminated { marker: String },
    Corrupt { detail: String },
}

#[derive(Debug, Clone)]
pub struct ListingParser {
    layout: DocumentLayout,
    scalar_patterns: Vec<(ScalarField, Regex)>,
}

impl ListingParser {
    pub fn new(layout: DocumentLayout) -> Result<Self, LayoutError> {
        if layout.separator.trim().is_empty() {
            return Err(LayoutError::Empty("separator"));
        }
        if layout.next_field_glyphs.is_empty() {
            return Err(LayoutError::Empty("next-field glyph set"));
        }
        for section in &layout.sections {
            if section.markers.iter().all(|m| m.is_empty()) {
                return Err(LayoutError::NoMarkers(section.field));
            }
        }

        let scalar_patterns = layout
            .scalar_labels
            .iter()
            .map(|l| {
                let pattern = format!(
                    r"(?m)^[ \t\u{{3000}}]*{}{}(.*)$",
                    regex::escape(&l.label),
                    LABEL_SEPARATOR
                );
                Regex::new(&pattern)
                    .map(|re| (l.field, re))
                    .map_err(|source| LayoutError::Pattern {
                        label: l.label.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            layout,
            scalar_patterns,
        })
    }

    pub fn layout(&self) -> &DocumentLayout {
        &self.layout
    }

    pub fn split<'a>(&self, text: &'a str) -> Vec<Block<'a>> {
        split_blocks(text, &self.layout.separator)
    }

    /// Parse a whole document. Every block is attempted; failures are collected.
    pub fn parse(&self, text: &str) -> ParseResult {
        let mut result = ParseResult::default();
        for block in self.split(text) {
            match self.parse_block(&block) {
                Ok(entry) => {
                    debug!(block_index = block.index, title = %entry.title, "parsed block");
                    result.entries.push(IndexedEntry {
                        block_index: block.index,
                        entry,
                    });
                }
                Err(err) => {
                    warn!(block_index = block.index, kind = err.kind(), "{err}");
                    result.errors.push(err);
                }
            }
        }
        info!(
            entries = result.entries.len(),
            errors = result.errors.len(),
            "parsed document"
        );
        result
    }

    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<ParseResult> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Ok(self.parse(text.trim_start_matches('\u{feff}')))
    }

    /// Extract one block. Panics raised during extraction surface as `CorruptBlock`.
    pub fn parse_block(&self, block: &Block<'_>) -> Result<ParsedEntry, ParseError> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.extract_fields(block.text)));
        let failure = match outcome {
            Ok(Ok(entry)) => return Ok(entry),
            Ok(Err(failure)) => failure,
            Err(payload) => ExtractFailure::Corrupt {
                detail: panic_detail(payload.as_ref()),
            },
        };

        let block_index = block.index;
        let snippet = snippet_of(block.text);
        Err(match failure {
            ExtractFailure::MissingTitle => ParseError::MissingTitle {
                block_index,
                snippet,
            },
            ExtractFailure::Unterminated { marker } => ParseError::UnterminatedMultilineField {
                block_index,
                marker,
                snippet,
            },
            ExtractFailure::Corrupt { detail } => ParseError::CorruptBlock {
                block_index,
                detail,
                snippet,
            },
        })
    }

    fn extract_fields(&self, text: &str) -> Result<ParsedEntry, ExtractFailure> {
        if text.contains('\0') {
            return Err(ExtractFailure::Corrupt {
                detail: "block contains a NUL character".to_string(),
            });
        }
        if text.contains('\u{fffd}') {
            return Err(ExtractFailure::Corrupt {
                detail: "block contains undecodable bytes (U+FFFD)".to_string(),
            });
        }

        let title = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or(ExtractFailure::MissingTitle)?;
        let mut entry = ParsedEntry::new(title);

        for (field, pattern) in &self.scalar_patterns {
            let slot = field.slot(&mut entry);
            if slot.is_none() {
                *slot = pattern
                    .captures(text)
                    .and_then(|caps| non_empty(caps.get(1).map_or("", |m| m.as_str())));
            }
        }

        // All-or-nothing: an unterminated section discards the whole block.
        for section in &self.layout.sections {
            let value = self.section_content(text, section)?;
            let slot = section.field.slot(&mut entry);
            if slot.is_none() {
                *slot = value;
            }
        }

        Ok(entry)
    }

    fn section_content(
        &self,
        text: &str,
        section: &MultilineSection,
    ) -> Result<Option<String>, ExtractFailure> {
        let Some((marker, start)) = section
            .markers
            .iter()
            .filter(|m| !m.is_empty())
            .find_map(|m| text.find(m.as_str()).map(|pos| (m, pos)))
        else {
            return Ok(None);
        };

        let rest = &text[start + marker.len()..];
        let body = match &section.closing {
            Some(closing) => match rest.find(closing.as_str()) {
                Some(end) => &rest[..end],
                None => {
                    return Err(ExtractFailure::Unterminated {
                        marker: marker.clone(),
                    })
                }
            },
            None => &rest[..self.next_field_offset(rest)],
        };
        Ok(non_empty(body))
    }

    fn next_field_offset(&self, rest: &str) -> usize {
        let glyphs = &self.layout.next_field_glyphs;
        let mut offset = 0;
        for (i, line) in rest.split_inclusive('\n').enumerate() {
            // The tail of the marker line belongs to the section.
            if i > 0 && line.starts_with(|c: char| glyphs.contains(&c)) {
                return offset;
            }
            offset += line.len();
        }
        rest.len()
    }
}

impl Default for ListingParser {
    fn default() -> Self {
        Self::new(DocumentLayout::default()).expect("default layout is valid")
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unexpected failure while extracting fields".to_string()
    }
}
