//! Curated fallback content, bucketed by theme and segment kind.
//!
//! The library is assembled at configuration time (builder, JSON, or the
//! built-in catalog) and is read-only afterwards.

use crate::segment::{normalize_tags, normalize_theme, Choice, SegmentKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

/// Errors from assembling a fallback library.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Duplicate fallback entry id: {0}")]
    DuplicateId(String),

    #[error("Fallback entry {0} has an empty body")]
    EmptyBody(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single piece of curated content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackEntry {
    /// Library-wide unique identifier.
    pub id: String,

    /// The narrative text.
    pub body: String,

    /// Normalized tags describing the content.
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Choices written for this entry, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Choice>,
}

impl FallbackEntry {
    /// Create an entry; tags are normalized.
    pub fn new<I, T>(id: impl Into<String>, body: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            id: id.into(),
            body: body.into(),
            tags: normalize_tags(tags),
            choices: Vec::new(),
        }
    }

    /// Attach curated choices.
    pub fn with_choices(mut self, choices: Vec<Choice>) -> Self {
        self.choices = choices;
        self
    }

    /// Number of tags shared with `tags`.
    pub fn overlap(&self, tags: &BTreeSet<String>) -> usize {
        self.tags.intersection(tags).count()
    }
}

/// On-disk shape of one library entry.
#[derive(Debug, Deserialize, Serialize)]
struct LibraryRecord {
    theme: String,
    kind: SegmentKind,
    #[serde(flatten)]
    entry: FallbackEntry,
}

#[derive(Debug, Deserialize, Serialize)]
struct LibraryFile {
    entries: Vec<LibraryRecord>,
}

/// Curated content keyed by `(theme, segment kind)`.
///
/// Entries keep insertion order inside a bucket; selection relies on that
/// order to break ties deterministically.
#[derive(Debug, Clone, Default)]
pub struct FallbackLibrary {
    buckets: HashMap<(String, SegmentKind), Vec<FallbackEntry>>,
    ids: HashSet<String>,
}

impl FallbackLibrary {
    /// Create an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry to the `(theme, kind)` bucket.
    pub fn add_entry(
        &mut self,
        theme: &str,
        kind: SegmentKind,
        mut entry: FallbackEntry,
    ) -> Result<(), LibraryError> {
        if entry.body.trim().is_empty() {
            return Err(LibraryError::EmptyBody(entry.id));
        }
        if !self.ids.insert(entry.id.clone()) {
            return Err(LibraryError::DuplicateId(entry.id));
        }
        entry.tags = normalize_tags(&entry.tags);
        self.buckets
            .entry((normalize_theme(theme), kind))
            .or_default()
            .push(entry);
        Ok(())
    }

    /// Builder form of [`add_entry`](Self::add_entry).
    pub fn with_entry(
        mut self,
        theme: &str,
        kind: SegmentKind,
        entry: FallbackEntry,
    ) -> Result<Self, LibraryError> {
        self.add_entry(theme, kind, entry)?;
        Ok(self)
    }

    /// Load a library from JSON of the form
    /// `{"entries": [{"theme": "fantasy", "kind": "scene", "id": "...", "body": "...", "tags": [...]}]}`.
    pub fn from_json(json: &str) -> Result<Self, LibraryError> {
        let file: LibraryFile = serde_json::from_str(json)?;
        let mut library = Self::new();
        for record in file.entries {
            library.add_entry(&record.theme, record.kind, record.entry)?;
        }
        Ok(library)
    }

    /// Serialize the library back to the JSON format read by [`from_json`](Self::from_json).
    pub fn to_json(&self) -> Result<String, LibraryError> {
        let mut keys: Vec<_> = self.buckets.keys().collect();
        keys.sort();

        let entries = keys
            .into_iter()
            .flat_map(|key| {
                self.buckets[key].iter().map(move |entry| LibraryRecord {
                    theme: key.0.clone(),
                    kind: key.1,
                    entry: entry.clone(),
                })
            })
            .collect();

        Ok(serde_json::to_string_pretty(&LibraryFile { entries })?)
    }

    /// Entries of one bucket, in insertion order.
    pub fn bucket(&self, theme: &str, kind: SegmentKind) -> &[FallbackEntry] {
        self.buckets
            .get(&(normalize_theme(theme), kind))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether any bucket of `theme` has content.
    pub fn has_theme(&self, theme: &str) -> bool {
        let theme = normalize_theme(theme);
        self.buckets
            .iter()
            .any(|((t, _), entries)| *t == theme && !entries.is_empty())
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Themes with at least one entry, sorted.
    pub fn themes(&self) -> Vec<String> {
        let themes: BTreeSet<_> = self.buckets.keys().map(|(t, _)| t.clone()).collect();
        themes.into_iter().collect()
    }
}
