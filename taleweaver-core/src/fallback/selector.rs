//! Context-aware selection of curated fallback content.

use super::library::{FallbackEntry, FallbackLibrary};
use crate::segment::{normalize_theme, SegmentKind, GENERIC_THEME};
use std::collections::{BTreeSet, VecDeque};
use tracing::debug;

/// Default number of recently served entries excluded from selection.
pub const DEFAULT_HISTORY_CAPACITY: usize = 6;

/// Selector settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorConfig {
    /// How many recently served entries to avoid.
    pub history_capacity: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl SelectorConfig {
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }
}

/// Bounded, most-recent-first record of served entry ids.
#[derive(Debug, Clone)]
pub struct UsageHistory {
    capacity: usize,
    ids: VecDeque<String>,
}

impl UsageHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ids: VecDeque::with_capacity(capacity),
        }
    }

    /// Record a served id; the oldest id drops off past capacity.
    pub fn record(&mut self, id: &str) {
        self.ids.retain(|existing| existing != id);
        self.ids.push_front(id.to_string());
        self.ids.truncate(self.capacity);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|existing| existing == id)
    }

    /// Position of `id`, 0 being the most recent.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|existing| existing == id)
    }

    /// Most recently served id.
    pub fn most_recent(&self) -> Option<&str> {
        self.ids.front().map(String::as_str)
    }

    /// Ids from most to least recent.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

/// Which rung of the degradation ladder produced a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTier {
    /// Fresh entry from the requested theme.
    Themed,
    /// Fresh entry from the generic bucket.
    Generic,
    /// Every candidate was recently used; the least recent one was reused.
    Recycled,
}

/// A selected entry and where it came from.
#[derive(Debug, Clone)]
pub struct Selection {
    pub entry: FallbackEntry,

    /// Normalized theme of the bucket the entry came from.
    pub theme: String,

    pub tier: SelectionTier,
}

/// Picks curated content for a theme, segment kind, and tag context.
#[derive(Debug, Clone)]
pub struct FallbackContentSelector {
    library: FallbackLibrary,
    history: UsageHistory,
}

impl FallbackContentSelector {
    pub fn new(library: FallbackLibrary) -> Self {
        Self::with_config(library, SelectorConfig::default())
    }

    pub fn with_config(library: FallbackLibrary, config: SelectorConfig) -> Self {
        Self {
            library,
            history: UsageHistory::new(config.history_capacity),
        }
    }

    /// Select an entry, recording it in the usage history.
    ///
    /// Tries fresh themed content, then fresh generic content, then the
    /// least recently used entry of those buckets. `None` means no content
    /// exists for this kind at all.
    pub fn select(
        &mut self,
        theme: &str,
        kind: SegmentKind,
        tags: &BTreeSet<String>,
    ) -> Option<Selection> {
        let theme = normalize_theme(theme);
        let mut themes = vec![theme.as_str()];
        if theme != GENERIC_THEME {
            themes.push(GENERIC_THEME);
        }

        let fresh = themes.iter().find_map(|t| {
            self.best_fresh(self.library.bucket(t, kind), tags)
                .map(|entry| (*t, entry))
        });

        let (bucket_theme, entry, tier) = match fresh {
            Some((t, entry)) => {
                let tier = if t == theme {
                    SelectionTier::Themed
                } else {
                    SelectionTier::Generic
                };
                (t, entry, tier)
            }
            None => {
                let (t, entry) = themes.iter().find_map(|t| {
                    self.least_recent(self.library.bucket(t, kind))
                        .map(|entry| (*t, entry))
                })?;
                (t, entry, SelectionTier::Recycled)
            }
        };

        let selection = Selection {
            entry: entry.clone(),
            theme: bucket_theme.to_string(),
            tier,
        };

        debug!(
            id = %selection.entry.id,
            theme = %selection.theme,
            %kind,
            tier = ?tier,
            "selected fallback content"
        );
        self.history.record(&selection.entry.id);
        Some(selection)
    }

    /// Whether any content exists for `theme`.
    pub fn has_content(&self, theme: &str) -> bool {
        self.library.has_theme(theme)
    }

    /// Number of entries in the `(theme, kind)` bucket.
    pub fn content_count(&self, theme: &str, kind: SegmentKind) -> usize {
        self.library.bucket(theme, kind).len()
    }

    /// Forget which entries were served, e.g. when a new session starts.
    pub fn clear_usage_history(&mut self) {
        self.history.clear();
    }

    pub fn usage_history(&self) -> &UsageHistory {
        &self.history
    }

    /// Recently served entry ids, most recent first.
    pub fn recent_ids(&self) -> Vec<String> {
        self.history.iter().map(str::to_string).collect()
    }

    pub fn library(&self) -> &FallbackLibrary {
        &self.library
    }

    /// Highest tag overlap among entries not recently used; ties go to the
    /// earliest entry.
    fn best_fresh<'a>(
        &self,
        bucket: &'a [FallbackEntry],
        tags: &BTreeSet<String>,
    ) -> Option<&'a FallbackEntry> {
        let mut best: Option<(&FallbackEntry, usize)> = None;
        for entry in bucket.iter().filter(|e| !self.history.contains(&e.id)) {
            let overlap = entry.overlap(tags);
            if best.map_or(true, |(_, top)| overlap > top) {
                best = Some((entry, overlap));
            }
        }
        best.map(|(entry, _)| entry)
    }

    /// Oldest entry in the history, never the one served last unless it is
    /// the bucket's only entry.
    fn least_recent<'a>(&self, bucket: &'a [FallbackEntry]) -> Option<&'a FallbackEntry> {
        if bucket.len() == 1 {
            return bucket.first();
        }
        let last = self.history.most_recent();
        bucket
            .iter()
            .filter(|e| Some(e.id.as_str()) != last)
            .max_by_key(|e| self.history.position(&e.id).unwrap_or(usize::MAX))
    }
}
