//! Narrative segment vocabulary shared by generation and fallback content.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Theme used for content that fits any world.
pub const GENERIC_THEME: &str = "generic";

/// The category of a narrative beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Scene,
    Dialogue,
    Action,
    Transition,
    InitialScene,
    Choice,
}

impl SegmentKind {
    /// All kinds, in declaration order.
    pub const ALL: [SegmentKind; 6] = [
        SegmentKind::Scene,
        SegmentKind::Dialogue,
        SegmentKind::Action,
        SegmentKind::Transition,
        SegmentKind::InitialScene,
        SegmentKind::Choice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::Scene => "scene",
            SegmentKind::Dialogue => "dialogue",
            SegmentKind::Action => "action",
            SegmentKind::Transition => "transition",
            SegmentKind::InitialScene => "initial_scene",
            SegmentKind::Choice => "choice",
        }
    }

    /// Whether a beat of this kind moves the story to a new scene.
    pub fn changes_scene(&self) -> bool {
        matches!(
            self,
            SegmentKind::Scene | SegmentKind::Transition | SegmentKind::InitialScene
        )
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SegmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        SegmentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown segment kind: {s}"))
    }
}

/// A choice offered to the player after a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// What the player sees.
    pub text: String,

    /// Hint about where the choice leads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

impl Choice {
    pub fn new(text: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            outcome: Some(outcome.into()),
        }
    }
}

/// Normalize a theme name: trimmed and lower-cased, empty becomes generic.
pub fn normalize_theme(theme: &str) -> String {
    let normalized = theme.trim().to_lowercase();
    if normalized.is_empty() {
        GENERIC_THEME.to_string()
    } else {
        normalized
    }
}

/// Normalize a collection of tags into a set of trimmed lower-case tags.
pub fn normalize_tags<I, T>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_kind_parse() {
        assert_eq!("scene".parse::<SegmentKind>(), Ok(SegmentKind::Scene));
        assert_eq!(
            "initial-scene".parse::<SegmentKind>(),
            Ok(SegmentKind::InitialScene)
        );
        assert_eq!(
            "Initial Scene".parse::<SegmentKind>(),
            Ok(SegmentKind::InitialScene)
        );
        assert!("montage".parse::<SegmentKind>().is_err());
    }

    #[test]
    fn test_segment_kind_serde() {
        let json = serde_json::to_string(&SegmentKind::InitialScene).unwrap();
        assert_eq!(json, "\"initial_scene\"");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_theme("  Fantasy "), "fantasy");
        assert_eq!(normalize_theme(""), GENERIC_THEME);

        let tags = normalize_tags(["Forest", " day", "", "forest"]);
        assert_eq!(tags.into_iter().collect::<Vec<_>>(), vec!["day", "forest"]);
    }
}
