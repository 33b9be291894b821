//! Read-only views of worlds and characters used to seed opening scenes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What the generator needs to know about a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldView {
    pub id: String,
    pub name: String,

    /// Theme or genre, e.g. "fantasy".
    pub theme: String,

    pub description: String,

    #[serde(default)]
    pub tags: Vec<String>,
}

impl WorldView {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        theme: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            theme: theme.into(),
            description: description.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// What the generator needs to know about a character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterView {
    pub id: String,
    pub name: String,

    /// One-line sketch, e.g. "a wary half-elf ranger".
    pub summary: String,
}

impl CharacterView {
    pub fn new(id: impl Into<String>, name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            summary: summary.into(),
        }
    }
}

/// Lookup of worlds and characters by id.
pub trait WorldCatalog: Send + Sync {
    fn world(&self, id: &str) -> Option<WorldView>;
    fn character(&self, id: &str) -> Option<CharacterView>;
}

/// Catalog backed by hash maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    worlds: HashMap<String, WorldView>,
    characters: HashMap<String, CharacterView>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_world(mut self, world: WorldView) -> Self {
        self.worlds.insert(world.id.clone(), world);
        self
    }

    pub fn with_character(mut self, character: CharacterView) -> Self {
        self.characters.insert(character.id.clone(), character);
        self
    }
}

impl WorldCatalog for InMemoryCatalog {
    fn world(&self, id: &str) -> Option<WorldView> {
        self.worlds.get(id).cloned()
    }

    fn character(&self, id: &str) -> Option<CharacterView> {
        self.characters.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lookup() {
        let catalog = InMemoryCatalog::new()
            .with_world(
                WorldView::new("w1", "Duskhollow", "horror", "A drowned village")
                    .with_tags(["fog"]),
            )
            .with_character(CharacterView::new("c1", "Mara", "a lighthouse keeper"));

        let world = catalog.world("w1").unwrap();
        assert_eq!(world.name, "Duskhollow");
        assert_eq!(world.tags, vec!["fog".to_string()]);
        assert_eq!(catalog.character("c1").unwrap().name, "Mara");
        assert!(catalog.world("missing").is_none());
        assert!(catalog.character("w1").is_none());
    }
}
