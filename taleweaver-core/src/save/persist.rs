//! JSON save files.
//!
//! Each save is a versioned envelope around the snapshot. Writes go to a
//! sibling temp file that is then renamed over the target, so a crash
//! mid-write leaves the previous save intact.

use super::snapshot::{PersistenceSink, SaveError};
use super::status::SaveTrigger;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Current save file version.
pub const SAVE_VERSION: u32 = 1;

/// A save file as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveEnvelope<S> {
    /// Save format version for compatibility checking.
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub reason: SaveTrigger,
    pub snapshot: S,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, S> {
    version: u32,
    saved_at: DateTime<Utc>,
    reason: SaveTrigger,
    snapshot: &'a S,
}

/// Header of a save file, readable without the snapshot's type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SaveInfo {
    #[serde(skip)]
    pub path: PathBuf,
    pub saved_at: DateTime<Utc>,
    pub reason: SaveTrigger,
}

/// [`PersistenceSink`] writing one JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and version-check the save file.
    pub async fn load<S: DeserializeOwned>(&self) -> Result<SaveEnvelope<S>, SaveError> {
        load_save(&self.path).await
    }

    /// Read the save header without deserializing the snapshot.
    pub async fn peek(&self) -> Result<SaveInfo, SaveError> {
        peek_save(&self.path).await
    }
}

#[async_trait]
impl<S> PersistenceSink<S> for JsonFileSink
where
    S: Serialize + Send + Sync,
{
    async fn persist(&self, snapshot: &S, trigger: SaveTrigger) -> Result<(), SaveError> {
        let envelope = EnvelopeRef {
            version: SAVE_VERSION,
            saved_at: Utc::now(),
            reason: trigger,
            snapshot,
        };
        let content = serde_json::to_string_pretty(&envelope)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), %trigger, "save written");
        Ok(())
    }
}

/// Load a save file written by [`JsonFileSink`].
pub async fn load_save<S: DeserializeOwned>(
    path: impl AsRef<Path>,
) -> Result<SaveEnvelope<S>, SaveError> {
    let content = fs::read_to_string(path).await?;
    let saved: SaveEnvelope<S> = serde_json::from_str(&content)?;
    check_version(saved.version)?;
    Ok(saved)
}

/// Read a save file's header.
pub async fn peek_save(path: impl AsRef<Path>) -> Result<SaveInfo, SaveError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).await?;

    #[derive(Deserialize)]
    struct Partial {
        version: u32,
        #[serde(flatten)]
        info: SaveInfo,
    }

    let partial: Partial = serde_json::from_str(&content)?;
    check_version(partial.version)?;
    Ok(SaveInfo {
        path: path.to_path_buf(),
        ..partial.info
    })
}

/// Readable save files in `dir`, most recent first.
pub async fn list_saves(dir: impl AsRef<Path>) -> Result<Vec<SaveInfo>, SaveError> {
    let mut saves = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "json") {
            if let Ok(info) = peek_save(&path).await {
                saves.push(info);
            }
        }
    }

    saves.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
    Ok(saves)
}

fn check_version(found: u32) -> Result<(), SaveError> {
    if found != SAVE_VERSION {
        return Err(SaveError::VersionMismatch {
            expected: SAVE_VERSION,
            found,
        });
    }
    Ok(())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Autosave file for a session; each autosave overwrites the last.
pub fn autosave_path(base_dir: impl AsRef<Path>, session_name: &str) -> PathBuf {
    base_dir
        .as_ref()
        .join(format!("{}_autosave.json", sanitize(session_name)))
}

/// Timestamped manual save file for a session.
pub fn manual_save_path(base_dir: impl AsRef<Path>, session_name: &str) -> PathBuf {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    base_dir
        .as_ref()
        .join(format!("{}_{timestamp}.json", sanitize(session_name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_paths_are_sanitized() {
        let auto = autosave_path("/saves", "The Lost Mine: Part 1");
        assert_eq!(
            auto,
            PathBuf::from("/saves/The_Lost_Mine__Part_1_autosave.json")
        );

        let manual = manual_save_path("/saves", "a/b");
        let name = manual.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("a_b_"));
        assert!(name.ends_with(".json"));
    }

    #[test]
    fn test_version_check() {
        assert!(check_version(SAVE_VERSION).is_ok());
        assert!(matches!(
            check_version(99),
            Err(SaveError::VersionMismatch { expected: 1, found: 99 })
        ));
    }
}
