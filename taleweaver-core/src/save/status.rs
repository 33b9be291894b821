//! Observable state of the save coordinator.

use crate::classify::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What caused a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveTrigger {
    /// The autosave timer fired.
    Periodic,
    /// The scene changed.
    SceneChange,
    /// The player made a choice.
    PlayerChoice,
    /// Explicit request (save button, retry, session end).
    Manual,
}

impl SaveTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveTrigger::Periodic => "periodic",
            SaveTrigger::SceneChange => "scene_change",
            SaveTrigger::PlayerChoice => "player_choice",
            SaveTrigger::Manual => "manual",
        }
    }
}

impl fmt::Display for SaveTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse save state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveState {
    /// Nothing saved yet and nothing in flight.
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

/// Details of the most recent failed save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveFailure {
    pub message: String,
    pub kind: ErrorKind,
    pub retryable: bool,
}

/// Snapshot of the coordinator's status.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SaveStatus {
    pub state: SaveState,

    /// When the last successful save completed.
    pub last_save_time: Option<DateTime<Utc>>,

    /// Successful saves so far.
    pub total_saves: u64,

    /// Set only while `state` is [`SaveState::Error`].
    pub error: Option<SaveFailure>,

    /// Trigger of the cycle in flight, or of the last cycle.
    pub current_trigger: Option<SaveTrigger>,

    /// Triggers absorbed into the current cycle.
    pub coalesced: Vec<SaveTrigger>,
}

impl SaveStatus {
    pub fn is_saving(&self) -> bool {
        self.state == SaveState::Saving
    }

    pub fn is_error(&self) -> bool {
        self.state == SaveState::Error
    }

    /// Whether the last failure may succeed on retry.
    pub fn can_retry(&self) -> bool {
        self.error.as_ref().is_some_and(|e| e.retryable)
    }
}
