//! Snapshot capture and persistence seams.

use super::status::SaveTrigger;
use crate::segment::{Choice, SegmentKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::marker::PhantomData;
use thiserror::Error;

/// Errors from capturing or persisting a snapshot.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("Snapshot capture failed: {0}")]
    Capture(String),

    #[error("Persistence failed: {0}")]
    Persist(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Retry is only possible after a failed save")]
    NotInErrorState,
}

/// Produces the state to save. Called once per save cycle.
#[async_trait]
pub trait SnapshotProvider<S>: Send + Sync {
    async fn capture(&self) -> Result<S, SaveError>;
}

/// Durably stores a snapshot.
#[async_trait]
pub trait PersistenceSink<S>: Send + Sync {
    async fn persist(&self, snapshot: &S, trigger: SaveTrigger) -> Result<(), SaveError>;
}

/// [`SnapshotProvider`] built from an async closure. See [`provider_fn`].
pub struct FnProvider<F, S> {
    f: F,
    _snapshot: PhantomData<fn() -> S>,
}

/// Wrap an async closure as a [`SnapshotProvider`].
pub fn provider_fn<F, Fut, S>(f: F) -> FnProvider<F, S>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<S, SaveError>> + Send,
{
    FnProvider {
        f,
        _snapshot: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, S> SnapshotProvider<S> for FnProvider<F, S>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<S, SaveError>> + Send,
    S: Send,
{
    async fn capture(&self) -> Result<S, SaveError> {
        (self.f)().await
    }
}

/// One delivered segment of a session's story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeEntry {
    pub kind: SegmentKind,
    pub content: String,
    pub is_ai_generated: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Saved state of a story session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStateSnapshot {
    pub session_id: String,
    pub world_id: Option<String>,
    pub character_ids: Vec<String>,
    pub theme: String,
    pub narrative: Vec<NarrativeEntry>,

    /// Choices the player made, in order.
    pub choices_made: Vec<Choice>,

    pub captured_at: DateTime<Utc>,
}

impl GameStateSnapshot {
    pub fn new(session_id: impl Into<String>, theme: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            world_id: None,
            character_ids: Vec::new(),
            theme: theme.into(),
            narrative: Vec::new(),
            choices_made: Vec::new(),
            captured_at: Utc::now(),
        }
    }
}
