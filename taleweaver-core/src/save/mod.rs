//! Session autosave.
//!
//! The [`SaveCoordinator`] captures a snapshot through a
//! [`SnapshotProvider`] and hands it to a [`PersistenceSink`], periodically
//! and on demand, never running two cycles at once.

mod coordinator;
mod persist;
mod snapshot;
mod status;

pub use coordinator::{
    ActivityFlag, SaveConfig, SaveCoordinator, TriggerOutcome, DEFAULT_AUTOSAVE_INTERVAL,
};
pub use persist::{
    autosave_path, list_saves, load_save, manual_save_path, peek_save, JsonFileSink,
    SaveEnvelope, SaveInfo, SAVE_VERSION,
};
pub use snapshot::{
    provider_fn, FnProvider, GameStateSnapshot, NarrativeEntry, PersistenceSink, SaveError,
    SnapshotProvider,
};
pub use status::{SaveFailure, SaveState, SaveStatus, SaveTrigger};
