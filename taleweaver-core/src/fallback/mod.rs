//! Curated fallback content.
//!
//! Used when the external generator cannot deliver. Content lives in a
//! [`FallbackLibrary`]; the [`FallbackContentSelector`] picks entries that
//! match the story context without repeating itself.

mod builtin;
pub mod choices;
mod library;
mod selector;

pub use builtin::builtin_library;
pub use choices::{choices_for_entry, generic_choices};
pub use library::{FallbackEntry, FallbackLibrary, LibraryError};
pub use selector::{
    FallbackContentSelector, Selection, SelectionTier, SelectorConfig, UsageHistory,
    DEFAULT_HISTORY_CAPACITY,
};

impl FallbackLibrary {
    /// The curated library shipped with the crate.
    pub fn builtin() -> Result<Self, LibraryError> {
        builtin_library()
    }
}
