//! Word profiles, their binary encoding and persistence

pub mod codec;
pub mod prefs;
pub mod store;
pub mod word;

pub use prefs::{
    load_profiles_prefs, save_profiles_prefs, FilePreferences, MemoryPreferences,
    PreferenceStore,
};
pub use store::{ProfileSet, NOISE_LABEL};
pub use word::{Score, ScoreHistory, WordProfile};
