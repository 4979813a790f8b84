//! Key/value preference storage for profiles.
//!
//! A set saved under `key` stores the profile count at `key` and each
//! base64-encoded record at `{key}_{i}`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dsp::spectrum::SpectrumExtractor;
use crate::error::ProfileError;
use crate::profile::codec;
use crate::profile::store::ProfileSet;

/// Minimal typed key/value store
pub trait PreferenceStore {
    fn has_key(&self, key: &str) -> bool;
    fn get_int(&self, key: &str) -> Option<i32>;
    fn set_int(&mut self, key: &str, value: i32);
    fn get_string(&self, key: &str) -> Option<String>;
    fn set_string(&mut self, key: &str, value: String);
}

/// A stored preference value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    Int(i32),
    Text(String),
}

/// In-memory preference store
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferences {
    values: BTreeMap<String, PrefValue>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn has_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn get_int(&self, key: &str) -> Option<i32> {
        match self.values.get(key) {
            Some(PrefValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    fn set_int(&mut self, key: &str, value: i32) {
        self.values.insert(key.to_string(), PrefValue::Int(value));
    }

    fn get_string(&self, key: &str) -> Option<String> {
        match self.values.get(key) {
            Some(PrefValue::Text(value)) => Some(value.clone()),
            _ => None,
        }
    }

    fn set_string(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), PrefValue::Text(value));
    }
}

/// Preference store persisted as a flat TOML table
#[derive(Debug, Clone)]
pub struct FilePreferences {
    path: PathBuf,
    inner: MemoryPreferences,
}

impl FilePreferences {
    /// Open a preference file. A missing file starts out empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content).map_err(|e| ProfileError::Encoding(e.to_string()))?
        } else {
            debug!("Preference file {} not found, starting empty", path.display());
            BTreeMap::new()
        };

        Ok(Self {
            path,
            inner: MemoryPreferences { values },
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write all values back to the file
    pub fn save(&self) -> Result<(), ProfileError> {
        let content =
            toml::to_string(&self.inner.values).map_err(|e| ProfileError::Encoding(e.to_string()))?;
        std::fs::write(&self.path, content)?;
        debug!("Saved {} preferences to {}", self.inner.len(), self.path.display());
        Ok(())
    }
}

impl PreferenceStore for FilePreferences {
    fn has_key(&self, key: &str) -> bool {
        self.inner.has_key(key)
    }

    fn get_int(&self, key: &str) -> Option<i32> {
        self.inner.get_int(key)
    }

    fn set_int(&mut self, key: &str, value: i32) {
        self.inner.set_int(key, value)
    }

    fn get_string(&self, key: &str) -> Option<String> {
        self.inner.get_string(key)
    }

    fn set_string(&mut self, key: &str, value: String) {
        self.inner.set_string(key, value)
    }
}

fn record_key(key: &str, index: usize) -> String {
    format!("{}_{}", key, index)
}

/// Store every profile of `set` under `key`
pub fn save_profiles_prefs<S: PreferenceStore + ?Sized>(
    store: &mut S,
    key: &str,
    set: &ProfileSet,
) -> Result<(), ProfileError> {
    let count = i32::try_from(set.len()).map_err(|_| ProfileError::InvalidLength {
        what: "profile count",
        value: set.len() as i64,
    })?;
    store.set_int(key, count);

    for (index, profile) in set.iter().enumerate() {
        let bytes = codec::encode_profile(profile)?;
        store.set_string(&record_key(key, index), STANDARD.encode(bytes));
    }

    info!("Saved {} profiles under preference key '{}'", set.len(), key);
    Ok(())
}

/// Read the profile set stored under `key`.
///
/// Records missing from the store are skipped.
pub fn load_profiles_prefs<S: PreferenceStore + ?Sized>(
    store: &S,
    key: &str,
    extractor: &mut SpectrumExtractor,
) -> Result<ProfileSet, ProfileError> {
    if !store.has_key(key) {
        return Err(ProfileError::MissingKey(key.to_string()));
    }
    let count = store
        .get_int(key)
        .ok_or_else(|| ProfileError::Encoding(format!("'{}' is not a profile count", key)))?;
    if count < 0 {
        return Err(ProfileError::InvalidLength {
            what: "profile count",
            value: count as i64,
        });
    }

    let mut set = ProfileSet::new();
    for index in 0..count as usize {
        let record = record_key(key, index);
        let Some(encoded) = store.get_string(&record) else {
            warn!("Preference key '{}' missing, skipping profile", record);
            continue;
        };
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| ProfileError::Encoding(e.to_string()))?;
        set.push(codec::decode_profile(&bytes, extractor)?);
    }

    info!("Loaded {} profiles from preference key '{}'", set.len(), key);
    Ok(set)
}
