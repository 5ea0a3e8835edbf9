//! Selection State and its client-side persistence
//!
//! Mutated only through the constraint resolver. Persisted as a JSON object
//! keyed by option-set id under a key namespaced by model id.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::{ModelId, OptionId, OptionSetId};

/// Option set -> ordered, duplicate-free list of selected options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SelectionState {
    sets: BTreeMap<OptionSetId, Vec<OptionId>>,
}

/// Stored entries are lists, older clients wrote a bare id
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Many(Vec<OptionId>),
    One(OptionId),
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.values().all(Vec::is_empty)
    }

    pub fn selected_in(&self, set: OptionSetId) -> &[OptionId] {
        self.sets.get(&set).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_selected(&self, option: OptionId) -> bool {
        self.sets.values().any(|ids| ids.contains(&option))
    }

    /// Every selected option, in option-set id order
    pub fn all_selected(&self) -> impl Iterator<Item = OptionId> + '_ {
        self.sets.values().flatten().copied()
    }

    pub fn sets(&self) -> impl Iterator<Item = (OptionSetId, &[OptionId])> + '_ {
        self.sets.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Replace the set's selection with a single option
    pub fn replace(&mut self, set: OptionSetId, option: OptionId) {
        self.sets.insert(set, vec![option]);
    }

    /// Append an option to the set's selection, ignoring duplicates
    pub fn append(&mut self, set: OptionSetId, option: OptionId) {
        let ids = self.sets.entry(set).or_default();
        if !ids.contains(&option) {
            ids.push(option);
        }
    }

    pub fn remove(&mut self, set: OptionSetId, option: OptionId) -> bool {
        match self.sets.get_mut(&set) {
            Some(ids) => {
                let before = ids.len();
                ids.retain(|id| *id != option);
                ids.len() != before
            }
            None => false,
        }
    }

    /// Empty a set while keeping its entry
    pub fn clear_set(&mut self, set: OptionSetId) {
        if let Some(ids) = self.sets.get_mut(&set) {
            ids.clear();
        }
    }

    /// Drop a set entry entirely
    pub fn discard_set(&mut self, set: OptionSetId) -> Vec<OptionId> {
        self.sets.remove(&set).unwrap_or_default()
    }

    /// Keep only the options `keep` accepts; returns how many were dropped
    pub fn retain(&mut self, mut keep: impl FnMut(OptionSetId, OptionId) -> bool) -> usize {
        let mut dropped = 0;
        for (set, ids) in self.sets.iter_mut() {
            let before = ids.len();
            ids.retain(|id| keep(*set, *id));
            dropped += before - ids.len();
        }
        dropped
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse persisted state; malformed input yields an empty selection
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str::<BTreeMap<OptionSetId, StoredEntry>>(raw) {
            Ok(stored) => {
                let sets = stored
                    .into_iter()
                    .map(|(set, entry)| {
                        let ids = match entry {
                            StoredEntry::Many(ids) => ids,
                            StoredEntry::One(id) => vec![id],
                        };
                        let mut unique = Vec::with_capacity(ids.len());
                        for id in ids {
                            if !unique.contains(&id) {
                                unique.push(id);
                            }
                        }
                        (set, unique)
                    })
                    .collect();
                Self { sets }
            }
            Err(e) => {
                warn!(error = %e, "discarding malformed persisted selection");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Selection store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Selection serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Client-side key/value persistence
pub trait SelectionStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn save(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

pub fn storage_key(model: ModelId) -> String {
    format!("selections_{model}")
}

/// Load the persisted selection for a model; any failure yields empty
pub fn restore(store: &dyn SelectionStore, model: ModelId) -> SelectionState {
    let key = storage_key(model);
    match store.load(&key) {
        Ok(Some(raw)) => SelectionState::from_json(&raw),
        Ok(None) => SelectionState::default(),
        Err(e) => {
            warn!(key = %key, error = %e, "failed to read persisted selection");
            SelectionState::default()
        }
    }
}

pub fn persist(
    store: &dyn SelectionStore,
    model: ModelId,
    state: &SelectionState,
) -> Result<(), StoreError> {
    let key = storage_key(model);
    store.save(&key, &state.to_json()?)?;
    debug!(key = %key, "selection persisted");
    Ok(())
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SelectionStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path(key), value)?;
        Ok(())
    }
}
