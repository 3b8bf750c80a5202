//! Completion markers. A marker's presence means its unit of work is done and must not run again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::TaskError;
use crate::utils::config::FileNames;

/// Stage plus unit, e.g. (`accelsearch_z0`, `obs_full_ck00_DM12.30`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerKey {
    pub stage: String,
    pub unit: String,
}

impl MarkerKey {
    pub fn new(stage: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            unit: unit.into(),
        }
    }
}

impl std::fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.stage, self.unit)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkerState {
    /// Never completed (or never tried).
    Absent,
    Done,
    /// Tried, ran cleanly, produced nothing.
    DoneEmpty,
}

/// Narrow interface over the marker namespace so scheduling can run against an in-memory fake.
/// Each key is written by exactly one worker, so implementations need no cross-key locking.
pub trait MarkerStore: Send + Sync {
    fn state(&self, key: &MarkerKey) -> MarkerState;

    fn exists(&self, key: &MarkerKey) -> bool {
        self.state(key) != MarkerState::Absent
    }

    /// Record success. `note` is kept with the marker (the command that ran).
    fn mark_done(&self, key: &MarkerKey, note: &str) -> Result<(), TaskError>;

    /// Record "ran, nothing produced".
    fn mark_empty(&self, key: &MarkerKey, note: &str) -> Result<(), TaskError>;
}

/// Markers as files: `<root>/<stage>/<unit>.ifok`, and `<unit>.empty` for the empty sentinel.
/// Deleting one file forces exactly that unit to run again.
#[derive(Clone, Debug)]
pub struct FsMarkerStore {
    root: PathBuf,
}

impl FsMarkerStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file(&self, key: &MarkerKey, ext: &str) -> PathBuf {
        let unit = key.unit.replace(['/', '\\'], "_");
        self.root.join(&key.stage).join(format!("{unit}.{ext}"))
    }

    pub fn done_path(&self, key: &MarkerKey) -> PathBuf {
        self.file(key, FileNames::MARKER_EXT)
    }

    pub fn empty_path(&self, key: &MarkerKey) -> PathBuf {
        self.file(key, FileNames::EMPTY_EXT)
    }

    fn write(&self, path: &Path, note: &str) -> Result<(), TaskError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
        }
        std::fs::write(path, format!("Command executed: {note}\n"))
            .map_err(|e| TaskError::io(path, e))
    }
}

impl MarkerStore for FsMarkerStore {
    fn state(&self, key: &MarkerKey) -> MarkerState {
        if self.done_path(key).is_file() {
            MarkerState::Done
        } else if self.empty_path(key).is_file() {
            MarkerState::DoneEmpty
        } else {
            MarkerState::Absent
        }
    }

    fn mark_done(&self, key: &MarkerKey, note: &str) -> Result<(), TaskError> {
        self.write(&self.done_path(key), note)
    }

    fn mark_empty(&self, key: &MarkerKey, note: &str) -> Result<(), TaskError> {
        self.write(&self.empty_path(key), note)
    }
}

/// In-memory markers for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    markers: Mutex<HashMap<MarkerKey, MarkerState>>,
}

impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-mark a key, as if an earlier run had completed it.
    pub fn insert(&self, key: MarkerKey, state: MarkerState) {
        self.markers.lock().unwrap().insert(key, state);
    }

    pub fn remove(&self, key: &MarkerKey) {
        self.markers.lock().unwrap().remove(key);
    }

    pub fn len(&self) -> usize {
        self.markers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MarkerStore for MemoryMarkerStore {
    fn state(&self, key: &MarkerKey) -> MarkerState {
        self.markers
            .lock()
            .unwrap()
            .get(key)
            .copied()
            .unwrap_or(MarkerState::Absent)
    }

    fn mark_done(&self, key: &MarkerKey, _note: &str) -> Result<(), TaskError> {
        self.insert(key.clone(), MarkerState::Done);
        Ok(())
    }

    fn mark_empty(&self, key: &MarkerKey, _note: &str) -> Result<(), TaskError> {
        self.insert(key.clone(), MarkerState::DoneEmpty);
        Ok(())
    }
}
