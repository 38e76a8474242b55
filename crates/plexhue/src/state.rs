//! Persisted run state.
//!
//! The state file is the only mutable data plexhue owns. It records whether
//! the integration is enabled, the last event that was acted on, and the
//! light states captured when playback started so they can be restored when
//! it stops.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use tracing::debug;

use crate::event::PlaybackEvent;

pub const STATE_VERSION: u32 = 1;

/// Captured light states: group name -> light id -> snapshot.
pub type CapturedLights = BTreeMap<String, BTreeMap<String, LightSnapshot>>;

/// State of a single light as it was before a scene was applied.
///
/// Lights that were off only record `on = false`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LightSnapshot {
    pub on: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hue: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xy: Option<(f64, f64)>,
}

impl LightSnapshot {
    pub fn off() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default, alias = "LastEvent")]
    pub last_event: Option<PlaybackEvent>,

    #[serde(default, alias = "LightStates", deserialize_with = "null_as_empty")]
    pub captured_lights: CapturedLights,
}

fn default_version() -> u32 {
    STATE_VERSION
}

fn default_enabled() -> bool {
    true
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<CapturedLights, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<CapturedLights>::deserialize(deserializer)?.unwrap_or_default())
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            enabled: true,
            last_event: None,
            captured_lights: CapturedLights::new(),
        }
    }
}

impl RunState {
    /// Number of captured lights across all groups.
    pub fn captured_count(&self) -> usize {
        self.captured_lights.values().map(BTreeMap::len).sum()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state file '{0}' doesn't exist (create it with `plexhue init-state`)")]
    Missing(PathBuf),

    #[error("state file '{0}' already exists")]
    AlreadyExists(PathBuf),

    #[error("failed to access state file '{0}': {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("state file '{0}' is not valid: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error("state file '{path}' has version {found}, expected at most {STATE_VERSION}")]
    UnsupportedVersion { path: PathBuf, found: u32 },
}

/// Reads and writes [`RunState`] on disk.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<RunState, StateError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::Missing(self.path.clone()));
            }
            Err(e) => return Err(StateError::Io(self.path.clone(), e)),
        };

        let state: RunState = serde_json::from_str(&contents)
            .map_err(|e| StateError::Parse(self.path.clone(), e))?;

        if state.version > STATE_VERSION {
            return Err(StateError::UnsupportedVersion {
                path: self.path.clone(),
                found: state.version,
            });
        }

        Ok(state)
    }

    /// Atomically replace the state file.
    ///
    /// The new contents are written to a temporary file in the same
    /// directory and renamed over the old file.
    pub fn save(&self, state: &RunState) -> Result<(), StateError> {
        let io_err = |e| StateError::Io(self.path.clone(), e);

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::Parse(self.path.clone(), e))?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.write_all(b"\n").map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        debug!("Saved run state to {}", self.path.display());
        Ok(())
    }

    /// Create a fresh state file. Fails if one exists unless `force` is set.
    pub fn init(&self, force: bool) -> Result<RunState, StateError> {
        if !force && self.path.exists() {
            return Err(StateError::AlreadyExists(self.path.clone()));
        }

        let state = RunState::default();
        self.save(&state)?;
        Ok(state)
    }

    /// Load, modify and save the state as one operation.
    pub fn update<T>(&self, f: impl FnOnce(&mut RunState) -> T) -> Result<T, StateError> {
        let mut state = self.load()?;
        let result = f(&mut state);
        self.save(&state)?;
        Ok(result)
    }
}
