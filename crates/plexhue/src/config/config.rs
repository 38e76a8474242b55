use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use tracing_subscriber::filter::LevelFilter;

use super::diagnostics::Diagnostic;
use super::diagnostics::Diagnostics;
use super::diagnostics::Error;
use super::diagnostics::ParseError;
use super::diagnostics::SourceInfo;
use super::diagnostics::Warning;

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub server: ServerConfig,

    pub plex: PlexConfig,

    pub hue: HueConfig,

    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub lock: LockConfig,

    /// Light groups to control, keyed by a local name
    #[serde(default)]
    pub groups: BTreeMap<String, GroupConfig>,

    /// Per-light scene overrides, keyed by bridge light id
    #[serde(default)]
    pub lights: BTreeMap<String, toml::Spanned<String>>,

    /// Named scene presets
    #[serde(default)]
    pub scenes: BTreeMap<String, ScenePreset>,
}

#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Deserialize,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

fn default_log_max_size_kb() -> u64 {
    512
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `tower_http = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,

    /// Also write logs to this file
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// The log file is truncated at start-up once it reaches this size
    #[serde(default = "default_log_max_size_kb")]
    pub max_size_kb: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            overrides: HashMap::new(),
            file: None,
            max_size_kb: default_log_max_size_kb(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8565
}

/// Where the webhook endpoint listens
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlexConfig {
    /// Only webhooks from the player with this title are acted on
    pub player: String,

    /// Library section types (e.g. "artist") that never trigger a scene
    #[serde(default)]
    pub exclude_library_section_types: Vec<String>,
}

fn default_transition_time() -> u16 {
    60
}

fn default_throttle_ms() -> u64 {
    200
}

#[derive(Debug, Deserialize)]
pub struct HueConfig {
    /// Bridge API base including the key, e.g. `http://192.168.1.2/api/<key>/`
    pub api_url: String,

    /// Transition time in multiples of 100ms
    #[serde(default = "default_transition_time")]
    pub transition_time: u16,

    /// Delay after every light write
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// Captured brightness above this value is lowered to it; 0 disables the ceiling
    #[serde(default)]
    pub resume_max_brightness: Option<u8>,

    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("PlexHue.json")
}

#[derive(Debug, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_lock_path() -> PathBuf {
    PathBuf::from("PlexHue.LOCK")
}

fn default_stale_after_secs() -> u64 {
    10
}

/// Lock marker file guarding against overlapping runs from several processes
#[derive(Debug, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_lock_path")]
    pub path: PathBuf,

    /// A marker older than this is considered stale and ignored
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_lock_path(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GroupConfig {
    /// Bridge group id
    pub id: u32,

    /// Scene applied to the group's lights on play/resume
    pub scene: toml::Spanned<String>,
}

/// A named set of light attributes applied verbatim to a light.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScenePreset {
    pub on: bool,

    #[serde(default)]
    pub bri: Option<u8>,

    #[serde(default)]
    pub hue: Option<u16>,

    #[serde(default)]
    pub xy: Option<(f64, f64)>,

    /// Falls back to `hue.transition_time`
    #[serde(default)]
    pub transitiontime: Option<u16>,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns the config together with any warnings. Parse and validation
    /// errors are returned as [`ConfigError::Invalid`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<(Self, Diagnostics), ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        Self::parse(path, contents)
    }

    /// Parse configuration from TOML source. `file_path` is only used in diagnostics.
    pub fn parse(
        file_path: impl Into<PathBuf>,
        content: String,
    ) -> Result<(Self, Diagnostics), ConfigError> {
        let source = SourceInfo {
            file_path: file_path.into(),
            content,
        };

        let mut config: Config = match toml::from_str(&source.content) {
            Ok(c) => c,
            Err(e) => {
                let items = vec![Diagnostic::Error(Error::Parse(ParseError {
                    message: e.message().to_string(),
                    span: e.span(),
                }))];
                return Err(ConfigError::Invalid(Diagnostics { source, items }));
            }
        };

        if !config.hue.api_url.ends_with('/') {
            config.hue.api_url.push('/');
        }

        let diagnostics = Diagnostics {
            items: config.validate(),
            source,
        };

        if diagnostics.has_errors() {
            Err(ConfigError::Invalid(diagnostics))
        } else {
            Ok((config, diagnostics))
        }
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if self.plex.player.trim().is_empty() {
            diagnostics.push(Diagnostic::validation(
                "plex.player",
                "player must not be empty",
                None,
            ));
        }

        if !(self.hue.api_url.starts_with("http://") || self.hue.api_url.starts_with("https://"))
        {
            diagnostics.push(Diagnostic::validation(
                "hue.api_url",
                format!("'{}' is not an http(s) URL", self.hue.api_url),
                None,
            ));
        }

        let mut used = BTreeSet::new();

        for (name, group) in &self.groups {
            let scene = group.scene.get_ref();
            if self.scenes.contains_key(scene) {
                used.insert(scene.as_str());
            } else {
                diagnostics.push(Diagnostic::validation(
                    format!("groups.{}.scene", name),
                    format!("scene '{}' is not defined in [scenes]", scene),
                    Some(group.scene.span()),
                ));
            }
        }

        for (light_id, scene) in &self.lights {
            if self.scenes.contains_key(scene.get_ref()) {
                used.insert(scene.get_ref().as_str());
            } else {
                diagnostics.push(Diagnostic::validation(
                    format!("lights.{}", light_id),
                    format!("scene '{}' is not defined in [scenes]", scene.get_ref()),
                    Some(scene.span()),
                ));
            }
        }

        if self.groups.is_empty() {
            diagnostics.push(Diagnostic::Warning(Warning::NoGroups));
        }

        for name in self.scenes.keys() {
            if !used.contains(name.as_str()) {
                diagnostics.push(Diagnostic::Warning(Warning::UnusedScene {
                    name: name.clone(),
                }));
            }
        }

        diagnostics
    }

    /// Resolve the scene for a light: its own override, else its group's scene.
    pub fn scene_for(&self, group: &str, light_id: &str) -> Option<(&str, &ScenePreset)> {
        let name = match self.lights.get(light_id) {
            Some(name) => name.get_ref(),
            None => self.groups.get(group)?.scene.get_ref(),
        };

        self.scenes
            .get_key_value(name.as_str())
            .map(|(name, scene)| (name.as_str(), scene))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("{0}")]
    Invalid(Diagnostics),
}
