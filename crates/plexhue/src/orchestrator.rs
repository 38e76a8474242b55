use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::config::Config;
use crate::event::PayloadError;
use crate::event::Phase;
use crate::event::PlaybackEvent;
use crate::event::Webhook;
use crate::gate::GateError;
use crate::gate::RunGate;
use crate::hue::Bridge;
use crate::lighting::Lighting;
use crate::lighting::PassReport;
use crate::state::RunState;
use crate::state::StateError;
use crate::state::StateStore;
use crate::transition::validate_transition;
use crate::transition::Rejection;

/// Why a webhook run ended without acting.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("PlexHue is disabled")]
    Disabled,

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("request has no 'payload' field")]
    MissingPayload,

    #[error("invalid webhook payload: {0}")]
    InvalidPayload(#[from] PayloadError),

    #[error("webhook event '{0}' is not handled")]
    UnknownEvent(String),

    #[error("player '{received}' doesn't match the configured player '{expected}'")]
    PlayerMismatch { received: String, expected: String },

    #[error("library section type '{0}' is excluded")]
    ExcludedSection(String),

    #[error(transparent)]
    Transition(#[from] Rejection),
}

/// Result of a webhook run that acted on the lights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub event: PlaybackEvent,
    pub pass: PassReport,
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let action = match self.event.phase() {
            Phase::Active => "scene applied",
            Phase::Inactive => "lights restored",
        };
        write!(f, "{}: {} ({})", self.event, action, self.pass)
    }
}

/// Response for status/enable/disable requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub enabled: bool,
    pub last_event: Option<PlaybackEvent>,
    pub captured_lights: usize,
    pub version: &'static str,
}

impl StatusResponse {
    fn from_state(state: &RunState) -> Self {
        Self {
            enabled: state.enabled,
            last_event: state.last_event,
            captured_lights: state.captured_count(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Handles webhooks and toggles against one configuration, bridge and state file.
pub struct Orchestrator {
    config: Arc<Config>,
    bridge: Arc<dyn Bridge>,
    store: StateStore,
    gate: RunGate,
}

impl Orchestrator {
    pub fn new(config: Arc<Config>, bridge: Arc<dyn Bridge>) -> Self {
        let store = StateStore::new(config.state.path.clone());
        let gate = RunGate::new(&config.lock);

        Self {
            config,
            bridge,
            store,
            gate,
        }
    }

    /// Process one webhook. `payload` is the raw `payload` form field.
    ///
    /// The run state is only written when the event was acted on.
    pub async fn handle_webhook(&self, payload: Option<&str>) -> Result<RunReport, RunError> {
        let result = self.run(payload).await;
        match &result {
            Ok(report) => info!("{}", report),
            Err(e) => warn!("Aborting: {}", e),
        }
        result
    }

    async fn run(&self, payload: Option<&str>) -> Result<RunReport, RunError> {
        let _guard = self.gate.try_acquire()?;

        let mut state = self.store.load()?;
        if !state.enabled {
            return Err(RunError::Disabled);
        }

        let webhook = Webhook::parse(payload.ok_or(RunError::MissingPayload)?)?;
        info!(
            "Received a webhook from player '{}' with event '{}'",
            webhook.player, webhook.event
        );

        let event = webhook
            .playback_event()
            .ok_or_else(|| RunError::UnknownEvent(webhook.event.clone()))?;

        if webhook.player != self.config.plex.player {
            return Err(RunError::PlayerMismatch {
                received: webhook.player,
                expected: self.config.plex.player.clone(),
            });
        }

        validate_transition(event, state.last_event)?;

        if let Some(section) = webhook.library_section_type {
            if self.config.plex.exclude_library_section_types.contains(&section) {
                return Err(RunError::ExcludedSection(section));
            }
        }

        let lighting = Lighting::new(&self.config, self.bridge.as_ref());
        let pass = match event.phase() {
            Phase::Active => lighting.capture_and_apply(&mut state.captured_lights).await,
            Phase::Inactive => lighting.restore(&mut state.captured_lights).await,
        };

        state.last_event = Some(event);
        self.store.save(&state)?;

        Ok(RunReport { event, pass })
    }

    pub async fn status(&self) -> Result<StatusResponse, RunError> {
        let _running = self.gate.exclusive().await;
        let state = self.store.load()?;
        Ok(StatusResponse::from_state(&state))
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<StatusResponse, RunError> {
        let _running = self.gate.exclusive().await;
        let status = self.store.update(|state| {
            state.enabled = enabled;
            StatusResponse::from_state(state)
        })?;

        info!("PlexHue has been {}", if enabled { "enabled" } else { "disabled" });
        Ok(status)
    }

    /// Create the state file if it doesn't exist yet.
    pub fn init_state(&self, force: bool) -> Result<StatusResponse, RunError> {
        let state = self.store.init(force)?;
        Ok(StatusResponse::from_state(&state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hue::LightState;
    use crate::hue::MockBridge;

    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        bridge: Arc<MockBridge>,
        orchestrator: Orchestrator,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let toml = format!(
            r#"
            [plex]
            player = "Living"
            exclude_library_section_types = ["artist"]

            [hue]
            api_url = "http://bridge/api/KEY/"
            throttle_ms = 0
            resume_max_brightness = 150

            [state]
            path = "{state}"

            [lock]
            path = "{lock}"

            [groups.living]
            id = 6
            scene = "movie"

            [scenes.movie]
            on = true
            bri = 45
            "#,
            state = dir.path().join("PlexHue.json").display(),
            lock = dir.path().join("PlexHue.LOCK").display(),
        );
        let (config, _) = Config::parse("plexhue.toml", toml).unwrap();

        let bright = LightState {
            on: true,
            bri: Some(200),
            hue: Some(1000),
            xy: Some((0.5, 0.4)),
        };
        let bridge = Arc::new(
            MockBridge::new().with_group(6, &[("1", bright), ("2", LightState::default())]),
        );

        let orchestrator = Orchestrator::new(Arc::new(config), bridge.clone());
        orchestrator.init_state(false).unwrap();

        Fixture {
            _dir: dir,
            bridge,
            orchestrator,
        }
    }

    fn payload(event: &str) -> String {
        serde_json::json!({
            "event": event,
            "Player": { "title": "Living" },
            "Metadata": { "librarySectionType": "movie" }
        })
        .to_string()
    }

    impl Fixture {
        async fn send(&self, event: &str) -> Result<RunReport, RunError> {
            self.orchestrator
                .handle_webhook(Some(&payload(event)))
                .await
        }

        fn state(&self) -> RunState {
            self.orchestrator.store.load().unwrap()
        }
    }

    #[tokio::test]
    async fn test_play_then_pause() {
        let f = fixture();

        let report = f.send("media.play").await.unwrap();
        assert_eq!(report.event, PlaybackEvent::Play);
        assert_eq!(report.pass.written, 2);

        let state = f.state();
        assert_eq!(state.last_event, Some(PlaybackEvent::Play));
        assert_eq!(state.captured_count(), 2);
        assert_eq!(state.captured_lights["living"]["1"].bri, Some(150));

        let report = f.send("media.pause").await.unwrap();
        assert_eq!(report.pass.written, 2);

        let state = f.state();
        assert_eq!(state.last_event, Some(PlaybackEvent::Pause));
        assert!(state.captured_lights.is_empty());

        let touched: Vec<String> = f.bridge.written().into_iter().map(|(id, _)| id).collect();
        assert_eq!(touched, ["1", "2", "1", "2"]);
        assert_eq!(f.bridge.state_of("1").bri, Some(150));
        assert!(!f.bridge.state_of("2").on);
    }

    #[tokio::test]
    async fn test_repeated_play_is_rejected_without_mutation() {
        let f = fixture();
        f.send("media.play").await.unwrap();
        let before = f.state();
        let writes = f.bridge.written().len();

        let err = f.send("media.play").await.unwrap_err();
        assert!(matches!(err, RunError::Transition(Rejection::Duplicate(_))));
        assert_eq!(f.state(), before);
        assert_eq!(f.bridge.written().len(), writes);
    }

    #[tokio::test]
    async fn test_stop_after_pause_is_rejected() {
        let f = fixture();
        f.send("media.play").await.unwrap();
        f.send("media.pause").await.unwrap();

        let err = f.send("media.stop").await.unwrap_err();
        assert!(matches!(err, RunError::Transition(Rejection::Redundant { .. })));
        assert_eq!(f.state().last_event, Some(PlaybackEvent::Pause));
    }

    #[tokio::test]
    async fn test_request_shape_failures() {
        let f = fixture();

        let err = f.orchestrator.handle_webhook(None).await.unwrap_err();
        assert!(matches!(err, RunError::MissingPayload));

        let err = f.orchestrator.handle_webhook(Some("{")).await.unwrap_err();
        assert!(matches!(err, RunError::InvalidPayload(_)));

        let err = f.send("media.scrobble").await.unwrap_err();
        assert!(matches!(err, RunError::UnknownEvent(ref e) if e == "media.scrobble"));

        let other_player = serde_json::json!({
            "event": "media.play",
            "Player": { "title": "Bedroom" }
        })
        .to_string();
        let err = f
            .orchestrator
            .handle_webhook(Some(&other_player))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "player 'Bedroom' doesn't match the configured player 'Living'"
        );

        let music = serde_json::json!({
            "event": "media.play",
            "Player": { "title": "Living" },
            "Metadata": { "librarySectionType": "artist" }
        })
        .to_string();
        let err = f.orchestrator.handle_webhook(Some(&music)).await.unwrap_err();
        assert!(matches!(err, RunError::ExcludedSection(_)));

        assert_eq!(f.state(), RunState::default());
        assert!(f.bridge.written().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_ignores_webhooks() {
        let f = fixture();

        let status = f.orchestrator.set_enabled(false).await.unwrap();
        assert!(!status.enabled);

        let err = f.send("media.play").await.unwrap_err();
        assert!(matches!(err, RunError::Disabled));
        assert!(f.bridge.written().is_empty());

        f.orchestrator.set_enabled(true).await.unwrap();
        f.send("media.play").await.unwrap();

        let status = f.orchestrator.status().await.unwrap();
        assert!(status.enabled);
        assert_eq!(status.last_event, Some(PlaybackEvent::Play));
        assert_eq!(status.captured_lights, 2);
    }

    #[tokio::test]
    async fn test_missing_state_file() {
        let f = fixture();
        std::fs::remove_file(&f.orchestrator.config.state.path).unwrap();

        let err = f.send("media.play").await.unwrap_err();
        assert!(matches!(err, RunError::State(StateError::Missing(_))));
        assert!(matches!(
            f.orchestrator.status().await,
            Err(RunError::State(StateError::Missing(_)))
        ));
    }

    #[tokio::test]
    async fn test_lock_marker_blocks_run() {
        let f = fixture();
        std::fs::write(&f.orchestrator.config.lock.path, b"").unwrap();

        let err = f.send("media.play").await.unwrap_err();
        assert!(matches!(err, RunError::Gate(GateError::Locked { .. })));
        assert_eq!(f.state(), RunState::default());
    }
}
