//! Playback events and the Plex webhook payload.
//!
//! Plex posts a JSON document for every player event. Only the four
//! transport events below drive the lights; everything else (scrobble,
//! rate, library.new, ...) is rejected before any state is touched.

use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::EnumString;

/// A playback event that plexhue acts on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum PlaybackEvent {
    #[serde(rename = "media.play")]
    #[strum(serialize = "media.play")]
    Play,
    #[serde(rename = "media.resume")]
    #[strum(serialize = "media.resume")]
    Resume,
    #[serde(rename = "media.pause")]
    #[strum(serialize = "media.pause")]
    Pause,
    #[serde(rename = "media.stop")]
    #[strum(serialize = "media.stop")]
    Stop,
}

/// Logical super-state an event moves the player into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    /// Media is playing: the scene is applied.
    Active,
    /// Media is paused or stopped: the captured state is restored.
    Inactive,
}

impl PlaybackEvent {
    #[cfg(test)]
    pub(crate) const ALL: [PlaybackEvent; 4] = [
        PlaybackEvent::Play,
        PlaybackEvent::Resume,
        PlaybackEvent::Pause,
        PlaybackEvent::Stop,
    ];

    pub fn phase(self) -> Phase {
        match self {
            PlaybackEvent::Play | PlaybackEvent::Resume => Phase::Active,
            PlaybackEvent::Pause | PlaybackEvent::Stop => Phase::Inactive,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawWebhook {
    event: Option<String>,
    #[serde(rename = "Player")]
    player: Option<RawPlayer>,
    #[serde(rename = "Metadata")]
    metadata: Option<RawMetadata>,
}

#[derive(Debug, Deserialize)]
struct RawPlayer {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    library_section_type: Option<String>,
}

/// The fields of a Plex webhook that plexhue cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Webhook {
    /// Raw event name, e.g. `media.play`.
    pub event: String,
    /// `Player.title`
    pub player: String,
    /// `Metadata.librarySectionType`, e.g. `movie`, `show`, `artist`.
    pub library_section_type: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is missing '{0}'")]
    MissingField(&'static str),
}

impl Webhook {
    /// Parse the JSON carried in the `payload` form field.
    pub fn parse(payload: &str) -> Result<Self, PayloadError> {
        let raw: RawWebhook = serde_json::from_str(payload)?;

        let event = raw.event.ok_or(PayloadError::MissingField("event"))?;
        let player = raw
            .player
            .and_then(|p| p.title)
            .ok_or(PayloadError::MissingField("Player.title"))?;

        Ok(Self {
            event,
            player,
            library_section_type: raw.metadata.and_then(|m| m.library_section_type),
        })
    }

    /// The event as a [`PlaybackEvent`], if it is one plexhue acts on.
    pub fn playback_event(&self) -> Option<PlaybackEvent> {
        self.event.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!("media.play".parse::<PlaybackEvent>().unwrap(), PlaybackEvent::Play);
        assert_eq!("media.stop".parse::<PlaybackEvent>().unwrap(), PlaybackEvent::Stop);
        assert!("media.scrobble".parse::<PlaybackEvent>().is_err());
        assert_eq!(PlaybackEvent::Resume.to_string(), "media.resume");
        assert_eq!(
            serde_json::to_string(&PlaybackEvent::Pause).unwrap(),
            "\"media.pause\""
        );
    }

    #[test]
    fn test_phases() {
        assert_eq!(PlaybackEvent::Play.phase(), Phase::Active);
        assert_eq!(PlaybackEvent::Resume.phase(), Phase::Active);
        assert_eq!(PlaybackEvent::Pause.phase(), Phase::Inactive);
        assert_eq!(PlaybackEvent::Stop.phase(), Phase::Inactive);
    }

    #[test]
    fn test_parse_plex_payload() {
        let payload = r#"{
            "event": "media.play",
            "user": true,
            "owner": true,
            "Account": { "id": 1, "title": "someone" },
            "Server": { "title": "nas" },
            "Player": { "local": true, "title": "Living", "uuid": "abc" },
            "Metadata": { "librarySectionType": "movie", "title": "Alien" }
        }"#;

        let webhook = Webhook::parse(payload).unwrap();
        assert_eq!(webhook.event, "media.play");
        assert_eq!(webhook.player, "Living");
        assert_eq!(webhook.library_section_type.as_deref(), Some("movie"));
        assert_eq!(webhook.playback_event(), Some(PlaybackEvent::Play));
    }

    #[test]
    fn test_parse_without_metadata() {
        let webhook =
            Webhook::parse(r#"{"event": "media.rate", "Player": {"title": "Living"}}"#).unwrap();
        assert_eq!(webhook.library_section_type, None);
        assert_eq!(webhook.playback_event(), None);
    }

    #[test]
    fn test_parse_missing_fields() {
        let err = Webhook::parse(r#"{"Player": {"title": "Living"}}"#).unwrap_err();
        assert!(matches!(err, PayloadError::MissingField("event")));

        let err = Webhook::parse(r#"{"event": "media.play", "Player": {}}"#).unwrap_err();
        assert!(matches!(err, PayloadError::MissingField("Player.title")));

        let err = Webhook::parse("not json").unwrap_err();
        assert!(matches!(err, PayloadError::Json(_)));
    }
}
