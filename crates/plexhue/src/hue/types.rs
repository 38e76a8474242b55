//! Wire types for the Hue bridge REST API.

use serde::Deserialize;
use serde::Serialize;

use crate::config::ScenePreset;
use crate::state::LightSnapshot;

/// Response of `GET groups/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupResponse {
    pub lights: Vec<String>,
}

/// Response of `GET lights/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct LightResponse {
    pub state: LightState,
}

/// Current state of a light as reported by the bridge.
///
/// White-only bulbs report neither `hue` nor `xy`; on/off plugs don't
/// report `bri` either.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct LightState {
    pub on: bool,

    #[serde(default)]
    pub bri: Option<u8>,

    #[serde(default)]
    pub hue: Option<u16>,

    #[serde(default)]
    pub xy: Option<(f64, f64)>,
}

/// Body of `PUT lights/{id}/state`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightCommand {
    pub on: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hue: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub xy: Option<(f64, f64)>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transitiontime: Option<u16>,
}

impl LightCommand {
    /// Command applying a scene, using `default_transition` when the scene has none.
    pub fn from_scene(scene: &ScenePreset, default_transition: u16) -> Self {
        Self {
            on: scene.on,
            bri: scene.bri,
            hue: scene.hue,
            xy: scene.xy,
            transitiontime: Some(scene.transitiontime.unwrap_or(default_transition)),
        }
    }

    /// Command putting a light back to a captured state.
    pub fn from_snapshot(snapshot: &LightSnapshot, transition: u16) -> Self {
        Self {
            on: snapshot.on,
            bri: snapshot.bri,
            hue: snapshot.hue,
            xy: snapshot.xy,
            transitiontime: Some(transition),
        }
    }
}

/// One entry of the array the bridge answers writes with.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResult {
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub description: String,
}
