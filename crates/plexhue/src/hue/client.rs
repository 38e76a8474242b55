use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::types::ApiResult;
use super::types::GroupResponse;
use super::types::LightCommand;
use super::types::LightResponse;
use super::types::LightState;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("bridge rejected {address}: {description}")]
    Api {
        address: String,
        description: String,
    },
}

/// Operations plexhue needs from the lighting bridge.
///
/// This trait allows for mocking the bridge for testing purposes
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Ids of the lights in a group
    async fn group_lights(&self, group_id: u32) -> Result<Vec<String>, BridgeError>;

    /// Current state of a light
    async fn light_state(&self, light_id: &str) -> Result<LightState, BridgeError>;

    /// Write a new state to a light
    async fn set_light_state(
        &self,
        light_id: &str,
        command: &LightCommand,
    ) -> Result<(), BridgeError>;
}

/// Hue bridge client using the v1 REST API
pub struct HueClient {
    http: reqwest::Client,
    base_url: String,
}

impl HueClient {
    /// `base_url` is the API root including the key and a trailing slash.
    pub fn new(base_url: String, timeout: Option<Duration>) -> Result<Self, BridgeError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let http = builder.build().map_err(|source| BridgeError::Http {
            url: base_url.clone(),
            source,
        })?;

        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, BridgeError> {
        let url = self.url(path);
        debug!("GET {}", url);

        let value = self.send(&url, self.http.get(&url)).await?;

        // The bridge reports most errors as `[{"error": {...}}]` with a 200 status
        if value.is_array() {
            check_api_results(&url, value)?;
            return Err(BridgeError::Decode {
                url,
                message: "expected an object, got an array".to_string(),
            });
        }

        serde_json::from_value(value).map_err(|e| BridgeError::Decode {
            url,
            message: e.to_string(),
        })
    }

    async fn send(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, BridgeError> {
        let http_err = |source| BridgeError::Http {
            url: url.to_string(),
            source,
        };

        request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(http_err)?
            .json()
            .await
            .map_err(http_err)
    }
}

fn check_api_results(url: &str, value: serde_json::Value) -> Result<(), BridgeError> {
    let results: Vec<ApiResult> =
        serde_json::from_value(value).map_err(|e| BridgeError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    match results.into_iter().find_map(|r| r.error) {
        Some(error) => Err(BridgeError::Api {
            address: error.address,
            description: error.description,
        }),
        None => Ok(()),
    }
}

#[async_trait]
impl Bridge for HueClient {
    async fn group_lights(&self, group_id: u32) -> Result<Vec<String>, BridgeError> {
        let group: GroupResponse = self.get(&format!("groups/{}", group_id)).await?;
        Ok(group.lights)
    }

    async fn light_state(&self, light_id: &str) -> Result<LightState, BridgeError> {
        let light: LightResponse = self.get(&format!("lights/{}", light_id)).await?;
        Ok(light.state)
    }

    async fn set_light_state(
        &self,
        light_id: &str,
        command: &LightCommand,
    ) -> Result<(), BridgeError> {
        let url = self.url(&format!("lights/{}/state", light_id));
        debug!("PUT {} {:?}", url, command);

        let value = self.send(&url, self.http.put(&url).json(command)).await?;
        check_api_results(&url, value)
    }
}

/// Mock bridge for testing
///
/// Holds groups and light states in memory. Writes update the stored state
/// the way the real bridge would, so a capture followed by a restore can be
/// checked end to end.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockBridge {
    pub groups: std::collections::HashMap<u32, Vec<String>>,
    pub lights: std::sync::Mutex<std::collections::HashMap<String, LightState>>,
    pub writes: std::sync::Mutex<Vec<(String, LightCommand)>>,
    /// Light ids whose reads and writes fail
    pub failing: std::collections::HashSet<String>,
}

#[cfg(test)]
impl MockBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, id: u32, lights: &[(&str, LightState)]) -> Self {
        let mut known = self.lights.lock().unwrap();
        for (light_id, state) in lights {
            known.insert(light_id.to_string(), state.clone());
        }
        drop(known);

        self.groups
            .insert(id, lights.iter().map(|(id, _)| id.to_string()).collect());
        self
    }

    pub fn fail_light(mut self, light_id: &str) -> Self {
        self.failing.insert(light_id.to_string());
        self
    }

    pub fn state_of(&self, light_id: &str) -> LightState {
        self.lights.lock().unwrap()[light_id].clone()
    }

    pub fn written(&self) -> Vec<(String, LightCommand)> {
        self.writes.lock().unwrap().clone()
    }

    fn unreachable(light_id: &str) -> BridgeError {
        BridgeError::Api {
            address: format!("/lights/{}", light_id),
            description: "light is not reachable".to_string(),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Bridge for MockBridge {
    async fn group_lights(&self, group_id: u32) -> Result<Vec<String>, BridgeError> {
        self.groups
            .get(&group_id)
            .cloned()
            .ok_or_else(|| BridgeError::Api {
                address: format!("/groups/{}", group_id),
                description: "resource not available".to_string(),
            })
    }

    async fn light_state(&self, light_id: &str) -> Result<LightState, BridgeError> {
        if self.failing.contains(light_id) {
            return Err(Self::unreachable(light_id));
        }
        Ok(self.state_of(light_id))
    }

    async fn set_light_state(
        &self,
        light_id: &str,
        command: &LightCommand,
    ) -> Result<(), BridgeError> {
        self.writes
            .lock()
            .unwrap()
            .push((light_id.to_string(), command.clone()));

        if self.failing.contains(light_id) {
            return Err(Self::unreachable(light_id));
        }

        let mut lights = self.lights.lock().unwrap();
        let state = lights.entry(light_id.to_string()).or_default();
        state.on = command.on;
        if command.bri.is_some() {
            state.bri = command.bri;
        }
        if command.hue.is_some() {
            state.hue = command.hue;
        }
        if command.xy.is_some() {
            state.xy = command.xy;
        }
        Ok(())
    }
}
