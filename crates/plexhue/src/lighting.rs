//! Capturing light states, applying scenes and restoring what was captured.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::time::Duration;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::Config;
use crate::hue::Bridge;
use crate::hue::LightCommand;
use crate::hue::LightState;
use crate::state::CapturedLights;
use crate::state::LightSnapshot;

/// What a capture or restore pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Lights a new state was written to
    pub written: usize,
    /// Lights left alone because both current and target state are off
    pub skipped: usize,
    /// Bridge calls that failed
    pub failed: usize,
}

impl std::fmt::Display for PassReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} light(s) updated, {} skipped, {} failed",
            self.written, self.skipped, self.failed
        )
    }
}

pub struct Lighting<'a> {
    config: &'a Config,
    bridge: &'a dyn Bridge,
}

impl<'a> Lighting<'a> {
    pub fn new(config: &'a Config, bridge: &'a dyn Bridge) -> Self {
        Self { config, bridge }
    }

    /// Record the state of every light in the configured groups into
    /// `captured`, then apply each light's scene.
    pub async fn capture_and_apply(&self, captured: &mut CapturedLights) -> PassReport {
        let mut report = PassReport::default();
        let mut seen = HashSet::new();

        for (group_name, group) in &self.config.groups {
            info!("Processing group '{}'", group_name);

            let light_ids = match self.bridge.group_lights(group.id).await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!("Failed to read group '{}' ({}): {}", group_name, group.id, e);
                    report.failed += 1;
                    continue;
                }
            };
            info!("Found {} light(s) in group '{}'", light_ids.len(), group_name);

            for light_id in light_ids {
                if !seen.insert(light_id.clone()) {
                    debug!("Light '{}' was already handled in another group", light_id);
                    continue;
                }

                let current = match self.bridge.light_state(&light_id).await {
                    Ok(state) => state,
                    Err(e) => {
                        warn!("Failed to read light '{}': {}", light_id, e);
                        report.failed += 1;
                        continue;
                    }
                };

                debug!("Saving current state of light '{}'", light_id);
                captured
                    .entry(group_name.clone())
                    .or_default()
                    .insert(light_id.clone(), self.snapshot(&light_id, &current));

                let Some((scene_name, scene)) = self.config.scene_for(group_name, &light_id)
                else {
                    // Validation guarantees every group scene exists
                    warn!("No scene configured for light '{}'", light_id);
                    continue;
                };

                if !current.on && !scene.on {
                    debug!("Light '{}' is already off", light_id);
                    report.skipped += 1;
                    continue;
                }

                debug!("Applying scene '{}' to light '{}'", scene_name, light_id);
                let command = LightCommand::from_scene(scene, self.config.hue.transition_time);
                self.write(&light_id, &command, &mut report).await;
            }
        }

        report
    }

    /// Put every captured light back into its recorded state and clear `captured`.
    pub async fn restore(&self, captured: &mut CapturedLights) -> PassReport {
        let mut report = PassReport::default();

        for (group_name, lights) in captured.iter() {
            info!("Processing group '{}'", group_name);

            for (light_id, snapshot) in lights {
                let target_off = self
                    .config
                    .scene_for(group_name, light_id)
                    .is_some_and(|(_, scene)| !scene.on);

                if !snapshot.on && target_off {
                    debug!("Light '{}' was off and stayed off", light_id);
                    report.skipped += 1;
                    continue;
                }

                debug!("Reverting light '{}' to its saved state", light_id);
                let command =
                    LightCommand::from_snapshot(snapshot, self.config.hue.transition_time);
                self.write(light_id, &command, &mut report).await;
            }
        }

        *captured = BTreeMap::new();
        info!("Saved light states have been removed");

        report
    }

    fn snapshot(&self, light_id: &str, state: &LightState) -> LightSnapshot {
        if !state.on {
            return LightSnapshot::off();
        }

        let mut bri = state.bri;
        let ceiling = self.config.hue.resume_max_brightness.filter(|c| *c > 0);
        if let (Some(current), Some(ceiling)) = (bri, ceiling) {
            if current > ceiling {
                debug!(
                    "Brightness {} of light '{}' exceeds {}, saving {} instead",
                    current, light_id, ceiling, ceiling
                );
                bri = Some(ceiling);
            }
        }

        LightSnapshot {
            on: true,
            bri,
            hue: state.hue,
            xy: state.xy,
        }
    }

    /// Write a state to a light, then wait out the throttle delay.
    async fn write(&self, light_id: &str, command: &LightCommand, report: &mut PassReport) {
        match self.bridge.set_light_state(light_id, command).await {
            Ok(()) => report.written += 1,
            Err(e) => {
                warn!("Failed to set state of light '{}': {}", light_id, e);
                report.failed += 1;
            }
        }

        if self.config.hue.throttle_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.hue.throttle_ms)).await;
        }
    }
}
