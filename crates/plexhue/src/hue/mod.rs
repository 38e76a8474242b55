//! Philips Hue bridge access.

mod client;
mod types;

#[cfg(test)]
pub use client::MockBridge;
pub use client::Bridge;
pub use client::BridgeError;
pub use client::HueClient;
pub use types::LightCommand;
pub use types::LightState;
