pub mod api;
pub mod config;
pub mod event;
pub mod gate;
pub mod hue;
pub mod lighting;
pub mod orchestrator;
pub mod state;
pub mod transition;

pub use config::Config;
pub use event::PlaybackEvent;
pub use orchestrator::Orchestrator;
pub use orchestrator::RunError;
pub use state::RunState;
