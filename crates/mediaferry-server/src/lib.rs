//! Mediaferry server: HTTP front door, settings, and process wiring.

pub mod config;
pub mod rest;
pub mod state;

pub use config::Settings;
pub use rest::router;
pub use state::{build_orchestrator, AppState};
