//! Configuration: process settings and configuration events.

pub mod events;
pub mod settings;

pub use events::{PostReloadEvent, ReloadEventBroadcaster};
pub use settings::{MANAGED_BY_LABEL, RulesBackend, Settings};
