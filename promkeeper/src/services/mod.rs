//! Service layer module.
//!
//! This module provides the service container and initialization logic
//! for all application services.

pub mod alert;
pub mod container;

pub use alert::AlertService;
pub use container::ServiceContainer;
