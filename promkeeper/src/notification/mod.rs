//! Notification delivery.
//!
//! Drivers are registered once at startup in a [`DriverRegistry`] and looked
//! up by the name stored on each sender.

pub mod drivers;
mod registry;

pub use drivers::{DeliveryTarget, NotificationDriver};
pub use registry::DriverRegistry;
