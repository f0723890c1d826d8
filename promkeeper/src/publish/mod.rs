//! Publishing of rendered artifacts.
//!
//! Readers never observe a partial artifact: files are renamed into place,
//! remote objects are replaced with their version token. A successful write
//! may be followed by a reload request to the monitoring system.

mod file;
mod reload;
mod remote;
mod service;

pub use file::publish_file;
pub use reload::ReloadTrigger;
pub use remote::{RuleObjectPublisher, rule_object_name};
pub use service::PublishService;
