//! Database models.

pub mod alert;
pub mod entity;
pub mod rule;
pub mod sender;
pub mod task;

pub use alert::*;
pub use entity::*;
pub use rule::*;
pub use sender::*;
pub use task::*;
