//! Repository layer for database access.
//!
//! Each repository is a trait (so components can be tested against fakes)
//! with one `Sqlx*` implementation over the shared SQLite pool.

pub mod alert;
pub mod entity;
pub mod rule;
pub mod sender;
pub mod target;
pub mod task;

pub use alert::*;
pub use entity::*;
pub use rule::*;
pub use sender::*;
pub use target::*;
pub use task::*;
