//! Configuration artifacts rendered from the entity store.
//!
//! Output is deterministic for a given store: rows are read in a fixed
//! order and every label map is sorted.

mod rules;
mod targets;

pub use rules::{ImportCounters, RuleScope};

use std::sync::Arc;

use crate::database::repositories::{RuleRepository, TargetRepository};

pub struct ConfigRenderer {
    targets: Arc<dyn TargetRepository>,
    rules: Arc<dyn RuleRepository>,
}

impl ConfigRenderer {
    pub fn new(targets: Arc<dyn TargetRepository>, rules: Arc<dyn RuleRepository>) -> Self {
        Self { targets, rules }
    }
}
