//! Domain types shared by routing, rendering and reconciliation.

pub mod alert;
pub mod owner;
pub mod rule;
pub mod sender;

pub use alert::{EntityLookup, ExpandedAlert, NamedEntity, common_labels, expand_alert};
pub use owner::{OwnerKind, OwnerRef};
pub use rule::{RuleFile, RuleGroup, RuleSource, RuleSpec};
pub use sender::{Sender, SenderFilter};
