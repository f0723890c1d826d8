//! Polymorphic owning-entity references.

use serde::{Deserialize, Serialize};

/// Kind of entity that owns senders or rules.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    /// Global scope, not tied to any entity.
    Site,
    Project,
    Service,
    User,
}

/// Tagged reference `{kind, id}` to an owning entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: OwnerKind,
    pub id: i64,
}

impl OwnerRef {
    pub fn new(kind: OwnerKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn site() -> Self {
        Self::new(OwnerKind::Site, 0)
    }

    pub fn project(id: i64) -> Self {
        Self::new(OwnerKind::Project, id)
    }

    pub fn service(id: i64) -> Self {
        Self::new(OwnerKind::Service, id)
    }

    pub fn user(id: i64) -> Self {
        Self::new(OwnerKind::User, id)
    }

    /// Parse the `(owner_kind, owner_id)` columns of a row.
    pub fn from_columns(kind: &str, id: i64) -> Option<Self> {
        kind.parse().ok().map(|kind| Self { kind, id })
    }
}

impl std::fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_kind_strings() {
        assert_eq!(OwnerKind::Service.to_string(), "service");
        assert_eq!("project".parse::<OwnerKind>().unwrap(), OwnerKind::Project);
        assert!("farm".parse::<OwnerKind>().is_err());
    }

    #[test]
    fn test_from_columns() {
        assert_eq!(OwnerRef::from_columns("user", 7), Some(OwnerRef::user(7)));
        assert_eq!(OwnerRef::from_columns("unknown", 7), None);
        assert_eq!(OwnerRef::service(3).to_string(), "service:3");
    }
}
