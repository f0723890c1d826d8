//! Deduplicated dispatch plans.

use std::collections::{BTreeMap, BTreeSet};

use crate::notification::DeliveryTarget;

/// Set-valued mapping driver -> targets. A pair is held at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchPlan {
    targets: BTreeMap<String, BTreeSet<String>>,
}

impl DispatchPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pair. Returns `false` when it was already planned.
    pub fn insert(&mut self, driver: impl Into<String>, target: impl Into<String>) -> bool {
        self.targets
            .entry(driver.into())
            .or_default()
            .insert(target.into())
    }

    pub fn extend(&mut self, targets: impl IntoIterator<Item = DeliveryTarget>) {
        for t in targets {
            self.insert(t.driver, t.target);
        }
    }

    pub fn contains(&self, driver: &str, target: &str) -> bool {
        self.targets.get(driver).is_some_and(|t| t.contains(target))
    }

    /// Number of distinct (driver, target) pairs.
    pub fn len(&self) -> usize {
        self.targets.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn drivers(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Pairs in driver, then target order.
    pub fn iter(&self) -> impl Iterator<Item = DeliveryTarget> + '_ {
        self.targets.iter().flat_map(|(driver, targets)| {
            targets
                .iter()
                .map(move |target| DeliveryTarget::new(driver.clone(), target.clone()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_collapse() {
        let mut plan = DispatchPlan::new();
        assert!(plan.insert("webhook", "http://a"));
        assert!(!plan.insert("webhook", "http://a"));
        plan.insert("webhook", "http://b");
        plan.insert("discord", "http://a");

        assert_eq!(plan.len(), 3);
        assert!(plan.contains("discord", "http://a"));
        assert_eq!(plan.drivers().collect::<Vec<_>>(), vec!["discord", "webhook"]);
        assert_eq!(
            plan.iter().next(),
            Some(DeliveryTarget::new("discord", "http://a"))
        );
    }
}
