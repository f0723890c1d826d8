//! Rule files: rendering and import.

use std::collections::BTreeMap;

use tracing::debug;

use super::ConfigRenderer;
use crate::Result;
use crate::database::models::{NewRule, UpsertOutcome};
use crate::domain::{OwnerKind, OwnerRef, RuleFile, RuleGroup, RuleSource, RuleSpec};

/// Group name of site-wide rules.
pub const GLOBAL_GROUP: &str = "global";

/// Which rules `render_rules` emits.
#[derive(Debug, Clone)]
pub enum RuleScope {
    /// Every enabled stored rule of one dialect, grouped by owner.
    All(RuleSource),
    /// One externally-supplied group, reduced to rules that are stored and
    /// enabled for the dialect.
    Group { group: RuleGroup, source: RuleSource },
}

/// Per-rule results of an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportCounters {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Rules without an `alert` name.
    pub skipped: usize,
}

impl ImportCounters {
    /// Whether the store changed.
    pub fn changed(&self) -> bool {
        self.created + self.updated > 0
    }

    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

impl std::ops::AddAssign for ImportCounters {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
    }
}

fn rule_name(rule: &RuleSpec) -> Option<&str> {
    rule.alert.as_deref().or(rule.record.as_deref())
}

impl ConfigRenderer {
    /// Rule file YAML for `scope`.
    pub async fn render_rules(&self, scope: RuleScope) -> Result<Vec<u8>> {
        let file = match scope {
            RuleScope::All(source) => RuleFile {
                groups: self.rendered_groups(source).await?,
            },
            RuleScope::Group { group, source } => {
                RuleFile::single(self.filter_group(group, source).await?)
            }
        };
        Ok(serde_yaml::to_string(&file)?.into_bytes())
    }

    /// Enabled stored rules of one dialect, one group per owner.
    pub async fn rendered_groups(&self, source: RuleSource) -> Result<Vec<RuleGroup>> {
        let rows = self.rules.list_enabled_rules(source).await?;

        let mut groups: BTreeMap<String, Vec<RuleSpec>> = BTreeMap::new();
        for row in rows {
            let owner = row.rule.owner();
            let mut labels = row.rule.labels_map();

            let group_name = match (owner, row.owner_name) {
                (Some(owner), Some(name))
                    if matches!(owner.kind, OwnerKind::Service | OwnerKind::Project) =>
                {
                    labels.insert(owner.kind.to_string(), name.clone());
                    name
                }
                _ => GLOBAL_GROUP.to_string(),
            };

            let duration = (!row.rule.duration.is_empty()).then(|| row.rule.duration.clone());
            let annotations = row.rule.annotations_map();
            groups.entry(group_name).or_default().push(RuleSpec {
                alert: Some(row.rule.name),
                record: None,
                expr: row.rule.clause,
                duration,
                labels,
                annotations,
            });
        }

        Ok(groups
            .into_iter()
            .map(|(name, rules)| RuleGroup {
                name,
                interval: None,
                rules,
            })
            .collect())
    }

    async fn filter_group(&self, mut group: RuleGroup, source: RuleSource) -> Result<RuleGroup> {
        let enabled = self.rules.enabled_rule_names(source).await?;
        let before = group.rules.len();
        group
            .rules
            .retain(|rule| rule_name(rule).is_some_and(|name| enabled.contains(name)));
        debug!(
            group = %group.name,
            kept = group.rules.len(),
            dropped = before - group.rules.len(),
            "Filtered rule group"
        );
        Ok(group)
    }

    /// Upsert every alerting rule of `doc` into `owner`. Idempotent.
    pub async fn import_rules(
        &self,
        doc: &RuleFile,
        owner: &OwnerRef,
        source: RuleSource,
    ) -> Result<ImportCounters> {
        let mut counters = ImportCounters::default();

        for group in &doc.groups {
            for rule in &group.rules {
                let Some(name) = rule.alert.as_ref().filter(|n| !n.is_empty()) else {
                    counters.skipped += 1;
                    continue;
                };

                let outcome = self
                    .rules
                    .upsert_rule(&NewRule {
                        name: name.clone(),
                        owner: *owner,
                        clause: rule.expr.clone(),
                        duration: rule.duration.clone().unwrap_or_default(),
                        source,
                        labels: rule.labels.clone(),
                        annotations: rule.annotations.clone(),
                    })
                    .await?;
                counters.record(outcome);
            }
        }

        debug!(%owner, ?counters, "Imported rules");
        Ok(counters)
    }
}
