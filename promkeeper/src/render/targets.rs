//! file_sd target lists for exporters and blackbox probes.

use std::collections::BTreeMap;

use serde::Serialize;

use super::ConfigRenderer;
use crate::Result;

/// One file_sd entry.
#[derive(Debug, Serialize)]
struct TargetGroup {
    labels: BTreeMap<String, String>,
    targets: Vec<String>,
}

impl ConfigRenderer {
    /// Scrape targets: one entry per (project, exporter) listing every host
    /// of the project's farm.
    pub async fn render_targets(&self) -> Result<Vec<u8>> {
        let rows = self.targets.list_exporter_targets().await?;

        let mut groups: BTreeMap<(String, String, i64, String, String), TargetGroup> =
            BTreeMap::new();
        for row in rows {
            let key = (
                row.project.clone(),
                row.job.clone(),
                row.port,
                row.path.clone(),
                row.scheme.clone(),
            );
            let group = groups.entry(key).or_insert_with(|| {
                let mut labels = BTreeMap::from([
                    ("__shard".to_string(), row.shard.clone()),
                    ("service".to_string(), row.service.clone()),
                    ("project".to_string(), row.project.clone()),
                    ("farm".to_string(), row.farm.clone()),
                    ("__farm_source".to_string(), row.farm_source.clone()),
                    ("job".to_string(), row.job.clone()),
                ]);
                if !row.path.is_empty() {
                    labels.insert("__metrics_path__".to_string(), row.path.clone());
                }
                if !row.scheme.is_empty() && row.scheme != "http" {
                    labels.insert("__scheme__".to_string(), row.scheme.clone());
                }
                TargetGroup {
                    labels,
                    targets: Vec::new(),
                }
            });
            group.targets.push(format!("{}:{}", row.host, row.port));
        }

        Ok(serde_json::to_vec_pretty(
            &groups.into_values().collect::<Vec<_>>(),
        )?)
    }

    /// Blackbox probe URLs grouped by (project, module).
    pub async fn render_urls(&self) -> Result<Vec<u8>> {
        let rows = self.targets.list_probe_urls().await?;

        let mut groups: BTreeMap<(String, String), TargetGroup> = BTreeMap::new();
        for row in rows {
            let group = groups
                .entry((row.project.clone(), row.probe_module.clone()))
                .or_insert_with(|| TargetGroup {
                    labels: BTreeMap::from([
                        ("project".to_string(), row.project.clone()),
                        ("service".to_string(), row.service.clone()),
                        ("job".to_string(), row.probe_module.clone()),
                        ("__shard".to_string(), row.shard.clone()),
                        ("__param_module".to_string(), row.probe_module.clone()),
                    ]),
                    targets: Vec::new(),
                });
            group.targets.push(row.url);
        }

        Ok(serde_json::to_vec_pretty(
            &groups.into_values().collect::<Vec<_>>(),
        )?)
    }
}
