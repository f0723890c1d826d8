//! Render -> publish -> reload pipelines.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::file::publish_file;
use super::reload::ReloadTrigger;
use super::remote::RuleObjectPublisher;
use crate::config::{RulesBackend, Settings};
use crate::database::repositories::TargetRepository;
use crate::domain::RuleSource;
use crate::reconcile::RulesChanged;
use crate::render::{ConfigRenderer, RuleScope};
use crate::tasks::{Job, TaskQueue};
use crate::{Error, Result};

pub struct PublishService {
    settings: Arc<Settings>,
    renderer: Arc<ConfigRenderer>,
    reload: Arc<ReloadTrigger>,
    rule_objects: Option<Arc<RuleObjectPublisher>>,
    targets: Arc<dyn TargetRepository>,
    queue: Arc<TaskQueue>,
}

impl PublishService {
    pub fn new(
        settings: Arc<Settings>,
        renderer: Arc<ConfigRenderer>,
        reload: Arc<ReloadTrigger>,
        rule_objects: Option<Arc<RuleObjectPublisher>>,
        targets: Arc<dyn TargetRepository>,
        queue: Arc<TaskQueue>,
    ) -> Self {
        Self {
            settings,
            renderer,
            reload,
            rule_objects,
            targets,
            queue,
        }
    }

    fn mode(&self, mode: Option<u32>) -> Result<u32> {
        match mode {
            Some(mode) => Ok(mode),
            None => self.settings.prometheus.file_mode(),
        }
    }

    async fn finish(&self, reload: bool) -> Result<()> {
        if reload {
            self.reload.reload().await?;
        }
        Ok(())
    }

    /// Publish the scrape target file.
    pub async fn write_config(
        &self,
        path: Option<&Path>,
        reload: bool,
        mode: Option<u32>,
    ) -> Result<()> {
        let path = path.unwrap_or(self.settings.prometheus.targets.as_path());
        let bytes = self.renderer.render_targets().await?;
        publish_file(path, bytes, self.mode(mode)?).await?;
        info!(path = %path.display(), "Wrote target config");
        self.finish(reload).await
    }

    /// Publish the blackbox URL file.
    pub async fn write_urls(
        &self,
        path: Option<&Path>,
        reload: bool,
        mode: Option<u32>,
    ) -> Result<()> {
        let path = path.unwrap_or(self.settings.prometheus.blackbox.as_path());
        let bytes = self.renderer.render_urls().await?;
        publish_file(path, bytes, self.mode(mode)?).await?;
        info!(path = %path.display(), "Wrote probe urls");
        self.finish(reload).await
    }

    /// Publish the rules to the configured backend.
    pub async fn write_rules(
        &self,
        path: Option<&Path>,
        reload: bool,
        mode: Option<u32>,
    ) -> Result<()> {
        match self.settings.prometheus.rules_backend {
            RulesBackend::File => {
                let path = path.unwrap_or(self.settings.prometheus.rules.as_path());
                let bytes = self
                    .renderer
                    .render_rules(RuleScope::All(RuleSource::Prometheus))
                    .await?;
                publish_file(path, bytes, self.mode(mode)?).await?;
                info!(path = %path.display(), "Wrote rules");
            }
            RulesBackend::Kubernetes => {
                let Some(publisher) = &self.rule_objects else {
                    return Err(Error::config(
                        "rules_backend is kubernetes but no object store is configured",
                    ));
                };
                let groups = self.renderer.rendered_groups(RuleSource::Prometheus).await?;
                publisher.publish_rule_objects(&groups).await?;
            }
        }
        self.finish(reload).await
    }

    /// Queues of the Prometheus servers of `shard` (all shards when `None`).
    /// Falls back to this host's queue when no server is registered at all.
    async fn server_queues(&self, shard: Option<&str>) -> Result<BTreeSet<String>> {
        let mut queues: BTreeSet<String> = self
            .targets
            .list_prometheus_servers(shard)
            .await?
            .into_iter()
            .map(|s| s.host)
            .collect();
        if queues.is_empty() && shard.is_none() {
            queues.insert(self.settings.host_queue());
        }
        Ok(queues)
    }

    /// Submit write tasks to the queue of every Prometheus server, optionally
    /// limited to one shard. Returns the number of queues targeted.
    pub async fn schedule(&self, shard: Option<&str>) -> Result<usize> {
        let queues = self.server_queues(shard).await?;
        if queues.is_empty() {
            warn!(?shard, "No Prometheus servers registered for shard");
            return Ok(0);
        }

        let jobs = [
            Job::WriteConfig {
                path: None,
                reload: true,
            },
            Job::WriteUrls {
                path: None,
                reload: true,
            },
            Job::WriteRules {
                path: None,
                reload: true,
            },
        ];
        for queue in &queues {
            for job in &jobs {
                self.queue.submit(queue, job).await?;
            }
        }

        info!(queues = queues.len(), "Scheduled artifact publish");
        Ok(queues.len())
    }

    /// Submit a rules publish to every Prometheus queue.
    pub async fn schedule_rules(&self) -> Result<usize> {
        let queues = self.server_queues(None).await?;
        let job = Job::WriteRules {
            path: None,
            reload: true,
        };
        for queue in &queues {
            self.queue.submit(queue, &job).await?;
        }
        Ok(queues.len())
    }

    pub async fn reload(&self) -> Result<()> {
        self.reload.reload().await.map(|_| ())
    }
}

#[async_trait]
impl RulesChanged for PublishService {
    async fn rules_changed(&self) -> Result<()> {
        self.schedule_rules().await.map(|_| ())
    }
}
