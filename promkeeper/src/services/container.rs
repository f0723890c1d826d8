//! Service container for dependency injection.
//!
//! The ServiceContainer wires repositories, drivers, routing, publishing,
//! the task queue and its workers, and owns their lifecycle.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::alert::AlertService;
use crate::Result;
use crate::config::{ReloadEventBroadcaster, RulesBackend, Settings};
use crate::database::repositories::{
    SqlxAlertRepository, SqlxEntityRepository, SqlxRuleRepository, SqlxSenderRepository,
    SqlxTargetRepository, SqlxTaskRepository,
};
use crate::dispatch::DispatchEngine;
use crate::notification::DriverRegistry;
use crate::publish::{PublishService, ReloadTrigger, RuleObjectPublisher};
use crate::reconcile::{KubeClient, ReconcilerConfig, WatchReconciler, WatchedResource};
use crate::render::ConfigRenderer;
use crate::routing::AlertRouter;
use crate::scheduler::PublishScheduler;
use crate::tasks::{DEFAULT_QUEUE, TaskQueue, TaskQueueConfig, TaskRunner, WorkerPool, WorkerPoolConfig};
use crate::utils::http_client::build_client;

/// Default shutdown timeout.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Service container holding all application services.
pub struct ServiceContainer {
    /// Database connection pool.
    pub pool: SqlitePool,
    pub settings: Arc<Settings>,
    /// Alert ingestion.
    pub alerts: Arc<AlertService>,
    pub router: Arc<AlertRouter>,
    pub dispatch: Arc<DispatchEngine>,
    pub renderer: Arc<ConfigRenderer>,
    pub publish: Arc<PublishService>,
    pub queue: Arc<TaskQueue>,
    /// Outcome of every Prometheus reload request.
    pub reload_events: ReloadEventBroadcaster,
    runner: Arc<TaskRunner>,
    worker_pools: Vec<Arc<WorkerPool>>,
    reconcilers: Vec<Arc<WatchReconciler>>,
    scheduler: Arc<PublishScheduler>,
    background: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    /// Cancellation token for graceful shutdown.
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Build every service on top of `pool`. Nothing runs until
    /// [`initialize`](Self::initialize).
    pub async fn new(pool: SqlitePool, settings: Arc<Settings>) -> Result<Self> {
        info!("Initializing service container");

        // Repositories
        let alert_repo = Arc::new(SqlxAlertRepository::new(pool.clone()));
        let entity_repo = Arc::new(SqlxEntityRepository::new(pool.clone()));
        let rule_repo = Arc::new(SqlxRuleRepository::new(pool.clone()));
        let sender_repo = Arc::new(SqlxSenderRepository::new(pool.clone()));
        let target_repo = Arc::new(SqlxTargetRepository::new(pool.clone()));
        let task_repo = Arc::new(SqlxTaskRepository::new(pool.clone()));

        let queue = Arc::new(TaskQueue::new(
            task_repo,
            TaskQueueConfig {
                max_attempts: settings.tasks.max_attempts,
                retry_delay: Duration::from_millis(settings.tasks.retry_delay_ms),
            },
        ));

        // Notification
        let driver_client = build_client(Duration::from_secs(settings.drivers.timeout_secs))?;
        let drivers = Arc::new(DriverRegistry::with_defaults(
            &settings,
            driver_client,
            entity_repo.clone(),
            sender_repo.clone(),
        ));

        let router = Arc::new(AlertRouter::new(
            &settings,
            alert_repo.clone(),
            entity_repo.clone(),
            sender_repo,
            drivers.clone(),
            queue.clone(),
        ));
        let dispatch = Arc::new(DispatchEngine::new(drivers, alert_repo.clone()));
        let alerts = Arc::new(AlertService::new(alert_repo, queue.clone()));

        // Publishing
        let renderer = Arc::new(ConfigRenderer::new(target_repo.clone(), rule_repo));
        let reload_events = ReloadEventBroadcaster::new();
        let reload_client =
            build_client(Duration::from_secs(settings.prometheus.reload_timeout_secs))?;
        let reload = Arc::new(ReloadTrigger::new(
            reload_client,
            &settings.prometheus.url,
            reload_events.clone(),
        ));

        let needs_kube = settings.kubernetes.watch_enabled
            || settings.prometheus.rules_backend == RulesBackend::Kubernetes;
        let kube = if needs_kube {
            Some(Arc::new(KubeClient::from_settings(&settings.kubernetes)?))
        } else {
            None
        };

        let rule_objects = kube.as_ref().map(|kube| {
            Arc::new(RuleObjectPublisher::new(
                kube.clone(),
                settings.kubernetes.namespace.clone(),
                settings.kubernetes.object_prefix.clone(),
                settings.kubernetes.ownership_marker.clone(),
            ))
        });

        let publish = Arc::new(PublishService::new(
            settings.clone(),
            renderer.clone(),
            reload,
            rule_objects,
            target_repo,
            queue.clone(),
        ));

        // Reconcilers
        let mut reconcilers = Vec::new();
        if let Some(kube) = kube.as_ref().filter(|_| settings.kubernetes.watch_enabled) {
            let resources = [
                WatchedResource::PrometheusRules,
                WatchedResource::RuleConfigMaps {
                    selector: settings.kubernetes.configmap_selector.clone(),
                },
            ];
            for resource in resources {
                let reconciler = WatchReconciler::new(
                    resource,
                    kube.clone(),
                    kube.clone(),
                    entity_repo.clone(),
                    renderer.clone(),
                    ReconcilerConfig::from_settings(&settings),
                )
                .with_change_hook(publish.clone());
                reconcilers.push(Arc::new(reconciler));
            }
        }

        // Workers
        let runner = Arc::new(TaskRunner::new(
            router.clone(),
            dispatch.clone(),
            publish.clone(),
        ));
        let pool_config = WorkerPoolConfig {
            max_workers: settings.tasks.workers,
            poll_interval: Duration::from_millis(settings.tasks.poll_interval_ms),
        };
        let mut queue_names = vec![DEFAULT_QUEUE.to_string()];
        let host_queue = settings.host_queue();
        if host_queue != DEFAULT_QUEUE {
            queue_names.push(host_queue);
        }
        let worker_pools = queue_names
            .into_iter()
            .map(|name| Arc::new(WorkerPool::new(name, pool_config.clone())))
            .collect();

        let scheduler = Arc::new(PublishScheduler::new(
            publish.clone(),
            Duration::from_secs(settings.scheduler.publish_interval_secs),
        ));

        info!("Service container initialized");

        Ok(Self {
            pool,
            settings,
            alerts,
            router,
            dispatch,
            renderer,
            publish,
            queue,
            reload_events,
            runner,
            worker_pools,
            reconcilers,
            scheduler,
            background: parking_lot::Mutex::new(Vec::new()),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Recover interrupted tasks and start workers, reconcilers and the
    /// publish scheduler.
    pub async fn initialize(&self) -> Result<()> {
        info!("Initializing services");

        self.queue.recover_interrupted().await?;

        for pool in &self.worker_pools {
            pool.start(self.queue.clone(), self.runner.clone());
        }

        {
            let mut background = self.background.lock();
            for reconciler in &self.reconcilers {
                let reconciler = reconciler.clone();
                let cancel = self.cancellation_token.child_token();
                background.push(tokio::spawn(async move { reconciler.run(cancel).await }));
            }

            if let Some(handle) = self
                .scheduler
                .clone()
                .start(self.cancellation_token.child_token())
            {
                background.push(handle);
            }
        }

        if let Err(e) = self.publish.schedule(None).await {
            warn!(error = %e, "Initial publish could not be scheduled");
        }

        info!(
            worker_pools = self.worker_pools.len(),
            reconcilers = self.reconcilers.len(),
            "Services initialized"
        );
        Ok(())
    }

    /// Queues consumed by this process.
    pub fn queue_names(&self) -> Vec<String> {
        self.worker_pools
            .iter()
            .map(|p| p.queue_name().to_string())
            .collect()
    }

    pub fn reconcilers(&self) -> &[Arc<WatchReconciler>] {
        &self.reconcilers
    }

    /// Shutdown all services gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Shutdown all services gracefully with a custom timeout.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<()> {
        info!("Shutting down services (timeout: {:?})", timeout);

        // Signal all background tasks to stop
        self.cancellation_token.cancel();

        let handles: Vec<JoinHandle<()>> = self.background.lock().drain(..).collect();
        let pools = self.worker_pools.clone();

        let shutdown_result = tokio::time::timeout(timeout, async move {
            for pool in &pools {
                pool.stop().await;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Background task ended abnormally");
                }
            }
        })
        .await;

        if shutdown_result.is_err() {
            warn!("Shutdown timeout reached, forcing shutdown");
        }

        // Close database pool
        info!("Closing database pool...");
        self.pool.close().await;

        info!("Services shut down");
        Ok(())
    }

    /// Get the cancellation token for external use.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Check if shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
