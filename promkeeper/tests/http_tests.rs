//! HTTP-level tests against in-process axum servers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{Value, json};

use promkeeper::Error;
use promkeeper::utils::http_client::build_client;

type Captured = Arc<Mutex<Vec<Value>>>;

/// Serve `app` on an ephemeral port and return its base URL.
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn capture(State(seen): State<Captured>, Json(body): Json<Value>) -> StatusCode {
    seen.lock().push(body);
    StatusCode::OK
}

async fn count_reload(State(seen): State<Captured>) -> StatusCode {
    seen.lock().push(Value::Null);
    StatusCode::OK
}

fn client() -> reqwest::Client {
    build_client(Duration::from_secs(5)).unwrap()
}

mod driver_tests {
    use super::*;
    use promkeeper::notification::NotificationDriver;
    use promkeeper::notification::drivers::{TelegramDriver, WebhookDriver};

    #[tokio::test]
    async fn test_webhook_posts_payload() {
        let seen: Captured = Arc::default();
        let base = serve(
            Router::new()
                .route("/hook", post(capture))
                .route("/broken", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
                .with_state(seen.clone()),
        )
        .await;

        let driver = WebhookDriver::new(client());
        let payload = json!({"status": "firing", "commonLabels": {"alertname": "Down"}});
        driver
            .send(&format!("{}/hook", base), &payload)
            .await
            .unwrap();
        assert_eq!(*seen.lock(), vec![payload.clone()]);

        let err = driver
            .send(&format!("{}/broken", base), &payload)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Delivery { .. }));
    }

    #[tokio::test]
    async fn test_telegram_sends_message_to_chat() {
        let seen: Captured = Arc::default();
        let base = serve(
            Router::new()
                .route("/botTESTTOKEN/sendMessage", post(capture))
                .with_state(seen.clone()),
        )
        .await;

        let driver =
            TelegramDriver::new(client(), Some("TESTTOKEN".to_string())).with_api_base(base);
        let payload = json!({
            "status": "resolved",
            "commonLabels": {"alertname": "DiskFull"},
            "commonAnnotations": {"summary": "disk usage back to normal"}
        });
        driver.send("-100123", &payload).await.unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["chat_id"], "-100123");
        let text = seen[0]["text"].as_str().unwrap();
        assert!(text.contains("[RESOLVED] DiskFull"));
        assert!(text.contains("disk usage back to normal"));
    }
}

mod reload_tests {
    use super::*;
    use promkeeper::config::ReloadEventBroadcaster;
    use promkeeper::publish::ReloadTrigger;

    #[tokio::test]
    async fn test_reload_broadcasts_success() {
        let seen: Captured = Arc::default();
        let base = serve(
            Router::new()
                .route("/-/reload", post(count_reload))
                .with_state(seen.clone()),
        )
        .await;

        let events = ReloadEventBroadcaster::new();
        let mut rx = events.subscribe();
        let trigger = ReloadTrigger::new(client(), &format!("{}/", base), events);
        assert_eq!(trigger.url(), format!("{}/-/reload", base));

        let event = trigger.reload().await.unwrap();
        assert!(event.is_success());
        assert_eq!(event.status, Some(200));
        assert_eq!(seen.lock().len(), 1);

        let received = rx.recv().await.unwrap();
        assert!(received.is_success());
        assert_eq!(received.url, trigger.url());
    }

    #[tokio::test]
    async fn test_reload_failure_is_broadcast_and_returned() {
        let base = serve(Router::new().route(
            "/-/reload",
            post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        ))
        .await;

        let events = ReloadEventBroadcaster::new();
        let mut rx = events.subscribe();
        let trigger = ReloadTrigger::new(client(), &base, events);

        assert!(trigger.reload().await.is_err());
        let received = rx.recv().await.unwrap();
        assert!(!received.is_success());
        assert_eq!(received.status, Some(503));
    }
}

mod kube_tests {
    use super::*;
    use futures::StreamExt;
    use promkeeper::reconcile::{
        KubeClient, ObjectStore, ResourceKind, WatchEventType, WatchSource, WatchedResource,
    };

    const RULES_PATH: &str = "/apis/monitoring.coreos.com/v1/namespaces/mon/prometheusrules";

    async fn watch_body(headers: HeaderMap) -> (StatusCode, String) {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer secret") {
            return (StatusCode::UNAUTHORIZED, String::new());
        }
        let added = json!({"type": "ADDED", "object": {"metadata": {"name": "a"}}});
        let deleted = json!({"type": "DELETED", "object": {"metadata": {"name": "b"}}});
        (StatusCode::OK, format!("{}\n\n{}\n", added, deleted))
    }

    #[tokio::test]
    async fn test_watch_yields_line_delimited_events() {
        let base = serve(Router::new().route(RULES_PATH, get(watch_body))).await;
        let kube = KubeClient::new(client(), &base, Some("secret".to_string()));

        let events: Vec<_> = kube
            .watch(&WatchedResource::PrometheusRules, "mon")
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        let first = events[0].as_ref().unwrap();
        assert_eq!(first.event_type, WatchEventType::Added);
        assert_eq!(first.object["metadata"]["name"], "a");
        assert_eq!(
            events[1].as_ref().unwrap().event_type,
            WatchEventType::Deleted
        );
    }

    #[tokio::test]
    async fn test_watch_rejected_without_token() {
        let base = serve(Router::new().route(RULES_PATH, get(watch_body))).await;
        let kube = KubeClient::new(client(), &base, None);

        let result = kube.watch(&WatchedResource::PrometheusRules, "mon").await;
        assert!(matches!(
            result,
            Err(Error::RemoteApi { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_object_is_remote_not_found() {
        let base = serve(Router::new()).await;
        let kube = KubeClient::new(client(), &base, None);

        let err = kube
            .get(ResourceKind::ConfigMap, "mon", "missing")
            .await
            .unwrap_err();
        assert!(err.is_remote_not_found());

        let err = kube
            .delete(ResourceKind::PrometheusRule, "mon", "missing")
            .await
            .unwrap_err();
        assert!(err.is_remote_not_found());
    }

    #[tokio::test]
    async fn test_create_posts_to_collection() {
        let seen: Captured = Arc::default();
        let base = serve(
            Router::new()
                .route(
                    RULES_PATH,
                    post(|State(seen): State<Captured>, Json(body): Json<Value>| async move {
                        seen.lock().push(body.clone());
                        (StatusCode::CREATED, Json(body))
                    }),
                )
                .with_state(seen.clone()),
        )
        .await;
        let kube = KubeClient::new(client(), &base, None);

        let body = json!({"metadata": {"name": "promkeeper-rules-shop"}, "spec": {"groups": []}});
        let created = kube
            .create(ResourceKind::PrometheusRule, "mon", &body)
            .await
            .unwrap();
        assert_eq!(created, body);
        assert_eq!(seen.lock().len(), 1);
    }
}

mod service_tests {
    use super::*;
    use promkeeper::config::{ReloadEventBroadcaster, RulesBackend, Settings};
    use promkeeper::database::models::TaskStatus;
    use promkeeper::database::repositories::{
        AlertRepository, EntityRepository, SqlxAlertRepository, SqlxEntityRepository,
        SqlxRuleRepository, SqlxTargetRepository, SqlxTaskRepository,
    };
    use promkeeper::database::{DbPool, init_pool, run_migrations};
    use promkeeper::domain::{OwnerRef, RuleFile, RuleSource};
    use promkeeper::publish::{PublishService, ReloadTrigger, RuleObjectPublisher};
    use promkeeper::reconcile::KubeClient;
    use promkeeper::render::ConfigRenderer;
    use promkeeper::services::ServiceContainer;
    use promkeeper::tasks::{DEFAULT_QUEUE, TaskQueue, TaskQueueConfig};

    async fn setup_test_db() -> DbPool {
        let pool = init_pool("sqlite::memory:")
            .await
            .expect("Failed to create test pool");
        run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    fn settings(dir: &std::path::Path, prometheus_url: &str) -> Settings {
        let mut settings = Settings::default();
        settings.database_url = "sqlite::memory:".to_string();
        settings.prometheus.url = prometheus_url.to_string();
        settings.prometheus.targets = dir.join("targets.json");
        settings.prometheus.blackbox = dir.join("blackbox.json");
        settings.prometheus.rules = dir.join("rules.yml");
        settings.tasks.host_queue = Some("prom-test".to_string());
        settings.tasks.workers = 1;
        settings.tasks.poll_interval_ms = 10;
        settings.tasks.retry_delay_ms = 10;
        settings.scheduler.publish_interval_secs = 0;
        settings
    }

    async fn reload_server() -> (String, Captured) {
        let seen: Captured = Arc::default();
        let base = serve(
            Router::new()
                .route("/-/reload", post(count_reload))
                .with_state(seen.clone()),
        )
        .await;
        (base, seen)
    }

    #[tokio::test]
    async fn test_write_rules_publishes_and_reloads() {
        let pool = setup_test_db().await;
        let dir = tempfile::tempdir().unwrap();
        let (base, reloads) = reload_server().await;
        let settings = Arc::new(settings(dir.path(), &base));

        let queue = Arc::new(TaskQueue::new(
            Arc::new(SqlxTaskRepository::new(pool.clone())),
            TaskQueueConfig::default(),
        ));
        let renderer = Arc::new(ConfigRenderer::new(
            Arc::new(SqlxTargetRepository::new(pool.clone())),
            Arc::new(SqlxRuleRepository::new(pool.clone())),
        ));
        let reload = Arc::new(ReloadTrigger::new(
            client(),
            &base,
            ReloadEventBroadcaster::new(),
        ));
        let publish = PublishService::new(
            settings.clone(),
            renderer,
            reload,
            None,
            Arc::new(SqlxTargetRepository::new(pool.clone())),
            queue.clone(),
        );

        publish.write_rules(None, true, None).await.unwrap();
        let written = std::fs::read_to_string(&settings.prometheus.rules).unwrap();
        assert!(written.contains("groups"));
        assert_eq!(reloads.lock().len(), 1);

        publish.write_config(None, false, None).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&settings.prometheus.targets).unwrap(),
            "[]"
        );
        assert_eq!(reloads.lock().len(), 1);

        // No registered servers: fall back to this host's queue.
        assert_eq!(publish.schedule(None).await.unwrap(), 1);
        assert_eq!(queue.count("prom-test", TaskStatus::Pending).await.unwrap(), 3);
        // An unknown shard targets nothing.
        assert_eq!(publish.schedule(Some("nowhere")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remote_rule_error_skips_reload() {
        let pool = setup_test_db().await;
        let dir = tempfile::tempdir().unwrap();
        let (base, reloads) = reload_server().await;
        let mut settings = settings(dir.path(), &base);
        settings.prometheus.rules_backend = RulesBackend::Kubernetes;
        let settings = Arc::new(settings);

        let api_calls: Captured = Arc::default();
        let api = serve(
            Router::new()
                .fallback(|State(seen): State<Captured>| async move {
                    seen.lock().push(Value::Null);
                    (StatusCode::INTERNAL_SERVER_ERROR, "etcdserver: request timed out")
                })
                .with_state(api_calls.clone()),
        )
        .await;
        let kube = Arc::new(KubeClient::new(client(), &api, None));

        let rules = Arc::new(SqlxRuleRepository::new(pool.clone()));
        let renderer = Arc::new(ConfigRenderer::new(
            Arc::new(SqlxTargetRepository::new(pool.clone())),
            rules,
        ));
        let (service, _) = SqlxEntityRepository::new(pool.clone())
            .get_or_create_service("shop")
            .await
            .unwrap();
        let doc = RuleFile::from_yaml(
            "groups:\n  - name: shop\n    rules:\n      - alert: ShopDown\n        expr: up == 0\n",
        )
        .unwrap();
        renderer
            .import_rules(&doc, &OwnerRef::service(service.id), RuleSource::Prometheus)
            .await
            .unwrap();

        let publish = PublishService::new(
            settings.clone(),
            renderer,
            Arc::new(ReloadTrigger::new(client(), &base, ReloadEventBroadcaster::new())),
            Some(Arc::new(RuleObjectPublisher::new(
                kube,
                "monitoring",
                "promkeeper",
                "promkeeper",
            ))),
            Arc::new(SqlxTargetRepository::new(pool.clone())),
            Arc::new(TaskQueue::new(
                Arc::new(SqlxTaskRepository::new(pool.clone())),
                TaskQueueConfig::default(),
            )),
        );

        let err = publish.write_rules(None, true, None).await.unwrap_err();
        assert!(matches!(err, Error::RemoteApi { status: 500, .. }));
        assert_eq!(api_calls.lock().len(), 1);
        assert!(reloads.lock().is_empty());
    }

    #[tokio::test]
    async fn test_container_runs_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let (base, reloads) = reload_server().await;
        let settings = Arc::new(settings(dir.path(), &base));
        let pool = setup_test_db().await;

        let container = ServiceContainer::new(pool.clone(), settings.clone())
            .await
            .unwrap();
        assert_eq!(
            container.queue_names(),
            vec![DEFAULT_QUEUE.to_string(), "prom-test".to_string()]
        );
        assert!(container.reconcilers().is_empty());

        container.initialize().await.unwrap();

        // Startup publish: three artifacts, each followed by a reload.
        tokio::time::timeout(Duration::from_secs(10), async {
            while reloads.lock().len() < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("startup publish should complete");
        assert!(settings.prometheus.targets.exists());
        assert!(settings.prometheus.blackbox.exists());
        assert!(settings.prometheus.rules.exists());

        let alert_id = container
            .alerts
            .ingest(json!({"status": "firing", "commonLabels": {"severity": "page"}}))
            .await
            .unwrap();

        // The alert has no routable entity; only its labels get indexed.
        let alerts = SqlxAlertRepository::new(pool.clone());
        tokio::time::timeout(Duration::from_secs(10), async {
            while alerts.list_labels(alert_id).await.unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("alert labels should be indexed");

        assert!(container.alerts.ingest(json!([1, 2])).await.is_err());

        container
            .shutdown_with_timeout(Duration::from_secs(5))
            .await
            .unwrap();
        assert!(container.is_shutting_down());
    }
}
