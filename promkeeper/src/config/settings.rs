//! Process-wide settings.
//!
//! Settings are assembled once at startup (YAML file + environment overrides)
//! and handed to each component as an `Arc<Settings>`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Error, Result};

/// Environment variable naming the settings file.
pub const CONFIG_PATH_ENV: &str = "PROMKEEPER_CONFIG";

/// Settings file used when `PROMKEEPER_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "promkeeper.yml";

/// Label this system stamps on remote objects it manages.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Where rendered rule files are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulesBackend {
    /// Atomic write to `prometheus.rules`.
    #[default]
    File,
    /// Create-or-replace PrometheusRule objects in the cluster.
    Kubernetes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite database URL.
    pub database_url: String,
    /// Base URL used for links written into alert annotations.
    pub external_url: String,
    pub logging: LoggingSettings,
    pub alertmanager: AlertmanagerSettings,
    pub prometheus: PrometheusSettings,
    pub kubernetes: KubernetesSettings,
    pub drivers: DriverSettings,
    pub tasks: TaskSettings,
    pub scheduler: SchedulerSettings,
    pub reconcile: ReconcileSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite:promkeeper.db?mode=rwc".to_string(),
            external_url: "http://localhost:8000".to_string(),
            logging: LoggingSettings::default(),
            alertmanager: AlertmanagerSettings::default(),
            prometheus: PrometheusSettings::default(),
            kubernetes: KubernetesSettings::default(),
            drivers: DriverSettings::default(),
            tasks: TaskSettings::default(),
            scheduler: SchedulerSettings::default(),
            reconcile: ReconcileSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub dir: String,
    /// Filter directive; `RUST_LOG` wins when set.
    pub filter: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertmanagerSettings {
    /// Label name -> values that cause an alert to be discarded.
    pub blacklist: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusSettings {
    /// Base URL of the Prometheus instance that receives reload requests.
    pub url: String,
    /// file_sd target file.
    pub targets: PathBuf,
    /// Blackbox probe target file.
    pub blackbox: PathBuf,
    /// Rule file.
    pub rules: PathBuf,
    pub rules_backend: RulesBackend,
    /// Octal permission bits applied to published files.
    pub file_mode: String,
    pub reload_timeout_secs: u64,
}

impl Default for PrometheusSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:9090".to_string(),
            targets: PathBuf::from("/etc/prometheus/promkeeper.json"),
            blackbox: PathBuf::from("/etc/prometheus/blackbox.json"),
            rules: PathBuf::from("/etc/prometheus/promkeeper.rule.yml"),
            rules_backend: RulesBackend::File,
            file_mode: "0644".to_string(),
            reload_timeout_secs: 30,
        }
    }
}

impl PrometheusSettings {
    /// Parsed permission bits for published files.
    pub fn file_mode(&self) -> Result<u32> {
        parse_mode(&self.file_mode)
    }
}

/// Parse an octal mode string such as `0644` or `0o600`.
pub fn parse_mode(raw: &str) -> Result<u32> {
    let digits = raw.trim().trim_start_matches("0o");
    let mode = u32::from_str_radix(digits, 8)
        .map_err(|e| Error::config(format!("Invalid file mode '{}': {}", raw, e)))?;
    if mode > 0o7777 {
        return Err(Error::config(format!("File mode out of range: {}", raw)));
    }
    Ok(mode)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesSettings {
    /// Whether the rule watchers run.
    pub watch_enabled: bool,
    /// API server base URL.
    pub api_url: String,
    pub namespace: String,
    /// Bearer token; read from `token_path` when unset.
    pub token: Option<String>,
    pub token_path: PathBuf,
    /// Value of the managed-by label stamped on objects we own.
    pub ownership_marker: String,
    /// Prefix of the PrometheusRule objects created by the publisher.
    pub object_prefix: String,
    /// Label selector for rule ConfigMaps.
    pub configmap_selector: String,
    pub timeout_secs: u64,
}

impl Default for KubernetesSettings {
    fn default() -> Self {
        Self {
            watch_enabled: false,
            api_url: "https://kubernetes.default.svc".to_string(),
            namespace: "default".to_string(),
            token: None,
            token_path: PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/token"),
            ownership_marker: "promkeeper".to_string(),
            object_prefix: "promkeeper".to_string(),
            configmap_selector: "loki_rule=1".to_string(),
            timeout_secs: 30,
        }
    }
}

impl KubernetesSettings {
    /// Resolve the bearer token, falling back to the service account file.
    pub fn resolve_token(&self) -> Option<String> {
        if let Some(token) = self.token.as_ref().filter(|t| !t.is_empty()) {
            return Some(token.clone());
        }
        match std::fs::read_to_string(&self.token_path) {
            Ok(token) => Some(token.trim().to_string()),
            Err(e) => {
                debug!(path = %self.token_path.display(), error = %e, "No service account token");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    pub timeout_secs: u64,
    pub telegram_bot_token: Option<String>,
    pub discord_username: Option<String>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            telegram_bot_token: None,
            discord_username: Some("promkeeper".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSettings {
    /// Workers per consumed queue.
    pub workers: usize,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub poll_interval_ms: u64,
    /// Queue name of this host; defaults to the system host name.
    pub host_queue: Option<String>,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 5,
            retry_delay_ms: 2_000,
            poll_interval_ms: 500,
            host_queue: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Interval of the periodic publish of all artifacts; 0 disables it.
    pub publish_interval_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            publish_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
        }
    }
}

impl Settings {
    /// Load settings from the file named by `PROMKEEPER_CONFIG` (optional)
    /// and apply environment overrides.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let mut settings = Self::from_file_if_exists(Path::new(&path))?;
        settings.apply_env_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Read a YAML settings file, returning defaults when it does not exist.
    pub fn from_file_if_exists(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Settings file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::io_path("reading settings", path, e))?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = lookup("PROMKEEPER_PROMETHEUS_URL") {
            self.prometheus.url = v;
        }
        if let Some(v) = lookup("PROMKEEPER_LOG_DIR") {
            self.logging.dir = v;
        }
        if let Some(v) = lookup("PROMKEEPER_HOST_QUEUE") {
            self.tasks.host_queue = Some(v);
        }
        if let Some(v) = lookup("PROMKEEPER_K8S_TOKEN") {
            self.kubernetes.token = Some(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.prometheus.file_mode()?;
        if self.tasks.workers == 0 {
            return Err(Error::config("tasks.workers must be at least 1"));
        }
        if self.tasks.max_attempts == 0 {
            return Err(Error::config("tasks.max_attempts must be at least 1"));
        }
        url::Url::parse(&self.prometheus.url)
            .map_err(|e| Error::config(format!("Invalid prometheus.url: {}", e)))?;
        Ok(())
    }

    /// Name of the task queue bound to this host.
    pub fn host_queue(&self) -> String {
        if let Some(queue) = self.tasks.host_queue.as_ref().filter(|q| !q.is_empty()) {
            return queue.clone();
        }
        sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.prometheus.file_mode().unwrap(), 0o644);
        assert_eq!(settings.prometheus.rules_backend, RulesBackend::File);
        assert!(settings.alertmanager.blacklist.is_empty());
    }

    #[test]
    fn test_from_yaml_partial() {
        let settings = Settings::from_yaml_str(
            r#"
alertmanager:
  blacklist:
    severity: [info, debug]
prometheus:
  url: http://prom:9090
  rules_backend: kubernetes
  file_mode: "0600"
tasks:
  host_queue: prom-01
"#,
        )
        .unwrap();

        let values = &settings.alertmanager.blacklist["severity"];
        assert!(values.contains("info"));
        assert!(values.contains("debug"));
        assert_eq!(settings.prometheus.url, "http://prom:9090");
        assert_eq!(settings.prometheus.rules_backend, RulesBackend::Kubernetes);
        assert_eq!(settings.prometheus.file_mode().unwrap(), 0o600);
        assert_eq!(settings.host_queue(), "prom-01");
        // Untouched sections keep their defaults.
        assert_eq!(settings.tasks.workers, 4);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let settings = Settings::from_yaml_str("   \n").unwrap();
        assert_eq!(settings.database_url, Settings::default().database_url);
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(|key| match key {
            "DATABASE_URL" => Some("sqlite::memory:".to_string()),
            "PROMKEEPER_HOST_QUEUE" => Some("prom-02".to_string()),
            _ => None,
        });
        assert_eq!(settings.database_url, "sqlite::memory:");
        assert_eq!(settings.host_queue(), "prom-02");
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("644").unwrap(), 0o644);
        assert_eq!(parse_mode("0o755").unwrap(), 0o755);
        assert!(parse_mode("999").is_err());
        assert!(parse_mode("17777").is_err());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut settings = Settings::default();
        settings.tasks.workers = 0;
        assert!(settings.validate().is_err());
    }
}
