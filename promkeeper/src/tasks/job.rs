//! Job definitions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A unit of background work. Serialized as the task payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "job", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Job {
    /// Route a stored alert.
    ProcessAlert { alert_id: i64 },
    /// Index an alert's common labels.
    IndexAlert { alert_id: i64 },
    /// Deliver one payload to one (driver, target).
    SendAlert {
        driver: String,
        target: String,
        payload: Value,
        alert_id: Option<i64>,
    },
    WriteConfig {
        #[serde(default)]
        path: Option<PathBuf>,
        reload: bool,
    },
    WriteUrls {
        #[serde(default)]
        path: Option<PathBuf>,
        reload: bool,
    },
    WriteRules {
        #[serde(default)]
        path: Option<PathBuf>,
        reload: bool,
    },
    ReloadPrometheus,
}

impl Job {
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_names() {
        assert_eq!(Job::ProcessAlert { alert_id: 1 }.name(), "process_alert");
        assert_eq!(Job::ReloadPrometheus.name(), "reload_prometheus");
    }

    #[test]
    fn test_job_wire_format() {
        let job = Job::SendAlert {
            driver: "webhook".to_string(),
            target: "http://hook".to_string(),
            payload: json!({"status": "firing"}),
            alert_id: Some(3),
        };
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["job"], "send_alert");
        assert_eq!(value["alert_id"], 3);

        let parsed: Job =
            serde_json::from_value(json!({"job": "write_rules", "reload": true})).unwrap();
        assert_eq!(
            parsed,
            Job::WriteRules {
                path: None,
                reload: true
            }
        );
    }
}
