use std::path::Path;

use intentshell_sentinel::RiskLevel;
use serde::{Deserialize, Serialize};

fn default_audit_destination() -> String {
    "stdout".into()
}

/// Audit log settings. `destination` is `stdout` or a file path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_audit_destination")]
    pub destination: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            destination: default_audit_destination(),
        }
    }
}

#[derive(Debug)]
pub struct AuditLogger {
    destination: AuditDestination,
}

#[derive(Debug)]
enum AuditDestination {
    Stdout,
    File(tokio::sync::Mutex<tokio::fs::File>),
}

/// One JSON line of the audit log.
#[derive(Debug, Serialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub description: String,
    pub intent: String,
    pub command: String,
    pub risk: RiskLevel,
    pub score: f64,
    pub result: AuditResult,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum AuditResult {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "failure")]
    Failure { output: String },
    #[serde(rename = "refused")]
    Refused { reason: String },
    #[serde(rename = "suspended")]
    Suspended { score: f64 },
}

impl AuditEntry {
    #[must_use]
    pub fn new(
        description: impl Into<String>,
        intent: impl Into<String>,
        command: impl Into<String>,
        risk: RiskLevel,
        score: f64,
        result: AuditResult,
    ) -> Self {
        Self {
            timestamp: unix_now(),
            description: description.into(),
            intent: intent.into(),
            command: command.into(),
            risk,
            score,
            result,
        }
    }
}

fn unix_now() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{secs}")
}

impl AuditLogger {
    /// Create a new `AuditLogger` from config.
    ///
    /// # Errors
    ///
    /// Returns an error if a file destination cannot be opened.
    pub async fn from_config(config: &AuditConfig) -> Result<Self, std::io::Error> {
        let destination = if config.destination == "stdout" {
            AuditDestination::Stdout
        } else {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(Path::new(&config.destination))
                .await?;
            AuditDestination::File(tokio::sync::Mutex::new(file))
        };

        Ok(Self { destination })
    }

    pub async fn log(&self, entry: &AuditEntry) {
        let Ok(json) = serde_json::to_string(entry) else {
            return;
        };

        match &self.destination {
            AuditDestination::Stdout => {
                tracing::info!(target: "audit", "{json}");
            }
            AuditDestination::File(file) => {
                use tokio::io::AsyncWriteExt;
                let mut f = file.lock().await;
                let line = format!("{json}\n");
                if let Err(e) = f.write_all(line.as_bytes()).await {
                    tracing::error!("failed to write audit log: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(result: AuditResult) -> AuditEntry {
        AuditEntry {
            timestamp: "0".into(),
            description: "Delete temp files".into(),
            intent: "file_delete".into(),
            command: "Remove-Item $env:TEMP\\*".into(),
            risk: RiskLevel::High,
            score: 1.0,
            result,
        }
    }

    #[test]
    fn success_serialization() {
        let json = serde_json::to_string(&entry(AuditResult::Success)).unwrap();
        assert!(json.contains("\"type\":\"success\""));
        assert!(json.contains("\"intent\":\"file_delete\""));
        assert!(json.contains("\"risk\":\"high\""));
    }

    #[test]
    fn failure_serialization() {
        let json = serde_json::to_string(&entry(AuditResult::Failure {
            output: "Execution Failed: access denied".into(),
        }))
        .unwrap();
        assert!(json.contains("\"type\":\"failure\""));
        assert!(json.contains("access denied"));
    }

    #[test]
    fn refused_and_suspended_serialization() {
        let json = serde_json::to_string(&entry(AuditResult::Refused {
            reason: "Session Suspended".into(),
        }))
        .unwrap();
        assert!(json.contains("\"type\":\"refused\""));
        assert!(json.contains("\"reason\":\"Session Suspended\""));

        let json = serde_json::to_string(&entry(AuditResult::Suspended { score: 6.0 })).unwrap();
        assert!(json.contains("\"type\":\"suspended\""));
        assert!(json.contains("\"score\":6.0"));
    }

    #[test]
    fn new_stamps_current_time() {
        let e = AuditEntry::new("x", "list", "ls", RiskLevel::Low, 0.0, AuditResult::Success);
        let secs: u64 = e.timestamp.parse().unwrap();
        assert!(secs > 0);
    }

    #[test]
    fn config_defaults() {
        let config = AuditConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.destination, "stdout");
    }

    #[tokio::test]
    async fn logger_stdout() {
        let logger = AuditLogger::from_config(&AuditConfig {
            enabled: true,
            destination: "stdout".into(),
        })
        .await
        .unwrap();
        logger.log(&entry(AuditResult::Success)).await;
    }

    #[tokio::test]
    async fn logger_file_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let config = AuditConfig {
            enabled: true,
            destination: path.display().to_string(),
        };
        let logger = AuditLogger::from_config(&config).await.unwrap();
        for _ in 0..3 {
            logger.log(&entry(AuditResult::Success)).await;
        }

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.contains("\"description\":\"Delete temp files\""));
    }

    #[tokio::test]
    async fn unopenable_destination_is_error() {
        let config = AuditConfig {
            enabled: true,
            destination: "/nonexistent/dir/audit.log".into(),
        };
        assert!(AuditLogger::from_config(&config).await.is_err());
    }
}
