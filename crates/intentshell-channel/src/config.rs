use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;

fn default_read_timeout() -> u64 {
    20
}

fn default_bring_up_timeout() -> u64 {
    60
}

fn default_queue_capacity() -> usize {
    1024
}

/// Interpreter process settings: which program to run, how long to wait for
/// responses, and what to run after every spawn.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub dialect: Dialect,
    /// Interpreter program. Falls back to the dialect default.
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_bring_up_timeout")]
    pub bring_up_timeout_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Script run after the dialect preamble on every spawn, typically module
    /// imports that define the collaborator commands.
    #[serde(default)]
    pub bring_up_script: String,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            program: None,
            args: None,
            read_timeout_secs: default_read_timeout(),
            bring_up_timeout_secs: default_bring_up_timeout(),
            queue_capacity: default_queue_capacity(),
            bring_up_script: String::new(),
            working_dir: None,
        }
    }
}

impl ChannelConfig {
    #[must_use]
    pub fn for_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn program(&self) -> &str {
        self.program
            .as_deref()
            .unwrap_or_else(|| self.dialect.default_program())
    }

    #[must_use]
    pub fn args(&self) -> Vec<String> {
        match &self.args {
            Some(args) => args.clone(),
            None => self
                .dialect
                .default_args()
                .iter()
                .map(|a| (*a).to_owned())
                .collect(),
        }
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    #[must_use]
    pub fn bring_up_timeout(&self) -> Duration {
        Duration::from_secs(self.bring_up_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.dialect, Dialect::PowerShell);
        assert_eq!(config.program(), "pwsh");
        assert_eq!(config.read_timeout(), Duration::from_secs(20));
        assert_eq!(config.bring_up_timeout(), Duration::from_secs(60));
        assert_eq!(config.args().last().map(String::as_str), Some("-"));
    }

    #[test]
    fn explicit_program_and_args_win() {
        let config = ChannelConfig {
            program: Some("/usr/local/bin/pwsh-preview".into()),
            args: Some(vec!["-NoLogo".into()]),
            ..ChannelConfig::default()
        };
        assert_eq!(config.program(), "/usr/local/bin/pwsh-preview");
        assert_eq!(config.args(), vec!["-NoLogo"]);
    }

    #[test]
    fn deserialize_partial() {
        let config: ChannelConfig = toml::from_str(
            r#"
            dialect = "posix"
            read_timeout_secs = 5
            bring_up_script = "source ./kernel.sh"
            "#,
        )
        .unwrap();
        assert_eq!(config.dialect, Dialect::Posix);
        assert_eq!(config.program(), "bash");
        assert_eq!(config.read_timeout_secs, 5);
        assert_eq!(config.bring_up_timeout_secs, 60);
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.bring_up_script, "source ./kernel.sh");
    }
}
