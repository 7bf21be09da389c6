use std::path::PathBuf;

use intentshell_channel::Dialect;

use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_channel();
        self.apply_env_overrides_policy();
    }

    fn apply_env_overrides_channel(&mut self) {
        if let Ok(v) = std::env::var("INTENTSHELL_READ_TIMEOUT") {
            match v.parse::<u64>() {
                Ok(secs) => self.channel.read_timeout_secs = secs,
                Err(_) => tracing::warn!("ignoring invalid INTENTSHELL_READ_TIMEOUT value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("INTENTSHELL_BRING_UP_TIMEOUT") {
            match v.parse::<u64>() {
                Ok(secs) => self.channel.bring_up_timeout_secs = secs,
                Err(_) => {
                    tracing::warn!("ignoring invalid INTENTSHELL_BRING_UP_TIMEOUT value: {v}");
                }
            }
        }
        if let Ok(v) = std::env::var("INTENTSHELL_DIALECT") {
            if let Some(dialect) = Dialect::parse(&v) {
                self.channel.dialect = dialect;
            } else {
                tracing::warn!("ignoring invalid INTENTSHELL_DIALECT value: {v}");
            }
        }
        if let Ok(v) = std::env::var("INTENTSHELL_INTERPRETER")
            && !v.trim().is_empty()
        {
            self.channel.program = Some(v);
        }
    }

    fn apply_env_overrides_policy(&mut self) {
        if let Ok(v) = std::env::var("INTENTSHELL_SUSPENSION_THRESHOLD") {
            match v.parse::<f64>() {
                Ok(threshold) => self.suspension.threshold = threshold,
                Err(_) => {
                    tracing::warn!("ignoring invalid INTENTSHELL_SUSPENSION_THRESHOLD value: {v}");
                }
            }
        }
        if let Ok(v) = std::env::var("INTENTSHELL_SUSPENSION_DURATION") {
            match v.parse::<u64>() {
                Ok(secs) => self.suspension.duration_secs = secs,
                Err(_) => {
                    tracing::warn!("ignoring invalid INTENTSHELL_SUSPENSION_DURATION value: {v}");
                }
            }
        }
        if let Ok(v) = std::env::var("INTENTSHELL_CACHE_PATH") {
            self.cache.path = if v.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(v))
            };
        }
        if let Ok(v) = std::env::var("INTENTSHELL_LEARNING_FREEZE")
            && let Ok(frozen) = v.parse::<bool>()
        {
            self.cache.learning_freeze = frozen;
        }
        if let Ok(v) = std::env::var("INTENTSHELL_AUDIT_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.audit.enabled = enabled;
        }
        if let Ok(v) = std::env::var("INTENTSHELL_AUDIT_DESTINATION") {
            self.audit.destination = v;
        }
    }
}
