mod env;


use std::path::Path;

use anyhow::{Context, bail};
use intentshell_channel::ChannelConfig;
use intentshell_sentinel::SuspensionPolicy;
use serde::{Deserialize, Serialize};

pub use crate::audit::AuditConfig;
pub use crate::cache::CacheConfig;
pub use crate::kernel::KernelCommands;

/// Top-level settings, one table per concern.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub suspension: SuspensionPolicy,
    #[serde(default)]
    pub kernel: KernelCommands,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

fn is_command_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.channel.read_timeout_secs == 0 {
            bail!("channel.read_timeout_secs must be positive");
        }
        if self.channel.bring_up_timeout_secs == 0 {
            bail!("channel.bring_up_timeout_secs must be positive");
        }
        if self.channel.queue_capacity == 0 {
            bail!("channel.queue_capacity must be positive");
        }

        let policy = &self.suspension;
        if !(policy.threshold.is_finite() && policy.threshold > 0.0) {
            bail!("suspension.threshold must be a positive number");
        }
        if policy.duration_secs == 0 {
            bail!("suspension.duration_secs must be positive");
        }
        if !(0.0..=1.0).contains(&policy.decay_factor) {
            bail!("suspension.decay_factor must be within 0.0..=1.0");
        }
        if policy.decay_flat < 0.0 {
            bail!("suspension.decay_flat must not be negative");
        }

        if let Some(name) = self.kernel.configured().find(|n| !is_command_name(n)) {
            bail!("kernel command name {name:?} may only contain letters, digits, '_', '-' and '.'");
        }
        Ok(())
    }
}
