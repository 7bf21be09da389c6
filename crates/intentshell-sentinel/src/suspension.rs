//! Session risk accumulator and suspension state machine.
//!
//! Low and medium events decay the score, high events add a weighted amount.
//! Crossing the threshold suspends high-risk execution for a fixed window,
//! after which the state clears itself on the next [`RiskSuspensionEngine::is_suspended`]
//! call.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::anti_pattern::{Detection, DetectionKind};
use crate::classifier::{DestructivenessClassifier, Severity};
use crate::risk::RiskLevel;

fn default_decay_factor() -> f64 {
    0.85
}

fn default_decay_flat() -> f64 {
    0.5
}

fn default_suspicion_penalty() -> f64 {
    2.0
}

fn default_obfuscation_penalty() -> f64 {
    1.0
}

fn default_chaining_penalty() -> f64 {
    1.0
}

fn default_safe_context_weight() -> f64 {
    1.0
}

fn default_inertia_multiplier() -> f64 {
    0.2
}

fn default_inertia_ceiling() -> f64 {
    2.0
}

fn default_threshold() -> f64 {
    5.0
}

fn default_duration_secs() -> u64 {
    600
}

fn default_warning_margin() -> f64 {
    2.0
}

/// Tunable constants of the suspension engine.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SuspensionPolicy {
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,
    #[serde(default = "default_decay_flat")]
    pub decay_flat: f64,
    #[serde(default = "default_suspicion_penalty")]
    pub suspicion_penalty: f64,
    #[serde(default = "default_obfuscation_penalty")]
    pub obfuscation_penalty: f64,
    #[serde(default = "default_chaining_penalty")]
    pub chaining_penalty: f64,
    /// Weight of a critical command confined to the working directory.
    #[serde(default = "default_safe_context_weight")]
    pub safe_context_weight: f64,
    #[serde(default = "default_inertia_multiplier")]
    pub inertia_multiplier: f64,
    /// Repeated intents are only dampened while their weight stays below this.
    #[serde(default = "default_inertia_ceiling")]
    pub inertia_ceiling: f64,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    #[serde(default = "default_warning_margin")]
    pub warning_margin: f64,
}

impl Default for SuspensionPolicy {
    fn default() -> Self {
        Self {
            decay_factor: default_decay_factor(),
            decay_flat: default_decay_flat(),
            suspicion_penalty: default_suspicion_penalty(),
            obfuscation_penalty: default_obfuscation_penalty(),
            chaining_penalty: default_chaining_penalty(),
            safe_context_weight: default_safe_context_weight(),
            inertia_multiplier: default_inertia_multiplier(),
            inertia_ceiling: default_inertia_ceiling(),
            threshold: default_threshold(),
            duration_secs: default_duration_secs(),
            warning_margin: default_warning_margin(),
        }
    }
}

impl SuspensionPolicy {
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// One decay step for a non-destructive event.
    #[must_use]
    pub fn decay(&self, score: f64) -> f64 {
        (score * self.decay_factor - self.decay_flat).max(0.0)
    }
}

/// Mutable per-session state. Only the engine writes it.
#[derive(Debug, Clone, Default)]
pub struct SuspensionState {
    pub cumulative_risk_score: f64,
    pub suspended_since: Option<Instant>,
    pub last_intent_type: Option<String>,
    pub reasons: Vec<String>,
}

impl SuspensionState {
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.suspended_since.is_some()
    }
}

static DRIVE_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z]:[\\/]").unwrap());

static BARE_DRIVE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z]:$").unwrap());

// Parameters whose value names a whole volume or disk, never a path.
const VOLUME_PARAMETERS: &[&str] = &[
    "-driveletter",
    "-disknumber",
    "-partitionnumber",
    "-volume",
    "-diskpath",
    "-filesystemlabel",
];

static SYSTEM_DIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(/|[a-z]:/?|/(etc|boot|usr|bin|sbin|lib|lib64|sys|proc|dev|var/lib)(/.*)?)$|windows|system32|program files",
    )
    .unwrap()
});

fn comparable(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let trimmed = if unified.len() > 1 {
        unified.trim_end_matches('/').to_owned()
    } else {
        unified
    };
    if DRIVE_PATH.is_match(path) || path.starts_with("\\\\") {
        trimmed.to_lowercase()
    } else {
        trimmed
    }
}

fn is_absolute_token(token: &str) -> bool {
    let lowered = token.to_lowercase();
    DRIVE_PATH.is_match(token)
        || BARE_DRIVE.is_match(token)
        || token.starts_with("\\\\")
        || token.starts_with('/')
        || token.starts_with('~')
        || lowered.starts_with("$home")
        || lowered.starts_with("$env:")
}

fn is_volume_parameter(token: &str) -> bool {
    let name = token.split(':').next().unwrap_or(token).to_lowercase();
    VOLUME_PARAMETERS.contains(&name.as_str())
}

/// The token itself plus the value of `key=value` and `-Param:value` forms.
fn path_candidates(token: &str) -> impl Iterator<Item = &str> {
    let value = if token.starts_with('-') && token.contains(':') {
        token.split_once(':').map(|(_, v)| v)
    } else {
        token.split_once('=').map(|(_, v)| v)
    };
    std::iter::once(token).chain(value.filter(|v| !v.is_empty()))
}

fn escapes_upward(token: &str) -> bool {
    token.replace('\\', "/").split('/').any(|seg| seg == "..")
}

fn within(token: &str, root: &str) -> bool {
    let token = comparable(token);
    token == root || (token.starts_with(root) && token[root.len()..].starts_with('/'))
}

fn path_tokens(command: &str) -> impl Iterator<Item = &str> {
    command
        .split_whitespace()
        .map(|t| t.trim_matches(|c| matches!(c, '\'' | '"' | ',' | ';' | '(' | ')')))
        .filter(|t| !t.is_empty())
}

/// Per-session engine. Owns its state and the working directory used for
/// context dampening.
#[derive(Debug, Clone)]
pub struct RiskSuspensionEngine {
    policy: SuspensionPolicy,
    working_dir: PathBuf,
    state: SuspensionState,
}

impl RiskSuspensionEngine {
    #[must_use]
    pub fn new(policy: SuspensionPolicy, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            policy,
            working_dir: working_dir.into(),
            state: SuspensionState::default(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &SuspensionPolicy {
        &self.policy
    }

    #[must_use]
    pub fn state(&self) -> &SuspensionState {
        &self.state
    }

    #[must_use]
    pub fn score(&self) -> f64 {
        self.state.cumulative_risk_score
    }

    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// True when every path the command names stays inside the working
    /// directory and the working directory itself is not a system location.
    #[must_use]
    pub fn is_safe_context(&self, command: &str) -> bool {
        let cwd = self.working_dir.to_string_lossy();
        let root = comparable(&cwd);
        if SYSTEM_DIR.is_match(&root) {
            return false;
        }
        path_tokens(command).all(|token| {
            if is_volume_parameter(token) {
                return false;
            }
            path_candidates(token).all(|candidate| {
                !escapes_upward(candidate)
                    && (!is_absolute_token(candidate) || within(candidate, &root))
            })
        })
    }

    /// Fold one assessed event into the session score.
    ///
    /// Returns `true` when this event moved the engine into suspension.
    pub fn record_risk(
        &mut self,
        level: RiskLevel,
        command: &str,
        intent_type: &str,
        detections: &[Detection],
    ) -> bool {
        if !level.is_destructive() {
            self.state.cumulative_risk_score = self.policy.decay(self.state.cumulative_risk_score);
            tracing::debug!(
                score = self.state.cumulative_risk_score,
                "risk decayed after non-destructive event"
            );
            return false;
        }

        let classification = DestructivenessClassifier::classify(command);
        let mut label = classification.label;
        let mut weight = classification.weight;

        if classification.severity == Severity::Critical && self.is_safe_context(command) {
            weight = self.policy.safe_context_weight;
            label.push_str(" (Safe Context)");
        }

        if !detections.is_empty() {
            weight += self.policy.suspicion_penalty;
            if detections.iter().any(|d| d.kind == DetectionKind::Obfuscation) {
                weight += self.policy.obfuscation_penalty;
            }
            if detections.iter().any(|d| d.kind == DetectionKind::Chaining) {
                weight += self.policy.chaining_penalty;
            }
        }

        if self.state.last_intent_type.as_deref() == Some(intent_type)
            && weight < self.policy.inertia_ceiling
        {
            weight *= self.policy.inertia_multiplier;
        }

        self.state.cumulative_risk_score += weight;
        self.state.last_intent_type = Some(intent_type.to_owned());
        self.state.reasons.push(format!("{label} (Weight: {weight:.2})"));

        tracing::info!(
            %level,
            intent_type,
            weight,
            score = self.state.cumulative_risk_score,
            "risk recorded"
        );

        if self.state.cumulative_risk_score >= self.policy.threshold
            && self.state.suspended_since.is_none()
        {
            self.state.suspended_since = Some(Instant::now());
            tracing::warn!(
                score = self.state.cumulative_risk_score,
                threshold = self.policy.threshold,
                "session suspended"
            );
            return true;
        }
        false
    }

    /// Current macro-state. An expired suspension is cleared here.
    pub fn is_suspended(&mut self) -> bool {
        self.is_suspended_at(Instant::now())
    }

    /// [`Self::is_suspended`] evaluated against an explicit clock reading.
    pub fn is_suspended_at(&mut self, now: Instant) -> bool {
        if let Some(since) = self.state.suspended_since
            && now.saturating_duration_since(since) > self.policy.duration()
        {
            tracing::info!("suspension expired, session risk reset");
            self.reset();
        }
        self.state.is_suspended()
    }

    /// Advisory shown while the score sits just below the threshold.
    #[must_use]
    pub fn get_warning(&self) -> Option<String> {
        let score = self.state.cumulative_risk_score;
        let threshold = self.policy.threshold;
        if !self.state.is_suspended() && score >= threshold - self.policy.warning_margin && score > 0.0
        {
            Some(format!(
                "Forgiveness Window Active: High Risk (Score: {score:.1}/{threshold:.1}). Run safe commands to lower risk."
            ))
        } else {
            None
        }
    }

    #[must_use]
    pub fn remaining_at(&self, now: Instant) -> Option<Duration> {
        self.state.suspended_since.map(|since| {
            self.policy
                .duration()
                .saturating_sub(now.saturating_duration_since(since))
        })
    }

    /// Reason log plus remaining time. Empty while not suspended.
    #[must_use]
    pub fn get_suspension_details(&self) -> Vec<String> {
        self.get_suspension_details_at(Instant::now())
    }

    #[must_use]
    pub fn get_suspension_details_at(&self, now: Instant) -> Vec<String> {
        let Some(remaining) = self.remaining_at(now) else {
            return Vec::new();
        };
        let secs = remaining.as_secs();
        let mut details = self.state.reasons.clone();
        details.push(format!("Suspension lifts in: {}m {}s", secs / 60, secs % 60));
        details.push("Alternatively: Restart IntentShell to reset immediately.".to_owned());
        details
    }

    pub fn reset(&mut self) {
        self.state = SuspensionState::default();
    }
}
