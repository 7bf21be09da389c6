use serde::{Deserialize, Serialize};

/// Ordinal severity attached to an intent or a candidate command.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskLevel {
    /// Parse a level label, case-insensitively.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "very_high" | "very-high" => Some(Self::VeryHigh),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Like [`Self::parse`], but unknown labels map to `Low`, matching the
    /// collaborator contract where an absent level means "nothing to report".
    #[must_use]
    pub fn parse_lenient(label: &str) -> Self {
        Self::parse(label).unwrap_or_default()
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }

    /// `High` and above count as destructive for the suspension engine.
    #[must_use]
    pub fn is_destructive(self) -> bool {
        self >= Self::High
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score assigned to verdicts that were not produced by the collaborator
/// (transport failures, suspension refusals).
pub const FAIL_SAFE_SCORE: f64 = 100.0;

/// Result of one risk assessment call.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub score: f64,
}

impl RiskAssessment {
    #[must_use]
    pub fn new(level: RiskLevel, reasons: Vec<String>, score: f64) -> Self {
        Self {
            level,
            reasons,
            score,
        }
    }

    /// Degraded verdict used whenever the assessment itself could not be completed.
    #[must_use]
    pub fn fail_safe(reason: impl Into<String>) -> Self {
        Self {
            level: RiskLevel::High,
            reasons: vec![reason.into()],
            score: FAIL_SAFE_SCORE,
        }
    }

    /// Raise the level to at least `floor`. Never lowers it.
    pub fn escalate_to(&mut self, floor: RiskLevel) {
        self.level = self.level.max(floor);
    }

    pub fn push_reason(&mut self, reason: impl Into<String>) {
        self.reasons.push(reason.into());
    }
}
