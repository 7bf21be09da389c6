use std::sync::LazyLock;

use regex::RegexSet;

/// Severity class of a destructive command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    Routine,
    Default,
}

impl Severity {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Critical => "Critical Destructive",
            Self::Routine => "Routine Destructive",
            Self::Default => "Destructive",
        }
    }

    #[must_use]
    pub fn weight(self) -> f64 {
        match self {
            Self::Critical => 2.0,
            Self::Routine => 0.5,
            Self::Default => 1.0,
        }
    }
}

/// Outcome of classifying one command.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub severity: Severity,
    pub label: String,
    pub weight: f64,
}

impl From<Severity> for Classification {
    fn from(severity: Severity) -> Self {
        Self {
            severity,
            label: severity.label().to_owned(),
            weight: severity.weight(),
        }
    }
}

static CRITICAL_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"[c-z]:\\windows",
        r"[c-z]:\\program files",
        r"[c-z]:\\users\\[^\\]+\\?$",
        r"system32",
        r"\bformat\b",
        r"\bdiskpart\b",
        r"\bvssadmin\b",
        r"\bdel\s+/s\s+/q\s+[c-z]:\\",
        r"\brm\s+-(rf|fr)\s+/",
        r"\bmkfs(\.\w+)?\b",
        r"\bfdisk\b",
        r"\bparted\b",
        r"\bdd\s+if=",
        r"(^|\s)/(etc|boot|usr|bin|sbin|lib|sys|proc|dev)(/|\s|$)",
    ])
    .unwrap()
});

static ROUTINE_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"temp",
        r"tmp",
        r"cache",
        r"logs?",
        r"history",
        r"download",
        r"recycle\.bin",
        r"\.log$",
        r"\.tmp$",
        r"\.bak$",
    ])
    .unwrap()
});

/// Stateless severity classifier. Callers only invoke it for actions already
/// known to be destructive, so an unmatched command still weighs 1.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct DestructivenessClassifier;

impl DestructivenessClassifier {
    #[must_use]
    pub fn severity(command: &str) -> Severity {
        let lowered = command.trim().to_lowercase();
        if CRITICAL_PATTERNS.is_match(&lowered) {
            Severity::Critical
        } else if ROUTINE_PATTERNS.is_match(&lowered) {
            Severity::Routine
        } else {
            Severity::Default
        }
    }

    #[must_use]
    pub fn classify(command: &str) -> Classification {
        Self::severity(command).into()
    }
}
