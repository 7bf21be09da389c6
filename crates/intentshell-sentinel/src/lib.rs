//! Risk scoring and session suspension for candidate interpreter commands.

pub mod anti_pattern;
pub mod classifier;
pub mod risk;
pub mod suspension;

pub use anti_pattern::{AntiPatternScanner, Detection, DetectionKind};
pub use classifier::{Classification, DestructivenessClassifier, Severity};
pub use risk::{RiskAssessment, RiskLevel};
pub use suspension::{RiskSuspensionEngine, SuspensionPolicy, SuspensionState};
