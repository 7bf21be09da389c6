use std::fmt::Write as _;

use intentshell_sentinel::{RiskAssessment, RiskLevel};

use crate::intent::Intent;

fn risk_tag(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Low => "[ok]",
        RiskLevel::Medium => "[caution]",
        RiskLevel::High | RiskLevel::VeryHigh => "[danger]",
    }
}

/// Human-readable summary of a resolved intent and, if given, the policy
/// reasons behind its assessment.
#[must_use]
pub fn explain(intent: &Intent, assessment: Option<&RiskAssessment>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", risk_tag(intent.risk), intent.description);
    let _ = writeln!(out, "Action: {}", intent.intent_type);
    let _ = writeln!(out, "Target: {}", intent.target);

    if let Some(assessment) = assessment
        && !assessment.reasons.is_empty()
    {
        out.push_str("\nPolicy Analysis:\n");
        for reason in &assessment.reasons {
            let _ = writeln!(out, "  - {reason}");
        }
    }

    if !intent.filters.is_empty() {
        let _ = writeln!(out, "Filters: {}", intent.filters.join(", "));
    }
    let _ = writeln!(
        out,
        "Recursive: {}",
        if intent.recursive { "Yes" } else { "No" }
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_intent() {
        let intent = Intent {
            intent_type: "list_files".into(),
            description: "List files".into(),
            ..Intent::default()
        };
        assert_eq!(
            explain(&intent, None),
            "[ok] List files\nAction: list_files\nTarget: system\nRecursive: No\n"
        );
    }

    #[test]
    fn includes_policy_reasons_and_filters() {
        let intent = Intent {
            intent_type: "file_delete".into(),
            target: "downloads".into(),
            filters: vec!["*.zip".into(), "*.tmp".into()],
            recursive: true,
            risk: RiskLevel::High,
            description: "Delete archives".into(),
            ..Intent::default()
        };
        let assessment = RiskAssessment::new(
            RiskLevel::High,
            vec!["Deletes files".into(), "Recursive".into()],
            60.0,
        );
        let text = explain(&intent, Some(&assessment));
        assert!(text.starts_with("[danger] Delete archives\n"));
        assert!(text.contains("\nPolicy Analysis:\n  - Deletes files\n  - Recursive\n"));
        assert!(text.contains("Filters: *.zip, *.tmp\n"));
        assert!(text.ends_with("Recursive: Yes\n"));
    }

    #[test]
    fn empty_reasons_skip_policy_section() {
        let intent = Intent {
            risk: RiskLevel::Medium,
            ..Intent::default()
        };
        let assessment = RiskAssessment::new(RiskLevel::Medium, Vec::new(), 10.0);
        let text = explain(&intent, Some(&assessment));
        assert!(text.starts_with("[caution]"));
        assert!(!text.contains("Policy Analysis"));
    }
}
