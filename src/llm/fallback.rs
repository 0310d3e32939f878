//! Deterministic fallback analysis, synthesized from event-type keywords
//! when the analyzer is unreachable after exhausting retries, so the
//! pipeline is never blocked by the model. Grounded on the upstream
//! project's `generate_fallback_analysis`.

use crate::types::{Analysis, RiskLevel};

use super::AnalysisRequest;

/// Builds a fallback [`Analysis`] for `request`, marked `is_fallback` so
/// it's eligible for re-analysis on the next pass.
pub fn generate(request: &AnalysisRequest) -> Analysis {
    let code = request.event_type_code.to_ascii_uppercase();

    let risk_level = if code.contains("OPERATIONAL_ISSUE") {
        RiskLevel::High
    } else if code.contains("SECURITY") {
        RiskLevel::High
    } else if code.contains("MAINTENANCE") || code.contains("LIFECYCLE") {
        RiskLevel::Low
    } else {
        RiskLevel::Medium
    };

    let time_sensitivity = if risk_level == RiskLevel::High && code.contains("SECURITY") {
        "High Priority"
    } else if risk_level == RiskLevel::High {
        "Urgent"
    } else {
        "Routine"
    }
    .to_string();

    let risk_category = if code.contains("OPERATIONAL") {
        "Service Impact"
    } else {
        "Maintenance"
    }
    .to_string();

    let event_impact_type = if code.contains("OPERATIONAL") {
        "Service"
    } else {
        "Informational"
    }
    .to_string();

    let impact_analysis = format!(
        "Basic analysis: {} {} event in {}",
        request.service, request.event_type_code, request.region
    );

    let analysis_text = format!(
        "FALLBACK ANALYSIS (analyzer unavailable): risk_level={risk_level}, category={risk_category}"
    );

    Analysis {
        critical: risk_level == RiskLevel::Critical,
        risk_level,
        time_sensitivity,
        risk_category,
        impact_analysis,
        required_actions: "Review event details and assess impact on your resources".to_string(),
        consequences_if_ignored: "Potential service disruption if not addressed".to_string(),
        event_impact_type,
        analysis_text,
        is_fallback: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(event_type_code: &str) -> AnalysisRequest {
        AnalysisRequest {
            event_type_code: event_type_code.to_string(),
            event_type_category: crate::types::EventCategory::Issue,
            service: "EC2".to_string(),
            region: "us-east-1".to_string(),
            start_time: chrono::Utc::now().date_naive(),
            description: "something happened".to_string(),
        }
    }

    #[test]
    fn operational_issue_is_high_risk() {
        let a = generate(&request("AWS_EC2_OPERATIONAL_ISSUE"));
        assert_eq!(a.risk_level, RiskLevel::High);
        assert!(a.is_fallback);
    }

    #[test]
    fn security_is_high_risk() {
        let a = generate(&request("AWS_EC2_SECURITY_NOTIFICATION"));
        assert_eq!(a.risk_level, RiskLevel::High);
    }

    #[test]
    fn maintenance_is_low_risk() {
        let a = generate(&request("AWS_EC2_MAINTENANCE_SCHEDULED"));
        assert_eq!(a.risk_level, RiskLevel::Low);
    }

    #[test]
    fn unknown_code_is_medium_risk() {
        let a = generate(&request("AWS_EC2_SOMETHING_ELSE"));
        assert_eq!(a.risk_level, RiskLevel::Medium);
    }
}
