//! Model-backed [`Analyzer`], calling a Bedrock-compatible messages endpoint
//! over HTTP with the advanced retry schedule from [`super::backoff`].
//! Grounded on the upstream project's `invoke_bedrock_with_advanced_retry`
//! and its response post-processing.

use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::types::{Analysis, RiskLevel};

use super::backoff::{backoff, max_attempts, stagger_seed};
use super::error::AnalyzerError;
use super::{fallback, AnalysisRequest, Analyzer};

/// Raw shape the model is instructed to return. Fields are all optional so
/// a partially-malformed response still yields a best-effort [`Analysis`]
/// rather than a hard parse failure.
#[derive(Debug, Deserialize, Default)]
struct ModelAnalysis {
    #[serde(default)]
    critical: bool,
    #[serde(default)]
    risk_level: Option<String>,
    #[serde(default)]
    time_sensitivity: Option<String>,
    #[serde(default)]
    risk_category: Option<String>,
    #[serde(default)]
    impact_analysis: Option<String>,
    #[serde(default)]
    required_actions: Option<String>,
    #[serde(default)]
    consequences_if_ignored: Option<String>,
    #[serde(default)]
    event_impact_type: Option<String>,
}

pub struct BedrockAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    model_id: String,
    api_key: String,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

impl BedrockAnalyzer {
    pub fn new(
        endpoint: impl Into<String>,
        model_id: impl Into<String>,
        api_key: impl Into<String>,
        temperature: f32,
        top_p: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model_id: model_id.into(),
            api_key: api_key.into(),
            temperature,
            top_p,
            max_tokens,
        }
    }

    fn prompt(request: &AnalysisRequest) -> String {
        format!(
            "Analyze this AWS Health event and respond with JSON only.\n\
             Service: {}\n\
             Event type: {}\n\
             Category: {}\n\
             Region: {}\n\
             Start time: {}\n\
             Description: {}\n\n\
             Respond with a JSON object containing: critical (bool), risk_level \
             (one of CRITICAL, HIGH, MEDIUM, LOW), time_sensitivity, risk_category, \
             impact_analysis, required_actions, consequences_if_ignored, \
             event_impact_type.",
            request.service,
            request.event_type_code,
            request.event_type_category,
            request.region,
            request.start_time,
            request.description,
        )
    }

    async fn call_once(&self, request: &AnalysisRequest) -> Result<String, AnalyzerError> {
        let body = json!({
            "modelId": self.model_id,
            "messages": [{"role": "user", "content": Self::prompt(request)}],
            "temperature": self.temperature,
            "top_p": self.top_p,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalyzerError::RequestFailed(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AnalyzerError::RequestFailed(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(AnalyzerError::classify_http_status(status, text));
        }

        Ok(text)
    }

    pub(super) fn parse(raw: &str) -> Result<Analysis, AnalyzerError> {
        let parsed: ModelAnalysis =
            serde_json::from_str(raw).map_err(|e| AnalyzerError::ParseFailed(e.to_string()))?;

        let mut risk_level = parsed
            .risk_level
            .as_deref()
            .map(str::to_ascii_uppercase)
            .and_then(|s| match s.as_str() {
                "CRITICAL" => Some(RiskLevel::Critical),
                "HIGH" => Some(RiskLevel::High),
                "MEDIUM" => Some(RiskLevel::Medium),
                "LOW" => Some(RiskLevel::Low),
                _ => None,
            })
            .unwrap_or(RiskLevel::Medium);

        let mut critical = parsed.critical;
        if risk_level == RiskLevel::Critical {
            critical = true;
        } else if critical {
            risk_level = RiskLevel::Critical;
        }

        Ok(Analysis {
            critical,
            risk_level,
            time_sensitivity: parsed.time_sensitivity.unwrap_or_else(|| "Routine".into()),
            risk_category: parsed.risk_category.unwrap_or_else(|| "Unclassified".into()),
            impact_analysis: parsed.impact_analysis.unwrap_or_default(),
            required_actions: parsed.required_actions.unwrap_or_default(),
            consequences_if_ignored: parsed.consequences_if_ignored.unwrap_or_default(),
            event_impact_type: parsed.event_impact_type.unwrap_or_else(|| "Informational".into()),
            analysis_text: raw.to_string(),
            is_fallback: false,
        })
    }
}

#[async_trait::async_trait]
impl Analyzer for BedrockAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest, worker_identity: &str) -> Analysis {
        let seed = stagger_seed(worker_identity, &request.event_type_code);
        tokio::time::sleep(super::backoff::initial_stagger(seed)).await;

        let mut consecutive_throttles = 0u32;
        for attempt in 0..max_attempts() {
            match self.call_once(request).await {
                Ok(raw) => match Self::parse(&raw) {
                    Ok(analysis) => return analysis,
                    Err(e) => {
                        warn!(error = %e, "analyzer response did not parse, using fallback");
                        return fallback::generate(request);
                    }
                },
                Err(e) if e.is_throttled() => {
                    consecutive_throttles += 1;
                    let delay = backoff(attempt, consecutive_throttles, seed);
                    warn!(attempt, ?delay, "analyzer throttled, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(error = %e, "analyzer call failed, using fallback");
                    return fallback::generate(request);
                }
            }
        }

        warn!("analyzer retries exhausted, using fallback");
        fallback::generate(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventCategory;

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            event_type_code: "AWS_EC2_OPERATIONAL_ISSUE".to_string(),
            event_type_category: EventCategory::Issue,
            service: "EC2".to_string(),
            region: "us-east-1".to_string(),
            start_time: chrono::Utc::now().date_naive(),
            description: "elevated error rates".to_string(),
        }
    }

    #[test]
    fn parse_normalizes_critical_and_risk_level_both_ways() {
        let raw = r#"{"critical": true, "risk_level": "medium"}"#;
        let analysis = BedrockAnalyzer::parse(raw).unwrap();
        assert_eq!(analysis.risk_level, RiskLevel::Critical);
        assert!(analysis.critical);

        let raw = r#"{"critical": false, "risk_level": "CRITICAL"}"#;
        let analysis = BedrockAnalyzer::parse(raw).unwrap();
        assert!(analysis.critical);
        assert_eq!(analysis.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn parse_rejects_malformed_json() {
        assert!(BedrockAnalyzer::parse("not json").is_err());
    }

    #[test]
    fn prompt_includes_all_request_fields() {
        let req = request();
        let prompt = BedrockAnalyzer::prompt(&req);
        assert!(prompt.contains("EC2"));
        assert!(prompt.contains("AWS_EC2_OPERATIONAL_ISSUE"));
        assert!(prompt.contains("us-east-1"));
    }
}
