//! Work queue abstraction and the batch/legacy message envelopes C4
//! publishes and C5 consumes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{AccountId, EventArn, EventCategory, StatusCode};

/// Event header fields carried on every work unit — enough for the worker
/// to reconstruct a record without a second feed round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventHeader {
    pub event_arn: EventArn,
    pub event_type_code: String,
    pub event_type_category: EventCategory,
    pub service: String,
    pub region: String,
    pub start_time: chrono::NaiveDate,
    pub last_update_time: chrono::DateTime<chrono::Utc>,
    pub status_code: StatusCode,
}

/// The analysis payload attached to a work unit, named `categories` per the
/// wire contract (it carries the risk categorization, not just the analysis
/// text).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisPayload {
    pub critical: bool,
    pub risk_level: String,
    pub impact_analysis: String,
    pub required_actions: String,
    pub time_sensitivity: String,
    pub risk_category: String,
    pub consequences_if_ignored: String,
    pub event_impact_type: String,
}

impl From<&crate::types::Analysis> for AnalysisPayload {
    fn from(a: &crate::types::Analysis) -> Self {
        Self {
            critical: a.critical,
            risk_level: a.risk_level.to_string(),
            impact_analysis: a.impact_analysis.clone(),
            required_actions: a.required_actions.clone(),
            time_sensitivity: a.time_sensitivity.clone(),
            risk_category: a.risk_category.clone(),
            consequences_if_ignored: a.consequences_if_ignored.clone(),
            event_impact_type: a.event_impact_type.clone(),
        }
    }
}

impl AnalysisPayload {
    /// Reconstructs the full [`crate::types::Analysis`] this payload was
    /// built from, pairing it back with the raw model text carried
    /// alongside it on the wire.
    pub fn into_analysis(self, analysis_text: String) -> crate::types::Analysis {
        use crate::types::RiskLevel;
        let risk_level = match self.risk_level.as_str() {
            "CRITICAL" => RiskLevel::Critical,
            "HIGH" => RiskLevel::High,
            "LOW" => RiskLevel::Low,
            _ => RiskLevel::Medium,
        };
        crate::types::Analysis {
            critical: self.critical,
            risk_level,
            time_sensitivity: self.time_sensitivity,
            risk_category: self.risk_category,
            impact_analysis: self.impact_analysis,
            required_actions: self.required_actions,
            consequences_if_ignored: self.consequences_if_ignored,
            event_impact_type: self.event_impact_type,
            analysis_text,
            is_fallback: false,
        }
    }
}

/// One work unit: an event header, ≤10 accounts, and either a ready
/// analysis or an instruction for the worker to compute it on arrival.
/// Modeled as `analysis`/`categories` being both-or-neither `None`, per the
/// wire contract, rather than a single enum, so the struct serializes to
/// exactly the documented JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkUnit {
    pub event: EventHeader,
    pub accounts: Vec<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<AnalysisPayload>,
    pub batch_number: u32,
    pub total_batches: u32,
}

impl WorkUnit {
    /// `true` when this unit carries no pre-computed analysis and the
    /// worker must perform deferred analysis on arrival.
    pub fn needs_deferred_analysis(&self) -> bool {
        self.analysis.is_none()
    }
}

/// The legacy single-event message shape, kept only as a compatibility
/// shim: one event, one account, no batching fields. Converted into a
/// one-account [`WorkUnit`] and routed through the same worker internals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyEnvelope {
    pub event_arn: EventArn,
    pub account_id: AccountId,
    pub event: EventHeader,
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub categories: Option<AnalysisPayload>,
}

impl LegacyEnvelope {
    /// Upgrades a legacy single-event message into the batch [`WorkUnit`]
    /// shape so the worker has exactly one code path.
    pub fn into_work_unit(self) -> WorkUnit {
        WorkUnit {
            event: self.event,
            accounts: vec![self.account_id],
            analysis: self.analysis,
            categories: self.categories,
            batch_number: 1,
            total_batches: 1,
        }
    }
}

/// A durable work queue. The production implementation maps to the
/// organization's message broker; [`InMemoryWorkQueue`] is a fixture for
/// tests and local dry runs.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn send(&self, unit: WorkUnit) -> Result<()>;

    /// Receives up to `max` units without removing them from the queue;
    /// callers ack via [`WorkQueue::delete`] after successful processing,
    /// matching at-least-once delivery semantics.
    async fn receive(&self, max: usize) -> Result<Vec<(String, WorkUnit)>>;

    async fn delete(&self, message_id: &str) -> Result<()>;
}

/// An in-process FIFO queue, useful for inline dispatch and tests. Message
/// identifiers are monotonically increasing strings.
pub struct InMemoryWorkQueue {
    inner: tokio::sync::Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    next_id: u64,
    messages: std::collections::VecDeque<(String, WorkUnit)>,
}

impl Default for InMemoryWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self {
            inner: tokio::sync::Mutex::new(InMemoryState::default()),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn send(&self, unit: WorkUnit) -> Result<()> {
        let mut state = self.inner.lock().await;
        let id = state.next_id.to_string();
        state.next_id += 1;
        state.messages.push_back((id, unit));
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<(String, WorkUnit)>> {
        let state = self.inner.lock().await;
        Ok(state.messages.iter().take(max).cloned().collect())
    }

    async fn delete(&self, message_id: &str) -> Result<()> {
        let mut state = self.inner.lock().await;
        state.messages.retain(|(id, _)| id != message_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> EventHeader {
        EventHeader {
            event_arn: "arn:aws:health:global::event/EC2/ISSUE/123".to_string(),
            event_type_code: "AWS_EC2_OPERATIONAL_ISSUE".to_string(),
            event_type_category: EventCategory::Issue,
            service: "EC2".to_string(),
            region: "us-east-1".to_string(),
            start_time: chrono::Utc::now().date_naive(),
            last_update_time: chrono::Utc::now(),
            status_code: StatusCode::Open,
        }
    }

    #[tokio::test]
    async fn send_and_receive_round_trip() {
        let queue = InMemoryWorkQueue::new();
        let unit = WorkUnit {
            event: header(),
            accounts: vec!["111111111111".to_string()],
            analysis: Some("raw".to_string()),
            categories: None,
            batch_number: 1,
            total_batches: 1,
        };
        queue.send(unit).await.unwrap();
        assert_eq!(queue.len().await, 1);

        let received = queue.receive(10).await.unwrap();
        assert_eq!(received.len(), 1);
        let (id, _) = &received[0];
        queue.delete(id).await.unwrap();
        assert!(queue.is_empty().await);
    }

    #[test]
    fn legacy_envelope_upgrades_to_single_account_unit() {
        let legacy = LegacyEnvelope {
            event_arn: "arn:aws:health:global::event/EC2/ISSUE/123".to_string(),
            account_id: "111111111111".to_string(),
            event: header(),
            analysis: None,
            categories: None,
        };
        let unit = legacy.into_work_unit();
        assert_eq!(unit.accounts, vec!["111111111111".to_string()]);
        assert_eq!(unit.batch_number, 1);
        assert_eq!(unit.total_batches, 1);
        assert!(unit.needs_deferred_analysis());
    }
}
