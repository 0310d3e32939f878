//! Out-of-scope external collaborators, modeled as trait seams only: the
//! dashboard/events HTTP surface, the per-account mailer, and the
//! spreadsheet renderer are thin adapters over the record store and mail
//! transport, not part of the core pipeline.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::store::{DateWindow, RecordStore};
use crate::types::{AccountId, ConsolidatedEvent, Counters, EventCategory, Record};

#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CountsSummary {
    pub notifications: u64,
    pub active_issues: u64,
    pub scheduled_events: u64,
    pub billing_changes: u64,
}

/// The read surface the dashboard and `events` API consume. Records
/// sharing an `eventArn` are merged into one [`ConsolidatedEvent`] with
/// `accountIds` collapsed to a map.
#[async_trait]
pub trait ReadApi: Send + Sync {
    async fn list_by_category(
        &self,
        category: EventCategory,
        window: DateWindow,
        limit: usize,
        offset: usize,
        account_filter: Option<&[AccountId]>,
    ) -> Result<(Vec<ConsolidatedEvent>, Pagination)>;

    async fn get_counts(&self, account_filter: Option<&[AccountId]>) -> Result<CountsSummary>;
}

/// Consolidates records sharing an `eventArn` into one projection.
pub fn consolidate(records: &[Record]) -> Vec<ConsolidatedEvent> {
    let mut by_arn: HashMap<&str, ConsolidatedEvent> = HashMap::new();
    for record in records {
        let entry = by_arn.entry(record.event_arn.as_str()).or_insert_with(|| ConsolidatedEvent {
            event_arn: record.event_arn.clone(),
            service: record.service.clone(),
            event_type_code: record.event_type_code.clone(),
            event_type_category: record.event_type_category,
            region: record.region.clone(),
            simplified_description: record.simplified_description.clone(),
            accounts: HashMap::new(),
        });
        entry.accounts.insert(record.account_id.clone(), record.account_name.clone());
    }
    by_arn.into_values().collect()
}

/// [`ReadApi`] backed directly by the [`RecordStore`]/counter table,
/// filtering in-process rather than pushing the filter down to SQL — the
/// dashboard's query volume does not warrant a dedicated index strategy.
pub struct StoreBackedReadApi {
    store: std::sync::Arc<dyn RecordStore>,
    counter_store: std::sync::Arc<dyn crate::store::CounterStore>,
}

impl StoreBackedReadApi {
    pub fn new(
        store: std::sync::Arc<dyn RecordStore>,
        counter_store: std::sync::Arc<dyn crate::store::CounterStore>,
    ) -> Self {
        Self { store, counter_store }
    }
}

#[async_trait]
impl ReadApi for StoreBackedReadApi {
    async fn list_by_category(
        &self,
        category: EventCategory,
        window: DateWindow,
        limit: usize,
        offset: usize,
        account_filter: Option<&[AccountId]>,
    ) -> Result<(Vec<ConsolidatedEvent>, Pagination)> {
        let mut records = self.store.list_by_category(category, window).await?;
        if let Some(filter) = account_filter {
            records.retain(|r| filter.contains(&r.account_id));
        }

        let mut consolidated = consolidate(&records);
        consolidated.sort_by(|a, b| a.event_arn.cmp(&b.event_arn));
        let total = consolidated.len();
        let page = consolidated.into_iter().skip(offset).take(limit).collect();

        Ok((page, Pagination { total, limit, offset }))
    }

    async fn get_counts(&self, account_filter: Option<&[AccountId]>) -> Result<CountsSummary> {
        let all = self.counter_store.all_counters().await?;
        let relevant: Vec<Counters> = match account_filter {
            Some(filter) => all.into_iter().filter(|c| filter.contains(&c.account_id)).collect(),
            None => all,
        };

        let mut summary = CountsSummary::default();
        for counters in relevant {
            summary.notifications += counters.notifications;
            summary.active_issues += counters.active_issues;
            summary.scheduled_events += counters.scheduled;
            summary.billing_changes += counters.billing_changes;
        }
        Ok(summary)
    }
}

/// Per-account email digest composer, referenced only through this
/// interface; `enablePerAccountFanout = false` disables calling it without
/// affecting the core pipeline.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_account_digest(&self, account_id: &AccountId, records: &[Record]) -> Result<()>;
}

/// A no-op mailer, used when per-account fanout is disabled or in tests.
pub struct NullMailer;

#[async_trait]
impl Mailer for NullMailer {
    async fn send_account_digest(&self, _account_id: &AccountId, _records: &[Record]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Analysis, RiskLevel, StatusCode};
    use chrono::Utc;

    fn record(arn: &str, account_id: &str, account_name: &str) -> Record {
        let now = Utc::now();
        Record {
            event_arn: arn.to_string(),
            account_id: account_id.to_string(),
            service: "EC2".to_string(),
            event_type_code: "AWS_EC2_OPERATIONAL_ISSUE".to_string(),
            event_type_category: EventCategory::Issue,
            region: "us-east-1".to_string(),
            start_time: now.date_naive(),
            last_update_time: now,
            status_code: StatusCode::Open,
            description: "desc".to_string(),
            simplified_description: "simplified".to_string(),
            account_name: account_name.to_string(),
            affected_resources: "i-1".to_string(),
            analysis: Analysis {
                critical: false,
                risk_level: RiskLevel::Medium,
                time_sensitivity: "Routine".to_string(),
                risk_category: "Service Impact".to_string(),
                impact_analysis: "impact".to_string(),
                required_actions: "actions".to_string(),
                consequences_if_ignored: "consequences".to_string(),
                event_impact_type: "Service".to_string(),
                analysis_text: "{}".to_string(),
                is_fallback: false,
            },
            analysis_timestamp: now,
            analysis_version: 1,
            ttl: now,
        }
    }

    #[test]
    fn consolidate_merges_records_sharing_an_arn() {
        let records = vec![record("arn:1", "A", "prod"), record("arn:1", "B", "staging")];
        let consolidated = consolidate(&records);
        assert_eq!(consolidated.len(), 1);
        assert_eq!(consolidated[0].accounts.len(), 2);
        assert_eq!(consolidated[0].accounts.get("A"), Some(&"prod".to_string()));
    }

    #[tokio::test]
    async fn null_mailer_always_succeeds() {
        let mailer = NullMailer;
        assert!(mailer.send_account_digest(&"A".to_string(), &[]).await.is_ok());
    }
}
