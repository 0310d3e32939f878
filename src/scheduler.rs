//! Scheduler & routing (C10): the entry point. Classifies an incoming
//! trigger and dispatches to the right pipeline stage.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::counters;
use crate::dispatch::Dispatcher;
use crate::error::{PipelineError, Result};
use crate::health::{DateWindow, HealthFeed};
use crate::queue::{EventHeader, WorkUnit};
use crate::reactor::{self, ReactorSummary};
use crate::store::{ChangeEvent, CounterStore, RecordStore};
use crate::types::{EventArn, StatusCode};
use crate::worker::{ProcessOutcome, Worker};

/// The five trigger shapes discriminated by payload, per the external
/// interface contract.
#[derive(Debug)]
pub enum Trigger {
    QueueDelivery(Vec<WorkUnit>),
    ChangeStreamDelivery,
    ScheduledSync { lookback_days: Option<u32> },
    RecalculateCounts,
    SingleEvent { event_arn: EventArn },
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    source: String,
    body: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct RawTrigger {
    #[serde(default)]
    records: Option<Vec<RawRecord>>,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    lookback_days: Option<u32>,
    #[serde(default)]
    event_arn: Option<String>,
}

/// Classifies a raw JSON trigger payload into a [`Trigger`], per the marker
/// table in the external interface contract. Unknown or mixed-source
/// payloads are a [`PipelineError::ValidationError`] rather than a guess.
pub fn classify_trigger(raw: &serde_json::Value) -> Result<Trigger> {
    let parsed: RawTrigger = serde_json::from_value(raw.clone())
        .map_err(|e| PipelineError::ValidationError(e.to_string()))?;

    if let Some(records) = parsed.records {
        if !records.is_empty() && records.iter().all(|r| r.source == "queue") {
            let units = records
                .into_iter()
                .map(|r| serde_json::from_value(r.body))
                .collect::<serde_json::Result<Vec<WorkUnit>>>()
                .map_err(|e| PipelineError::ValidationError(e.to_string()))?;
            return Ok(Trigger::QueueDelivery(units));
        }
        if !records.is_empty() && records.iter().all(|r| r.source == "change-stream") {
            return Ok(Trigger::ChangeStreamDelivery);
        }
        return Err(PipelineError::ValidationError(
            "trigger carries records with mixed or unknown source".to_string(),
        ));
    }

    match parsed.mode.as_deref() {
        Some("scheduled_sync") => return Ok(Trigger::ScheduledSync { lookback_days: parsed.lookback_days }),
        Some("recalculate_counts") => return Ok(Trigger::RecalculateCounts),
        _ => {}
    }

    if let Some(event_arn) = parsed.event_arn {
        return Ok(Trigger::SingleEvent { event_arn });
    }

    Err(PipelineError::ValidationError(
        "trigger payload matched no known shape".to_string(),
    ))
}

/// Outcome of one routed trigger, summarized for logging at the call site.
#[derive(Debug)]
pub enum RouteOutcome {
    Worker(Vec<ProcessOutcome>),
    Reactor(ReactorSummary),
    Dispatch(crate::dispatch::DispatchSummary),
    CountersRecomputed(usize),
}

pub struct Scheduler {
    feed: Arc<dyn HealthFeed>,
    dispatcher: Arc<Dispatcher>,
    worker: Arc<Worker>,
    store: Arc<dyn RecordStore>,
    counter_store: Arc<dyn CounterStore>,
    change_rx: Mutex<tokio::sync::broadcast::Receiver<ChangeEvent>>,
    default_analysis_window_days: u32,
    worker_identity: String,
}

impl Scheduler {
    pub fn new(
        feed: Arc<dyn HealthFeed>,
        dispatcher: Arc<Dispatcher>,
        worker: Arc<Worker>,
        store: Arc<dyn RecordStore>,
        counter_store: Arc<dyn CounterStore>,
        change_rx: tokio::sync::broadcast::Receiver<ChangeEvent>,
        default_analysis_window_days: u32,
        worker_identity: impl Into<String>,
    ) -> Self {
        Self {
            feed,
            dispatcher,
            worker,
            store,
            counter_store,
            change_rx: Mutex::new(change_rx),
            default_analysis_window_days,
            worker_identity: worker_identity.into(),
        }
    }

    pub async fn route(&self, trigger: Trigger) -> Result<RouteOutcome> {
        match trigger {
            Trigger::QueueDelivery(units) => {
                let mut outcomes = Vec::with_capacity(units.len());
                for unit in units {
                    outcomes.push(self.worker.process_unit(unit).await?);
                }
                Ok(RouteOutcome::Worker(outcomes))
            }
            Trigger::ChangeStreamDelivery => {
                let events = {
                    let mut rx = self.change_rx.lock().await;
                    reactor::drain_batch(&mut rx)
                };
                let summary = reactor::process_batch(events, self.store.as_ref(), self.counter_store.as_ref()).await?;
                Ok(RouteOutcome::Reactor(summary))
            }
            Trigger::ScheduledSync { lookback_days } => {
                let days = lookback_days.unwrap_or(self.default_analysis_window_days);
                let now = chrono::Utc::now();
                let window = DateWindow { start: now - chrono::Duration::days(days as i64), end: now };
                let summary = self.dispatcher.dispatch(window, &[], &self.worker_identity).await?;
                Ok(RouteOutcome::Dispatch(summary))
            }
            Trigger::RecalculateCounts => {
                let updated = counters::recompute_counters(self.store.as_ref(), self.counter_store.as_ref()).await?;
                Ok(RouteOutcome::CountersRecomputed(updated))
            }
            Trigger::SingleEvent { event_arn } => {
                let unit = self.synthesize_single_event_unit(&event_arn).await?;
                let outcome = self.worker.process_unit(unit).await?;
                Ok(RouteOutcome::Worker(vec![outcome]))
            }
        }
    }

    /// Builds a one-account, deferred-analysis work unit for the
    /// single-event hand-off path: the account isn't known ahead of time,
    /// so the first affected account is used to resolve the event header.
    async fn synthesize_single_event_unit(&self, event_arn: &EventArn) -> Result<WorkUnit> {
        let accounts = self.feed.list_affected_accounts(event_arn, Some(1)).await?;
        let account_id = accounts
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::NotFound(format!("no affected accounts for {event_arn}")))?;

        let (event, _description) = self.feed.describe_event(event_arn, &account_id).await?;

        Ok(WorkUnit {
            event: EventHeader {
                event_arn: event.arn.clone(),
                event_type_code: event.event_type_code,
                event_type_category: event.event_type_category,
                service: event.service,
                region: event.normalized_region().to_string(),
                start_time: event.start_time,
                last_update_time: event.last_update_time,
                status_code: event.status_code,
            },
            accounts: vec![account_id],
            analysis: None,
            categories: None,
            batch_number: 1,
            total_batches: 1,
        })
    }
}

/// `eventLevelStatus == closed` is never actionable for counting — used by
/// callers that need to short-circuit before invoking the resolver.
pub fn is_terminal(status: StatusCode) -> bool {
    status == StatusCode::Closed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_queue_delivery() {
        let raw = serde_json::json!({
            "records": [{"source": "queue", "body": {
                "event": {
                    "event_arn": "arn:1", "event_type_code": "X", "event_type_category": "issue",
                    "service": "EC2", "region": "us-east-1", "start_time": "2026-01-01",
                    "last_update_time": "2026-01-01T00:00:00Z", "status_code": "open"
                },
                "accounts": ["A"], "batch_number": 1, "total_batches": 1
            }}]
        });
        let trigger = classify_trigger(&raw).unwrap();
        assert!(matches!(trigger, Trigger::QueueDelivery(units) if units.len() == 1));
    }

    #[test]
    fn classifies_scheduled_sync_with_optional_lookback() {
        let raw = serde_json::json!({"mode": "scheduled_sync", "lookback_days": 14});
        let trigger = classify_trigger(&raw).unwrap();
        assert!(matches!(trigger, Trigger::ScheduledSync { lookback_days: Some(14) }));
    }

    #[test]
    fn classifies_recalculate_counts() {
        let raw = serde_json::json!({"mode": "recalculate_counts"});
        assert!(matches!(classify_trigger(&raw).unwrap(), Trigger::RecalculateCounts));
    }

    #[test]
    fn classifies_single_event_handoff() {
        let raw = serde_json::json!({"event_arn": "arn:1"});
        assert!(matches!(classify_trigger(&raw).unwrap(), Trigger::SingleEvent { .. }));
    }

    #[test]
    fn unrecognized_shape_is_a_validation_error() {
        let raw = serde_json::json!({"garbage": true});
        assert!(classify_trigger(&raw).is_err());
    }
}
