//! Change-stream reactor (C9): consumes store mutations and drives
//! incremental counter updates.

use std::collections::HashSet;

use tokio::sync::broadcast;
use tracing::info;

use crate::counters::{self, category_for};
use crate::error::Result;
use crate::store::{ChangeEvent, CounterStore, RecordStore, TTL_SERVICE_IDENTITY};
use crate::types::EventArn;

/// Summary of one reactor batch, mirroring the contract components report
/// back to the scheduler.
#[derive(Debug, Default, Clone)]
pub struct ReactorSummary {
    pub processed: usize,
    pub count_updates: usize,
    pub arns_updated: usize,
}

/// Drains every currently-buffered change event from `rx` without
/// blocking, used to assemble one reactor batch per invocation.
pub fn drain_batch(rx: &mut broadcast::Receiver<ChangeEvent>) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "change-stream reactor lagged, some events were dropped");
                continue;
            }
            Err(_) => break,
        }
    }
    events
}

/// Processes one batch of change events: `INSERT`/status-changing `MODIFY`
/// mark their ARN dirty for recomputation; TTL `REMOVE` (identified by
/// [`TTL_SERVICE_IDENTITY`]) decrements the affected account's counter
/// directly, guarded against negatives by [`crate::types::Counters::decrement`].
/// User-initiated removal is not decremented here — full recompute is the
/// authoritative reconciler for that case.
pub async fn process_batch(
    events: Vec<ChangeEvent>,
    store: &dyn RecordStore,
    counter_store: &dyn CounterStore,
) -> Result<ReactorSummary> {
    let mut dirty_arns: HashSet<EventArn> = HashSet::new();
    let processed = events.len();

    for event in &events {
        match event {
            ChangeEvent::Insert { new } => {
                dirty_arns.insert(new.event_arn.clone());
            }
            ChangeEvent::Modify { old, new } => {
                if old.status_code != new.status_code {
                    dirty_arns.insert(new.event_arn.clone());
                }
            }
            ChangeEvent::Remove { old, user_identity } => {
                if user_identity == TTL_SERVICE_IDENTITY && old.status_code.is_active() {
                    if let Some(category) = category_for(old) {
                        let mut counters = counter_store.get_counters(&old.account_id).await?;
                        counters.decrement(category);
                        counter_store.put_counters(counters).await?;
                    }
                }
            }
        }
    }

    let arns_updated = dirty_arns.len();
    let count_updates = counters::apply_incremental(store, counter_store, &dirty_arns).await?;

    info!(processed, count_updates, arns_updated, "change-stream reactor batch complete");
    Ok(ReactorSummary { processed, count_updates, arns_updated })
}
