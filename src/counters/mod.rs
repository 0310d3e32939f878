//! Counter materializer (C8): per-account counters by category, maintained
//! both by scheduled full recompute and by incremental change-stream
//! updates derived from the same ARN-set rule.
//!
//! The full recompute is the correctness-defining path; the incremental
//! path is an optimization and must agree with it on every dirty ARN —
//! both are built on [`category_for`] and [`is_closed_set`] so they cannot
//! drift apart.

use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::error::Result;
use crate::store::{CounterStore, RecordStore};
use crate::types::{AccountId, CounterCategory, Counters, EventArn, Record};

/// The category a record's ARN contributes to, or `None` if it matches no
/// counting rule (the ARN is skipped entirely).
pub fn category_for(record: &Record) -> Option<CounterCategory> {
    CounterCategory::for_record(&record.service, record.event_type_category)
}

/// `true` iff every record sharing an ARN reports `closed` — the ARN is
/// inactive and contributes to no account's counters.
pub fn is_closed_set(records: &[Record]) -> bool {
    !records.is_empty() && records.iter().all(|r| r.status_code == crate::types::StatusCode::Closed)
}

/// Full recompute: scans every record, groups by ARN, and — for each ARN
/// not fully closed — adds the ARN once to every affected account's set
/// for its category. The final counter value is set cardinality, so a
/// multi-account ARN contributes at most one unit per account, never one
/// per record.
pub fn recompute_from_records(records: &[Record]) -> HashMap<AccountId, Counters> {
    let mut by_arn: HashMap<&EventArn, Vec<&Record>> = HashMap::new();
    for record in records {
        by_arn.entry(&record.event_arn).or_default().push(record);
    }

    let mut sets: HashMap<AccountId, HashMap<CounterCategory, HashSet<EventArn>>> = HashMap::new();

    for (arn, arn_records) in by_arn {
        let first = arn_records[0];
        let Some(category) = category_for(first) else { continue };

        let owned: Vec<Record> = arn_records.iter().map(|r| (*r).clone()).collect();
        if is_closed_set(&owned) {
            continue;
        }

        for record in arn_records {
            sets.entry(record.account_id.clone())
                .or_default()
                .entry(category)
                .or_default()
                .insert(arn.clone());
        }
    }

    sets.into_iter()
        .map(|(account_id, by_category)| {
            let mut counters = Counters { account_id: account_id.clone(), ..Default::default() };
            for (category, arns) in by_category {
                counters.set(category, arns.len() as u64);
            }
            counters.last_updated = Some(chrono::Utc::now());
            (account_id, counters)
        })
        .collect()
}

/// Runs [`recompute_from_records`] over every record in `store` and
/// overwrites every counter row (missing accounts initialize to zero).
pub async fn recompute_counters(
    store: &dyn RecordStore,
    counter_store: &dyn CounterStore,
) -> Result<usize> {
    let records = store.scan().await?;
    let mut computed = recompute_from_records(&records);

    // Every account that currently has a nonzero counter but no longer
    // appears in `computed` must be reset to zero rather than left stale.
    for existing in counter_store.all_counters().await? {
        computed.entry(existing.account_id.clone()).or_insert_with(|| Counters {
            account_id: existing.account_id,
            ..Default::default()
        });
    }

    let written = computed.len();
    for counters in computed.into_values() {
        counter_store.put_counters(counters).await?;
    }

    info!(accounts_updated = written, "full counter recompute complete");
    Ok(written)
}

/// Seeds the counter table from a cold store on startup: if the counter
/// table is empty, runs one full [`recompute_counters`] pass so counters
/// aren't silently zero until the next scheduled recalculation. Returns
/// `true` if a recompute ran.
pub async fn bootstrap_if_empty(store: &dyn RecordStore, counter_store: &dyn CounterStore) -> Result<bool> {
    if !counter_store.all_counters().await?.is_empty() {
        return Ok(false);
    }
    recompute_counters(store, counter_store).await?;
    Ok(true)
}

/// Incremental update for a set of dirty ARNs (C9-driven). For each dirty
/// ARN, recomputes counters for every account that has records under it,
/// using the same [`category_for`]/[`is_closed_set`] rule as the full
/// recompute so the two paths can never disagree on a single ARN.
///
/// This does not handle TTL-expiry decrements (see [`crate::reactor`],
/// which calls [`Counters::decrement`] directly for those) — only the
/// ARN-set recomputation for inserts/status-changing modifies.
pub async fn apply_incremental(
    store: &dyn RecordStore,
    counter_store: &dyn CounterStore,
    dirty_arns: &HashSet<EventArn>,
) -> Result<usize> {
    let mut touched_accounts: HashSet<AccountId> = HashSet::new();

    for arn in dirty_arns {
        let arn_records = store.list_by_arn(arn).await?;
        for record in &arn_records {
            touched_accounts.insert(record.account_id.clone());
        }
    }

    // Recomputing from just the dirty ARNs' records would miss other ARNs
    // already contributing to a touched account's counters, so pull every
    // record for each touched account and re-derive its full counter row.
    let mut updated = 0usize;
    for account_id in touched_accounts {
        let account_records = store.list_by_account(&account_id).await?;
        let recomputed = recompute_from_records(&account_records);
        let counters = recomputed.into_iter().next().map(|(_, c)| c).unwrap_or_else(|| Counters {
            account_id: account_id.clone(),
            ..Default::default()
        });
        counter_store.put_counters(counters).await?;
        updated += 1;
    }

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteRecordStore;
    use crate::types::{Analysis, EventCategory, RiskLevel, StatusCode};
    use chrono::Utc;

    fn record(arn: &str, account_id: &str, service: &str, category: EventCategory, status: StatusCode) -> Record {
        let now = Utc::now();
        Record {
            event_arn: arn.to_string(),
            account_id: account_id.to_string(),
            service: service.to_string(),
            event_type_code: "AWS_EC2_OPERATIONAL_ISSUE".to_string(),
            event_type_category: category,
            region: "us-east-1".to_string(),
            start_time: now.date_naive(),
            last_update_time: now,
            status_code: status,
            description: "desc".to_string(),
            simplified_description: "simplified".to_string(),
            account_name: "prod".to_string(),
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
    fn partial_close_counts_open_account_but_not_closed_one() {
        let records = vec![
            record("arn:1", "A", "EC2", EventCategory::Issue, StatusCode::Open),
            record("arn:1", "B", "EC2", EventCategory::Issue, StatusCode::Closed),
        ];
        let counters = recompute_from_records(&records);
        assert_eq!(counters.get("A").unwrap().active_issues, 1);
        assert_eq!(counters.get("B").unwrap().active_issues, 1);
    }

    #[test]
    fn fully_closed_arn_contributes_nothing() {
        let records = vec![
            record("arn:1", "A", "EC2", EventCategory::Issue, StatusCode::Closed),
            record("arn:1", "B", "EC2", EventCategory::Issue, StatusCode::Closed),
        ];
        let counters = recompute_from_records(&records);
        assert!(counters.is_empty());
    }

    #[test]
    fn billing_service_overrides_category_into_billing_changes() {
        let records = vec![record(
            "arn:1",
            "A",
            "BILLING",
            EventCategory::Issue,
            StatusCode::Open,
        )];
        let counters = recompute_from_records(&records);
        assert_eq!(counters.get("A").unwrap().billing_changes, 1);
        assert_eq!(counters.get("A").unwrap().active_issues, 0);
    }

    #[test]
    fn two_open_arns_on_one_account_count_as_two() {
        let records = vec![
            record("arn:1", "A", "EC2", EventCategory::Issue, StatusCode::Open),
            record("arn:2", "A", "EC2", EventCategory::Issue, StatusCode::Open),
        ];
        let counters = recompute_from_records(&records);
        assert_eq!(counters.get("A").unwrap().active_issues, 2);
    }

    #[tokio::test]
    async fn full_recompute_writes_every_account_including_zeroed_ones() {
        let store = SqliteRecordStore::open(":memory:", 180).unwrap();
        store
            .upsert(record("arn:1", "A", "EC2", EventCategory::Issue, StatusCode::Open))
            .await
            .unwrap();
        recompute_counters(&store, &store).await.unwrap();

        let counters = store.get_counters(&"A".to_string()).await.unwrap();
        assert_eq!(counters.active_issues, 1);
    }

    #[tokio::test]
    async fn bootstrap_recomputes_only_when_counter_table_is_cold() {
        let store = SqliteRecordStore::open(":memory:", 180).unwrap();
        store
            .upsert(record("arn:1", "A", "EC2", EventCategory::Issue, StatusCode::Open))
            .await
            .unwrap();

        assert!(bootstrap_if_empty(&store, &store).await.unwrap());
        assert_eq!(store.get_counters(&"A".to_string()).await.unwrap().active_issues, 1);

        // A second bootstrap is a no-op: the table is no longer empty, even
        // though a new record landed after the first bootstrap ran.
        store
            .upsert(record("arn:2", "A", "EC2", EventCategory::Issue, StatusCode::Open))
            .await
            .unwrap();
        assert!(!bootstrap_if_empty(&store, &store).await.unwrap());
        assert_eq!(store.get_counters(&"A".to_string()).await.unwrap().active_issues, 1);
    }
}
