//! Per-account status resolution via "worst case wins" (C6).

use std::collections::HashMap;

use crate::error::Result;
use crate::health::{describe_affected_entities_batch, HealthFeed};
use crate::types::{AccountId, EventArn, StatusCode};

/// Resolves each account's effective status for `arn`.
///
/// If `event_level_status` is already `closed`, the event is past its
/// deadline and no longer actionable for any account — returned without an
/// entity API call. Otherwise scans paginated affected entities, applying
/// "worst case wins" (`open` dominates `closed`) per account, short-circuits
/// once every account in view has reached `open`, and falls back to
/// `event_level_status` for accounts with no entity data at all.
pub async fn resolve_per_account_status(
    feed: &dyn HealthFeed,
    arn: &EventArn,
    accounts: &[AccountId],
    event_level_status: StatusCode,
) -> Result<HashMap<AccountId, StatusCode>> {
    if event_level_status == StatusCode::Closed {
        return Ok(accounts
            .iter()
            .map(|a| (a.clone(), StatusCode::Closed))
            .collect());
    }

    let mut result: HashMap<AccountId, StatusCode> = HashMap::new();

    describe_affected_entities_batch(feed, arn, accounts, |entities| {
        for entity in entities {
            let status = entity.status.clone().to_status_code();
            result
                .entry(entity.account_id.clone())
                .and_modify(|cur| {
                    if *cur == StatusCode::Closed && status == StatusCode::Open {
                        *cur = StatusCode::Open;
                    }
                })
                .or_insert(status);
        }

        // Early exit: once every account seen in this batch is already at
        // worst case, no later page can change the outcome for them.
        let all_open = accounts
            .iter()
            .all(|a| result.get(a) == Some(&StatusCode::Open));
        !all_open
    })
    .await?;

    for account in accounts {
        result.entry(account.clone()).or_insert(event_level_status);
    }

    Ok(result)
}
