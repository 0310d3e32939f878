//! Organization health feed adapter (C1).
//!
//! Normalizes two upstream feed shapes (polled list + pushed single-event
//! hand-off) into one [`crate::types::Event`] record, and exposes the
//! paginated affected-accounts/affected-entities calls the rest of the
//! pipeline depends on.

mod normalize;

pub use normalize::{normalized_region, simplified_description};

use crate::error::{PipelineError, Result};
use crate::types::{AccountId, Event, EventArn, EventCategory};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod fixture;

/// Inclusive date window used by `list_events`.
#[derive(Debug, Clone, Copy)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Status as reported on an individual affected entity, prior to mapping
/// into [`crate::types::StatusCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityStatus {
    Impaired,
    Pending,
    Unimpaired,
    Resolved,
    Unknown,
}

impl EntityStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "IMPAIRED" => EntityStatus::Impaired,
            "PENDING" => EntityStatus::Pending,
            "UNIMPAIRED" => EntityStatus::Unimpaired,
            "RESOLVED" => EntityStatus::Resolved,
            _ => EntityStatus::Unknown,
        }
    }

    /// `IMPAIRED|PENDING -> open; UNIMPAIRED|RESOLVED -> closed; else unknown`.
    pub fn to_status_code(self) -> crate::types::StatusCode {
        use crate::types::StatusCode;
        match self {
            EntityStatus::Impaired | EntityStatus::Pending => StatusCode::Open,
            EntityStatus::Unimpaired | EntityStatus::Resolved => StatusCode::Closed,
            EntityStatus::Unknown => StatusCode::Unknown,
        }
    }
}

/// One affected-entity record from a paginated batch call.
#[derive(Debug, Clone)]
pub struct AffectedEntity {
    pub account_id: AccountId,
    pub entity_value: String,
    pub status: EntityStatus,
}

/// One page of affected entities plus a continuation token.
#[derive(Debug, Clone, Default)]
pub struct EntityPage {
    pub entities: Vec<AffectedEntity>,
    pub next_token: Option<String>,
}

/// Upstream limit on how many account filters can be passed to a single
/// `describe_affected_entities` call.
pub const MAX_ACCOUNTS_PER_ENTITIES_CALL: usize = 10;

/// Safety cap on pagination: stop after this many pages with a warning
/// rather than loop indefinitely against a misbehaving upstream.
pub const MAX_ENTITY_PAGES: usize = 10;

/// Per-account resource entities plus the account's latest description,
/// fetched once per account by the worker.
#[derive(Debug, Clone, Default)]
pub struct AccountResources {
    pub affected_resources: String,
    pub latest_description: String,
}

/// Organization-wide health feed adapter.
///
/// The production implementation wraps the organization-scoped health API
/// (falling back to the account-scoped API when the organization call's
/// `successfulSet` is empty); [`fixture::SimulatedHealthFeed`] is an
/// in-process fixture used by tests and local dry runs.
#[async_trait]
pub trait HealthFeed: Send + Sync {
    /// Lists events in `window` restricted to `categories` (empty means
    /// all). Merges the `{closed, upcoming}`-by-window and
    /// `{open}`-by-window-start queries and deduplicates by ARN.
    async fn list_events(
        &self,
        window: DateWindow,
        categories: &[EventCategory],
    ) -> Result<Vec<Event>>;

    /// Describes one event plus its account-scoped detail description, used
    /// by the single-event hand-off path when an event isn't already known.
    async fn describe_event(&self, arn: &EventArn, account_id: &AccountId)
        -> Result<(Event, String)>;

    /// Lists every account affected by `arn`, paginating internally at
    /// `maxResults=100` and stopping early at `cap` if supplied.
    async fn list_affected_accounts(
        &self,
        arn: &EventArn,
        cap: Option<usize>,
    ) -> Result<Vec<AccountId>>;

    /// Fetches one page of affected entities for up to
    /// [`MAX_ACCOUNTS_PER_ENTITIES_CALL`] accounts. `page_token` is `None`
    /// for the first page.
    async fn describe_affected_entities_page(
        &self,
        arn: &EventArn,
        account_ids: &[AccountId],
        page_token: Option<String>,
    ) -> Result<EntityPage>;

    /// Fetches the resources and latest description for one account,
    /// used once per account by the worker when composing a record.
    async fn account_resources(
        &self,
        arn: &EventArn,
        account_id: &AccountId,
    ) -> Result<AccountResources>;
}

/// Walks every page of `describe_affected_entities` for `account_ids`,
/// chunked to [`MAX_ACCOUNTS_PER_ENTITIES_CALL`] accounts per call, invoking
/// `on_page` with each page's entities. `on_page` returns `true` to keep
/// paginating that chunk, `false` to stop early (the worst-case-wins
/// resolver uses this once every account in the chunk is already `open`).
///
/// Stops after [`MAX_ENTITY_PAGES`] pages per chunk regardless, logging a
/// warning, so a misbehaving upstream cannot loop this forever.
pub async fn describe_affected_entities_batch(
    feed: &dyn HealthFeed,
    arn: &EventArn,
    account_ids: &[AccountId],
    mut on_page: impl FnMut(&[AffectedEntity]) -> bool,
) -> Result<()> {
    for chunk in account_ids.chunks(MAX_ACCOUNTS_PER_ENTITIES_CALL) {
        let mut token = None;
        for page_num in 0..MAX_ENTITY_PAGES {
            let page = feed
                .describe_affected_entities_page(arn, chunk, token.clone())
                .await?;
            let keep_going = on_page(&page.entities);
            token = page.next_token;
            if token.is_none() || !keep_going {
                break;
            }
            if page_num + 1 == MAX_ENTITY_PAGES {
                tracing::warn!(
                    %arn,
                    "describe_affected_entities_batch: hit the {}-page safety cap before upstream reported exhaustion",
                    MAX_ENTITY_PAGES
                );
            }
        }
    }
    Ok(())
}

/// `SubscriptionRequired`-style failures are fatal: the pipeline cannot run
/// without organization view. Helper for adapters to build the right error.
pub fn subscription_required_error(detail: impl Into<String>) -> PipelineError {
    PipelineError::UpstreamAuth(detail.into())
}
