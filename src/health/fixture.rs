//! In-process fixture implementation of [`super::HealthFeed`].
//!
//! A single, swappable implementation of the trait, backed by data the
//! caller pre-loads rather than a wire protocol. Used by the pipeline's own
//! tests and by local dry runs where no delegated-admin credentials are
//! configured.

use super::{AccountResources, AffectedEntity, DateWindow, EntityPage, HealthFeed};
use crate::error::{PipelineError, Result};
use crate::types::{AccountId, Event, EventArn, EventCategory};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Page size the fixture splits affected entities into, so tests can
/// exercise true multi-page pagination without a real upstream.
const FIXTURE_PAGE_SIZE: usize = 2;

#[derive(Default)]
struct FixtureState {
    events: Vec<Event>,
    affected_accounts: HashMap<EventArn, Vec<AccountId>>,
    entities: HashMap<EventArn, Vec<AffectedEntity>>,
    resources: HashMap<(EventArn, AccountId), AccountResources>,
    subscription_required: bool,
}

/// An in-memory [`HealthFeed`] populated by the test/caller ahead of time.
pub struct SimulatedHealthFeed {
    state: RwLock<FixtureState>,
}

impl Default for SimulatedHealthFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedHealthFeed {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(FixtureState::default()),
        }
    }

    pub fn with_event(self, event: Event, affected_accounts: Vec<AccountId>) -> Self {
        {
            let mut state = self.state.write().unwrap();
            state.affected_accounts.insert(event.arn.clone(), affected_accounts);
            state.events.push(event);
        }
        self
    }

    pub fn with_entities(self, arn: impl Into<EventArn>, entities: Vec<AffectedEntity>) -> Self {
        self.state.write().unwrap().entities.insert(arn.into(), entities);
        self
    }

    pub fn with_account_resources(
        self,
        arn: impl Into<EventArn>,
        account_id: impl Into<AccountId>,
        resources: AccountResources,
    ) -> Self {
        self.state
            .write()
            .unwrap()
            .resources
            .insert((arn.into(), account_id.into()), resources);
        self
    }

    /// Makes every call fail with `UpstreamAuth`, simulating an
    /// organization without delegated-admin health access.
    pub fn requiring_subscription(self) -> Self {
        self.state.write().unwrap().subscription_required = true;
        self
    }
}

#[async_trait]
impl HealthFeed for SimulatedHealthFeed {
    async fn list_events(
        &self,
        window: DateWindow,
        categories: &[EventCategory],
    ) -> Result<Vec<Event>> {
        let state = self.state.read().unwrap();
        if state.subscription_required {
            return Err(PipelineError::UpstreamAuth(
                "organization view is not enabled".to_string(),
            ));
        }
        Ok(state
            .events
            .iter()
            .filter(|e| e.last_update_time >= window.start && e.last_update_time <= window.end)
            .filter(|e| categories.is_empty() || categories.contains(&e.event_type_category))
            .cloned()
            .collect())
    }

    async fn describe_event(
        &self,
        arn: &EventArn,
        _account_id: &AccountId,
    ) -> Result<(Event, String)> {
        let state = self.state.read().unwrap();
        let event = state
            .events
            .iter()
            .find(|e| &e.arn == arn)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(format!("event {arn} not found")))?;
        let description = event.description.extract();
        Ok((event, description))
    }

    async fn list_affected_accounts(
        &self,
        arn: &EventArn,
        cap: Option<usize>,
    ) -> Result<Vec<AccountId>> {
        let state = self.state.read().unwrap();
        let mut accounts = state.affected_accounts.get(arn).cloned().unwrap_or_default();
        if let Some(cap) = cap {
            accounts.truncate(cap);
        }
        Ok(accounts)
    }

    async fn describe_affected_entities_page(
        &self,
        arn: &EventArn,
        account_ids: &[AccountId],
        page_token: Option<String>,
    ) -> Result<EntityPage> {
        let state = self.state.read().unwrap();
        let all: Vec<AffectedEntity> = state
            .entities
            .get(arn)
            .map(|entities| {
                entities
                    .iter()
                    .filter(|e| account_ids.contains(&e.account_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let start = page_token.and_then(|t| t.parse::<usize>().ok()).unwrap_or(0);
        let end = (start + FIXTURE_PAGE_SIZE).min(all.len());
        let entities = all.get(start..end).unwrap_or_default().to_vec();
        let next_token = if end < all.len() {
            Some(end.to_string())
        } else {
            None
        };

        Ok(EntityPage { entities, next_token })
    }

    async fn account_resources(
        &self,
        arn: &EventArn,
        account_id: &AccountId,
    ) -> Result<AccountResources> {
        let state = self.state.read().unwrap();
        Ok(state
            .resources
            .get(&(arn.clone(), account_id.clone()))
            .cloned()
            .unwrap_or_default())
    }
}
