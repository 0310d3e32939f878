//! Shared data model: events, per-account records, counters, and the
//! tagged variants the upstream feed's quirks demand.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Opaque, globally unique event identifier from the upstream feed.
pub type EventArn = String;

/// Upstream account identifier.
pub type AccountId = String;

/// `eventTypeCategory` as defined by the upstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventCategory {
    Issue,
    AccountNotification,
    ScheduledChange,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventCategory::Issue => "issue",
            EventCategory::AccountNotification => "accountNotification",
            EventCategory::ScheduledChange => "scheduledChange",
        };
        write!(f, "{s}")
    }
}

/// Per-account status code. Stored per `(eventArn, accountId)`, never per
/// event: two records sharing an `eventArn` may carry different values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCode {
    Open,
    Upcoming,
    Scheduled,
    Closed,
    Unknown,
}

impl StatusCode {
    /// `statusCode ∈ {open, upcoming, scheduled}` — contributes to counters.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            StatusCode::Open | StatusCode::Upcoming | StatusCode::Scheduled
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusCode::Open => "open",
            StatusCode::Upcoming => "upcoming",
            StatusCode::Scheduled => "scheduled",
            StatusCode::Closed => "closed",
            StatusCode::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for StatusCode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "open" => StatusCode::Open,
            "upcoming" => StatusCode::Upcoming,
            "scheduled" => StatusCode::Scheduled,
            "closed" => StatusCode::Closed,
            _ => StatusCode::Unknown,
        })
    }
}

/// Upstream descriptions arrive as an object, a list, or a plain string.
/// This tagged variant models the quirk once so every caller normalizes
/// through [`Description::extract`] instead of duck-typing JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Description {
    Object { #[serde(rename = "latestDescription")] latest: Option<String> },
    List(Vec<Description>),
    Plain(String),
    Empty,
}

impl Description {
    /// Flatten any of the three upstream shapes into a single string.
    pub fn extract(&self) -> String {
        match self {
            Description::Object { latest } => latest.clone().unwrap_or_default(),
            Description::List(items) => items
                .first()
                .map(Description::extract)
                .unwrap_or_default(),
            Description::Plain(s) => s.clone(),
            Description::Empty => String::new(),
        }
    }
}

/// Risk level assigned by the analyzer, normalized to uppercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Critical => "CRITICAL",
            RiskLevel::High => "HIGH",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::Low => "LOW",
        };
        write!(f, "{s}")
    }
}

/// The AI-generated risk assessment attached to every record sharing an
/// `eventArn` within one processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub critical: bool,
    pub risk_level: RiskLevel,
    pub time_sensitivity: String,
    pub risk_category: String,
    pub impact_analysis: String,
    pub required_actions: String,
    pub consequences_if_ignored: String,
    pub event_impact_type: String,
    /// Raw model output, kept for future re-parsing.
    pub analysis_text: String,
    /// True when this analysis was synthesized by the deterministic
    /// fallback rather than produced by the model. Eligible for
    /// re-analysis on the next pass.
    pub is_fallback: bool,
}

/// One upstream health notification, prior to per-account fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub arn: EventArn,
    pub service: String,
    pub event_type_code: String,
    pub event_type_category: EventCategory,
    pub region: String,
    pub start_time: NaiveDate,
    pub last_update_time: DateTime<Utc>,
    /// Event-level status as reported by the feed; per-account status is
    /// resolved separately by [`crate::status`].
    pub status_code: StatusCode,
    pub description: Description,
}

impl Event {
    /// `region` normalized per the upstream quirk: empty/absent becomes
    /// `"global"`.
    pub fn normalized_region(&self) -> &str {
        if self.region.trim().is_empty() {
            "global"
        } else {
            &self.region
        }
    }
}

/// One stored per-account realization of an event. `(event_arn, account_id)`
/// is its key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub event_arn: EventArn,
    pub account_id: AccountId,
    pub service: String,
    pub event_type_code: String,
    pub event_type_category: EventCategory,
    pub region: String,
    pub start_time: NaiveDate,
    pub last_update_time: DateTime<Utc>,
    pub status_code: StatusCode,
    pub description: String,
    pub simplified_description: String,
    pub account_name: String,
    pub affected_resources: String,
    pub analysis: Analysis,
    pub analysis_timestamp: DateTime<Utc>,
    pub analysis_version: u32,
    pub ttl: DateTime<Utc>,
}

impl Record {
    /// `true` iff this record's analysis is real (not the deterministic
    /// fallback) and every analysis field is populated — the condition the
    /// dispatcher uses to mark an `(arn, account)` pair as "reuse".
    pub fn has_valid_analysis(&self) -> bool {
        !self.analysis.is_fallback
            && !self.analysis.impact_analysis.trim().is_empty()
            && !self.analysis.required_actions.trim().is_empty()
            && !self.analysis.consequences_if_ignored.trim().is_empty()
    }
}

/// Counter category a record's `eventTypeCategory`/`service` maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CounterCategory {
    ActiveIssues,
    Notifications,
    Scheduled,
    BillingChanges,
}

impl CounterCategory {
    /// `service == "BILLING" ⇒ billing_changes; else eventTypeCategory ⇒ …`.
    /// Returns `None` when no category rule matches (the ARN is skipped).
    pub fn for_record(service: &str, category: EventCategory) -> Option<Self> {
        if service.eq_ignore_ascii_case("BILLING") {
            return Some(CounterCategory::BillingChanges);
        }
        Some(match category {
            EventCategory::AccountNotification => CounterCategory::Notifications,
            EventCategory::Issue => CounterCategory::ActiveIssues,
            EventCategory::ScheduledChange => CounterCategory::Scheduled,
        })
    }
}

/// One per-account counter row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counters {
    pub account_id: AccountId,
    pub active_issues: u64,
    pub notifications: u64,
    pub scheduled: u64,
    pub billing_changes: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Counters {
    pub fn get(&self, category: CounterCategory) -> u64 {
        match category {
            CounterCategory::ActiveIssues => self.active_issues,
            CounterCategory::Notifications => self.notifications,
            CounterCategory::Scheduled => self.scheduled,
            CounterCategory::BillingChanges => self.billing_changes,
        }
    }

    pub fn set(&mut self, category: CounterCategory, value: u64) {
        match category {
            CounterCategory::ActiveIssues => self.active_issues = value,
            CounterCategory::Notifications => self.notifications = value,
            CounterCategory::Scheduled => self.scheduled = value,
            CounterCategory::BillingChanges => self.billing_changes = value,
        }
    }

    /// Decrement a category, clamped at zero (never negative).
    pub fn decrement(&mut self, category: CounterCategory) {
        let current = self.get(category);
        self.set(category, current.saturating_sub(1));
    }
}

/// A saved filter, used by the external dashboard/events API (out of
/// scope for implementation; modeled so the read seam type-checks).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub filter_id: String,
    pub filter_name: String,
    pub description: String,
    pub account_ids: Vec<AccountId>,
}

/// Read-model projection where records sharing an `eventArn` are merged and
/// `accountIds` collapses to a map `accountId → accountName`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedEvent {
    pub event_arn: EventArn,
    pub service: String,
    pub event_type_code: String,
    pub event_type_category: EventCategory,
    pub region: String,
    pub simplified_description: String,
    pub accounts: HashMap<AccountId, String>,
}
