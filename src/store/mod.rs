//! Keyed record store with TTL stamping and a change stream (C7).
//!
//! Grounded on this codebase's SQLite-backed persistence layer: a
//! `rusqlite` connection behind a mutex, with reads and writes expressed as
//! prepared statements rather than an ORM.

mod schema;

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::broadcast;

use crate::error::{PipelineError, Result};
use crate::types::{AccountId, Analysis, Counters, EventArn, EventCategory, Record, StatusCode};

/// Window used by [`RecordStore::list_by_category`], in terms of
/// `last_update_time`.
#[derive(Debug, Clone, Copy)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Marker distinguishing a TTL-driven removal from a user-initiated one,
/// per the upstream change-stream's `userIdentity` tag.
pub const TTL_SERVICE_IDENTITY: &str = "ttl-service";

/// One entry on the change stream: mirrors the store's create/modify/remove
/// notifications, each carrying the images C9 needs without it having to
/// inspect raw rows.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Insert { new: Record },
    Modify { old: Record, new: Record },
    Remove { old: Record, user_identity: String },
}

impl ChangeEvent {
    /// `true` iff this is a TTL expiry rather than a user-initiated delete.
    pub fn is_ttl_expiry(&self) -> bool {
        matches!(self, ChangeEvent::Remove { user_identity, .. } if user_identity == TTL_SERVICE_IDENTITY)
    }

    pub fn event_arn(&self) -> &EventArn {
        match self {
            ChangeEvent::Insert { new } => &new.event_arn,
            ChangeEvent::Modify { new, .. } => &new.event_arn,
            ChangeEvent::Remove { old, .. } => &old.event_arn,
        }
    }
}

/// Upserts per-account event records keyed by `(eventArn, accountId)`,
/// stamping TTL on write and broadcasting every mutation.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn upsert(&self, record: Record) -> Result<()>;
    async fn get(&self, arn: &EventArn, account_id: &AccountId) -> Result<Option<Record>>;
    async fn list_by_category(
        &self,
        category: EventCategory,
        window: DateWindow,
    ) -> Result<Vec<Record>>;
    async fn list_by_account(&self, account_id: &AccountId) -> Result<Vec<Record>>;

    /// Every record sharing `arn`, regardless of account — the grouping
    /// the counter materializer's ARN-set rule operates on.
    async fn list_by_arn(&self, arn: &EventArn) -> Result<Vec<Record>>;

    async fn scan(&self) -> Result<Vec<Record>>;

    /// Expires any record whose `ttl` is at or before `now`, emitting a
    /// `Remove` change event tagged with [`TTL_SERVICE_IDENTITY`] for each.
    async fn expire_due(&self, now: DateTime<Utc>) -> Result<usize>;

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}

/// Per-account counter rows (C8's materialized output). Kept as a separate
/// trait from [`RecordStore`] since the counter table is a derived view,
/// not the source of truth.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get_counters(&self, account_id: &AccountId) -> Result<Counters>;
    async fn put_counters(&self, counters: Counters) -> Result<()>;
    async fn all_counters(&self) -> Result<Vec<Counters>>;
}

/// `ttl = max(lastUpdateTime, startTime) + retentionWindow`. `startTime` is
/// date-only; it's compared at midnight UTC so a future-dated scheduled
/// event's TTL is anchored to its start date, not its last-touched time.
pub fn compute_ttl(record_last_update: DateTime<Utc>, start_time: chrono::NaiveDate, retention: Duration) -> DateTime<Utc> {
    let start_as_of_midnight = DateTime::<Utc>::from_naive_utc_and_offset(
        start_time.and_time(NaiveTime::MIN),
        Utc,
    );
    record_last_update.max(start_as_of_midnight) + retention
}

pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<ChangeEvent>,
    retention: Duration,
}

impl SqliteRecordStore {
    pub fn open(path: &str, retention_window_days: i64) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute(schema::CREATE_RECORDS_TABLE, [])?;
        conn.execute(schema::CREATE_EVENT_TYPE_CATEGORY_INDEX, [])?;
        conn.execute(schema::CREATE_ACCOUNT_INDEX, [])?;
        conn.execute(schema::CREATE_COUNTERS_TABLE, [])?;
        let (tx, _rx) = broadcast::channel(1024);
        Ok(Self {
            conn: Mutex::new(conn),
            changes: tx,
            retention: Duration::days(retention_window_days),
        })
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
        let analysis_json: String = row.get("analysis_json")?;
        let analysis: Analysis = serde_json::from_str(&analysis_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let event_type_category: String = row.get("event_type_category")?;
        let status_code: String = row.get("status_code")?;

        Ok(Record {
            event_arn: row.get("event_arn")?,
            account_id: row.get("account_id")?,
            service: row.get("service")?,
            event_type_code: row.get("event_type_code")?,
            event_type_category: parse_category(&event_type_category),
            region: row.get("region")?,
            start_time: row.get::<_, String>("start_time")?.parse().unwrap_or_default(),
            last_update_time: row
                .get::<_, String>("last_update_time")?
                .parse()
                .unwrap_or_else(|_| Utc::now()),
            status_code: status_code.parse().unwrap_or(StatusCode::Unknown),
            description: row.get("description")?,
            simplified_description: row.get("simplified_description")?,
            account_name: row.get("account_name")?,
            affected_resources: row.get("affected_resources")?,
            analysis,
            analysis_timestamp: parse_fixed_timestamp(&row.get::<_, String>("analysis_timestamp")?),
            analysis_version: row.get::<_, i64>("analysis_version")? as u32,
            ttl: row.get::<_, String>("ttl")?.parse().unwrap_or_else(|_| Utc::now()),
        })
    }

    fn fetch(conn: &Connection, arn: &str, account_id: &str) -> rusqlite::Result<Option<Record>> {
        conn.query_row(
            "SELECT * FROM records WHERE event_arn = ?1 AND account_id = ?2",
            params![arn, account_id],
            |row| Self::row_to_record(row),
        )
        .optional()
    }
}

/// Parses the fixed `YYYY-MM-DD HH:MM:SS` UTC timestamp format writes are
/// stamped with.
fn parse_fixed_timestamp(s: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_category(s: &str) -> EventCategory {
    match s {
        "accountNotification" => EventCategory::AccountNotification,
        "scheduledChange" => EventCategory::ScheduledChange,
        _ => EventCategory::Issue,
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn upsert(&self, mut record: Record) -> Result<()> {
        record.ttl = compute_ttl(record.last_update_time, record.start_time, self.retention);
        record.analysis_timestamp = Utc::now();

        let conn = self.conn.lock().unwrap();
        let previous = Self::fetch(&conn, &record.event_arn, &record.account_id)?;

        let analysis_json = serde_json::to_string(&record.analysis)
            .map_err(|e| PipelineError::ValidationError(e.to_string()))?;
        let analysis_timestamp = record.analysis_timestamp.format("%Y-%m-%d %H:%M:%S").to_string();

        conn.execute(
            "INSERT INTO records (
                event_arn, account_id, service, event_type_code, event_type_category,
                region, start_time, last_update_time, status_code, description,
                simplified_description, account_name, affected_resources,
                analysis_json, analysis_timestamp, analysis_version, ttl
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)
             ON CONFLICT(event_arn, account_id) DO UPDATE SET
                service = excluded.service,
                event_type_code = excluded.event_type_code,
                event_type_category = excluded.event_type_category,
                region = excluded.region,
                start_time = excluded.start_time,
                last_update_time = excluded.last_update_time,
                status_code = excluded.status_code,
                description = excluded.description,
                simplified_description = excluded.simplified_description,
                account_name = excluded.account_name,
                affected_resources = excluded.affected_resources,
                analysis_json = excluded.analysis_json,
                analysis_timestamp = excluded.analysis_timestamp,
                analysis_version = excluded.analysis_version,
                ttl = excluded.ttl",
            params![
                record.event_arn,
                record.account_id,
                record.service,
                record.event_type_code,
                record.event_type_category.to_string(),
                record.region,
                record.start_time.to_string(),
                record.last_update_time.to_rfc3339(),
                record.status_code.to_string(),
                record.description,
                record.simplified_description,
                record.account_name,
                record.affected_resources,
                analysis_json,
                analysis_timestamp,
                record.analysis_version,
                record.ttl.to_rfc3339(),
            ],
        )?;

        let event = match previous {
            Some(old) => ChangeEvent::Modify { old, new: record },
            None => ChangeEvent::Insert { new: record },
        };
        let _ = self.changes.send(event);
        Ok(())
    }

    async fn get(&self, arn: &EventArn, account_id: &AccountId) -> Result<Option<Record>> {
        let conn = self.conn.lock().unwrap();
        Ok(Self::fetch(&conn, arn, account_id)?)
    }

    async fn list_by_category(
        &self,
        category: EventCategory,
        window: DateWindow,
    ) -> Result<Vec<Record>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM records WHERE event_type_category = ?1
             AND last_update_time >= ?2 AND last_update_time <= ?3",
        )?;
        let rows = stmt.query_map(
            params![category.to_string(), window.start.to_rfc3339(), window.end.to_rfc3339()],
            Self::row_to_record,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn list_by_account(&self, account_id: &AccountId) -> Result<Vec<Record>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM records WHERE account_id = ?1")?;
        let rows = stmt.query_map(params![account_id], Self::row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn list_by_arn(&self, arn: &EventArn) -> Result<Vec<Record>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM records WHERE event_arn = ?1")?;
        let rows = stmt.query_map(params![arn], Self::row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn scan(&self) -> Result<Vec<Record>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM records")?;
        let rows = stmt.query_map([], Self::row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare("SELECT * FROM records WHERE ttl <= ?1")?;
            let rows = stmt.query_map(params![now.to_rfc3339()], Self::row_to_record)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let count = due.len();
        for record in due {
            {
                let conn = self.conn.lock().unwrap();
                conn.execute(
                    "DELETE FROM records WHERE event_arn = ?1 AND account_id = ?2",
                    params![record.event_arn, record.account_id],
                )?;
            }
            let _ = self.changes.send(ChangeEvent::Remove {
                old: record,
                user_identity: TTL_SERVICE_IDENTITY.to_string(),
            });
        }
        Ok(count)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}

fn row_to_counters(row: &rusqlite::Row<'_>) -> rusqlite::Result<Counters> {
    let last_updated: Option<String> = row.get("last_updated")?;
    Ok(Counters {
        account_id: row.get("account_id")?,
        active_issues: row.get::<_, i64>("active_issues")? as u64,
        notifications: row.get::<_, i64>("notifications")? as u64,
        scheduled: row.get::<_, i64>("scheduled")? as u64,
        billing_changes: row.get::<_, i64>("billing_changes")? as u64,
        last_updated: last_updated.map(|s| parse_fixed_timestamp(&s)),
    })
}

#[async_trait]
impl CounterStore for SqliteRecordStore {
    async fn get_counters(&self, account_id: &AccountId) -> Result<Counters> {
        let conn = self.conn.lock().unwrap();
        let counters = conn
            .query_row(
                "SELECT * FROM counters WHERE account_id = ?1",
                params![account_id],
                row_to_counters,
            )
            .optional()?;
        Ok(counters.unwrap_or_else(|| Counters { account_id: account_id.clone(), ..Default::default() }))
    }

    async fn put_counters(&self, counters: Counters) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let last_updated = counters
            .last_updated
            .unwrap_or_else(Utc::now)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        conn.execute(
            "INSERT INTO counters (
                account_id, active_issues, notifications, scheduled, billing_changes, last_updated
             ) VALUES (?1,?2,?3,?4,?5,?6)
             ON CONFLICT(account_id) DO UPDATE SET
                active_issues = excluded.active_issues,
                notifications = excluded.notifications,
                scheduled = excluded.scheduled,
                billing_changes = excluded.billing_changes,
                last_updated = excluded.last_updated",
            params![
                counters.account_id,
                counters.active_issues as i64,
                counters.notifications as i64,
                counters.scheduled as i64,
                counters.billing_changes as i64,
                last_updated,
            ],
        )?;
        Ok(())
    }

    async fn all_counters(&self) -> Result<Vec<Counters>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM counters")?;
        let rows = stmt.query_map([], row_to_counters)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RiskLevel;

    fn sample_record(arn: &str, account_id: &str, status: StatusCode) -> Record {
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
            status_code: status,
            description: "desc".to_string(),
            simplified_description: "EC2 - Service disruptions".to_string(),
            account_name: "prod".to_string(),
            affected_resources: "i-123".to_string(),
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

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let store = SqliteRecordStore::open(":memory:", 180).unwrap();
        let record = sample_record("arn:1", "111111111111", StatusCode::Open);
        store.upsert(record.clone()).await.unwrap();

        let fetched = store
            .get(&"arn:1".to_string(), &"111111111111".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.status_code, StatusCode::Open);
        assert!(fetched.ttl >= record.last_update_time);
    }

    #[tokio::test]
    async fn upsert_emits_insert_then_modify() {
        let store = SqliteRecordStore::open(":memory:", 180).unwrap();
        let mut rx = store.subscribe();

        store
            .upsert(sample_record("arn:1", "111111111111", StatusCode::Open))
            .await
            .unwrap();
        assert!(matches!(rx.recv().await.unwrap(), ChangeEvent::Insert { .. }));

        store
            .upsert(sample_record("arn:1", "111111111111", StatusCode::Closed))
            .await
            .unwrap();
        assert!(matches!(rx.recv().await.unwrap(), ChangeEvent::Modify { .. }));
    }

    #[tokio::test]
    async fn expire_due_emits_ttl_tagged_remove() {
        let store = SqliteRecordStore::open(":memory:", 180).unwrap();
        let mut record = sample_record("arn:1", "111111111111", StatusCode::Open);
        record.ttl = Utc::now() - Duration::days(1);
        store.upsert(record).await.unwrap();

        let mut rx = store.subscribe();
        // upsert recomputes ttl forward, so force an immediate expiry window.
        let expired = store.expire_due(Utc::now() + Duration::days(400)).await.unwrap();
        assert_eq!(expired, 1);

        let event = rx.recv().await.unwrap();
        assert!(event.is_ttl_expiry());
    }

    #[tokio::test]
    async fn list_by_arn_returns_every_account_on_that_arn() {
        let store = SqliteRecordStore::open(":memory:", 180).unwrap();
        store.upsert(sample_record("arn:1", "A", StatusCode::Open)).await.unwrap();
        store.upsert(sample_record("arn:1", "B", StatusCode::Closed)).await.unwrap();
        store.upsert(sample_record("arn:2", "A", StatusCode::Open)).await.unwrap();

        let records = store.list_by_arn(&"arn:1".to_string()).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn counter_store_round_trips_and_defaults_to_zero() {
        let store = SqliteRecordStore::open(":memory:", 180).unwrap();
        let fresh = store.get_counters(&"A".to_string()).await.unwrap();
        assert_eq!(fresh.active_issues, 0);

        let mut counters = fresh;
        counters.active_issues = 3;
        store.put_counters(counters).await.unwrap();

        let reloaded = store.get_counters(&"A".to_string()).await.unwrap();
        assert_eq!(reloaded.active_issues, 3);
        assert!(reloaded.last_updated.is_some());
    }

    #[test]
    fn compute_ttl_anchors_to_later_of_update_and_start() {
        let now = Utc::now();
        let future_start = (now + Duration::days(30)).date_naive();
        let ttl = compute_ttl(now, future_start, Duration::days(180));
        assert!(ttl >= now + Duration::days(30) + Duration::days(180) - Duration::days(1));
    }
}
