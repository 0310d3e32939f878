//! SQL schema for the record store.

/// Single table keyed on `(event_arn, account_id)`. Most fields are stored
/// as their natural SQL type; `analysis` and the description/resource
/// strings are stored as plain text since the store never queries inside
/// them.
pub const CREATE_RECORDS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS records (
    event_arn               TEXT NOT NULL,
    account_id              TEXT NOT NULL,
    service                 TEXT NOT NULL,
    event_type_code         TEXT NOT NULL,
    event_type_category     TEXT NOT NULL,
    region                  TEXT NOT NULL,
    start_time              TEXT NOT NULL,
    last_update_time        TEXT NOT NULL,
    status_code             TEXT NOT NULL,
    description             TEXT NOT NULL,
    simplified_description  TEXT NOT NULL,
    account_name            TEXT NOT NULL,
    affected_resources      TEXT NOT NULL,
    analysis_json           TEXT NOT NULL,
    analysis_timestamp      TEXT NOT NULL,
    analysis_version        INTEGER NOT NULL,
    ttl                     TEXT NOT NULL,
    PRIMARY KEY (event_arn, account_id)
);
";

pub const CREATE_EVENT_TYPE_CATEGORY_INDEX: &str = "
CREATE INDEX IF NOT EXISTS idx_records_category
    ON records (event_type_category, last_update_time);
";

pub const CREATE_ACCOUNT_INDEX: &str = "
CREATE INDEX IF NOT EXISTS idx_records_account
    ON records (account_id);
";

pub const CREATE_COUNTERS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS counters (
    account_id       TEXT PRIMARY KEY,
    active_issues    INTEGER NOT NULL DEFAULT 0,
    notifications    INTEGER NOT NULL DEFAULT 0,
    scheduled        INTEGER NOT NULL DEFAULT 0,
    billing_changes  INTEGER NOT NULL DEFAULT 0,
    last_updated     TEXT
);
";
