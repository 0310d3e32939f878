//! # orgevents-pipeline
//!
//! Organization-wide health-event ingestion and analysis pipeline.
//!
//! Pulls operational/maintenance/security events from an upstream
//! organization-wide health feed, fans them out across every account an
//! event affects, enriches each per-account record with an AI-generated risk
//! assessment and a per-account resource status, persists the result in a
//! keyed store, and maintains a small live per-account counter table.
//!
//! ## Pipeline
//!
//! ```text
//!  Scheduler (C10)
//!      │
//!      ├─ timer: scheduled_sync ──▶ HealthFeed (C1) ──▶ Dispatcher (C4) ──▶ WorkQueue
//!      │                                                     │ (one LLM call per unique ARN)
//!      │                                                     ▼
//!      ├─ queue delivery ──────────────────────────▶ WorkUnitWorker (C5)
//!      │                                                     │
//!      │                                       StatusResolver (C6) ──▶ RecordStore (C7)
//!      │                                                                     │ change stream
//!      ├─ change-stream delivery ──▶ ChangeStreamReactor (C9) ◀──────────────┘
//!      │                                     │
//!      └─ timer: recalculate_counts ──▶ Counters (C8) ◀──── incremental update
//! ```
//!
//! ## Modules
//! - [`health`]: organization health feed adapter and normalization (C1)
//! - [`directory`]: account id → account name cache (C2)
//! - [`llm`]: per-event risk analyzer with retry and fallback (C3)
//! - [`dispatch`]: fan-out and batch planning (C4)
//! - [`worker`]: per-batch queue consumer (C5)
//! - [`status`]: per-account status resolution (C6)
//! - [`store`]: keyed record store with TTL and change stream (C7)
//! - [`counters`]: per-account counter materializer (C8)
//! - [`reactor`]: change-stream consumer driving incremental counters (C9)
//! - [`scheduler`]: trigger classification and routing (C10)
//! - [`queue`]: work queue abstraction and message envelopes
//! - [`readapi`]: out-of-scope external read/write interfaces, as seams only

pub mod config;
pub mod counters;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod llm;
pub mod queue;
pub mod reactor;
pub mod readapi;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod types;
pub mod worker;

pub use config::Config;
pub use error::PipelineError;
