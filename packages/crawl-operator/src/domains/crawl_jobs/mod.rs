//! Crawl jobs domain - reconciliation of CrawlJob resources
//!
//! # Components
//!
//! - `models/` - Typed request, response, spec and status shapes
//! - `machines/` - Pure outcome decisions (no IO)
//! - `admission` - Per-org concurrency limits
//! - `progress` - Mailbox drain and status refresh
//! - `finalizer` - State transitions, cancellation, teardown
//! - `reconciler` - The sync entry point tying it together
//! - `related` - Label queries for the customize hook
//! - `keys` - Progress-store key schema

pub mod admission;
pub mod finalizer;
pub mod keys;
pub mod machines;
pub mod models;
pub mod progress;
pub mod reconciler;
pub mod related;

pub use finalizer::{CancelOutcome, StateChange};
pub use reconciler::sync_crawl;
pub use related::related_resources;
