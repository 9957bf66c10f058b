//! Scheduled jobs domain - cron triggers that start crawls

pub mod models;
pub mod reconciler;

pub use models::{TriggerSyncRequest, TriggerSyncResponse};
pub use reconciler::sync_scheduled_trigger;
