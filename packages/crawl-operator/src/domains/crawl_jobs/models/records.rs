//! Durable records the operator reads from the metadata store.

use serde::{Deserialize, Serialize};

use crate::common::{CrawlConfigId, OrgId, UserId};

/// A crawl workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CrawlConfig {
    pub id: CrawlConfigId,
    pub oid: OrgId,
    pub name: String,
    pub scale: i32,
    /// Seconds; zero means no limit.
    pub crawl_timeout: i64,
    /// Bytes; zero means no limit.
    pub max_crawl_size: i64,
    pub crawler_channel: Option<String>,
    pub profile_filename: Option<String>,
    pub last_modified_by: UserId,
}

/// Tenant settings relevant to running crawls.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    pub storage_name: String,
    pub read_only: bool,
    /// Zero means unlimited.
    pub max_concurrent_crawls: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
}

/// Persisted state of a crawl record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRecordState {
    pub state: super::CrawlState,
    pub finished: Option<chrono::DateTime<chrono::Utc>>,
}
