// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no reconciliation logic.
// The crawl state machine, admission and finalization live in the domains and
// only talk to the outside world through these traits.
//
// Naming convention: Base* for trait names (e.g., BaseProgressStore, BaseClusterClient)

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::common::{CrawlConfigId, OrgId, UserId};
use crate::domains::crawl_jobs::models::{
    CrawlConfig, CrawlFile, CrawlRecordState, CrawlState, CrawlStats, Organization, User,
};
use crate::kernel::renderer::RenderRequest;

// =============================================================================
// Progress Store (per-crawl key/value + list store shared with the workers)
// =============================================================================

#[async_trait]
pub trait BaseProgressStore: Send + Sync {
    /// Round-trip to prove the store is reachable
    async fn ping(&self) -> Result<()>;

    /// Pop the head of a list; `None` once the list is empty
    async fn lpop(&self, key: &str) -> Result<Option<String>>;

    /// Inclusive range of a list, like redis `LRANGE`
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    async fn llen(&self, key: &str) -> Result<u64>;

    async fn scard(&self, key: &str) -> Result<u64>;

    /// Read a numeric counter; missing keys read as zero
    async fn get_counter(&self, key: &str) -> Result<u64>;

    /// Increment a counter and return the new value
    async fn incr_by(&self, key: &str, delta: u64) -> Result<u64>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Set only if the key does not exist yet; true when this call set it
    async fn set_nx(&self, key: &str, value: &str) -> Result<bool>;

    async fn hvals(&self, key: &str) -> Result<Vec<String>>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;
}

/// Opens a handle to the progress store of one crawl.
#[async_trait]
pub trait BaseProgressStoreConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn BaseProgressStore>>;
}

// =============================================================================
// Metadata Store (durable crawl, config, collection and org records)
// =============================================================================

#[async_trait]
pub trait BaseMetadataStore: Send + Sync {
    /// Write the new state unless the record already has it.
    /// Returns true when the record changed.
    async fn update_crawl_state_if_changed(
        &self,
        crawl_id: &str,
        state: CrawlState,
        finished: Option<DateTime<Utc>>,
        stats: Option<CrawlStats>,
    ) -> Result<bool>;

    async fn get_crawl_state(&self, crawl_id: &str) -> Result<Option<CrawlRecordState>>;

    async fn add_crawl_file(&self, crawl_id: &str, file: &CrawlFile) -> Result<()>;

    async fn add_crawl_errors(&self, crawl_id: &str, errors: &[String]) -> Result<()>;

    /// Refresh the crawl-config's last-crawl fields and running totals
    async fn stats_recompute_last(
        &self,
        cid: CrawlConfigId,
        files_added_size: u64,
        inc_crawls: i64,
    ) -> Result<()>;

    /// Add the crawl to every collection its crawl-config auto-adds to
    async fn add_successful_crawl_to_collections(
        &self,
        crawl_id: &str,
        cid: CrawlConfigId,
    ) -> Result<()>;

    /// Accrue execution seconds to the org under a `YYYY-MM` bucket
    async fn inc_org_exec_seconds(&self, oid: OrgId, seconds: i64, month: &str) -> Result<()>;

    async fn get_crawl_config(&self, cid: CrawlConfigId) -> Result<Option<CrawlConfig>>;

    async fn get_org(&self, oid: OrgId) -> Result<Option<Organization>>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>>;
}

// =============================================================================
// Quota Oracle
// =============================================================================

#[async_trait]
pub trait BaseQuotaOracle: Send + Sync {
    /// Concurrent crawl limit for an org; zero means unlimited
    async fn max_concurrent_crawls(&self, oid: OrgId) -> Result<u32>;
}

// =============================================================================
// Crawl Creation
// =============================================================================

#[async_trait]
pub trait BaseCrawlCreator: Send + Sync {
    /// Insert the crawl record for a new run of a crawl-config.
    /// Returns false when a record with this id already exists.
    async fn add_new_crawl(
        &self,
        crawl_id: &str,
        config: &CrawlConfig,
        user: &User,
        manual: bool,
    ) -> Result<bool>;
}

// =============================================================================
// Cluster Client (deletes the controller will not delete for us)
// =============================================================================

#[async_trait]
pub trait BaseClusterClient: Send + Sync {
    async fn delete_crawl_job(&self, crawl_id: &str) -> Result<()>;

    /// Delete every volume claim labelled with the crawl id
    async fn delete_pvcs(&self, crawl_id: &str) -> Result<()>;

    async fn delete_profile_browser(&self, browser_id: &str) -> Result<()>;
}

// =============================================================================
// Resource Renderer (parameters in, child resource descriptors out)
// =============================================================================

pub trait BaseResourceRenderer: Send + Sync {
    fn render(&self, request: &RenderRequest) -> Result<Vec<Value>>;
}
