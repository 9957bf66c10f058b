//! Postgres-backed metadata store, quota oracle and crawl creator.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::common::{CrawlConfigId, OrgId, UserId};
use crate::domains::crawl_jobs::models::{
    CrawlConfig, CrawlFile, CrawlRecordState, CrawlState, CrawlStats, Organization, User,
};
use crate::kernel::{BaseCrawlCreator, BaseMetadataStore, BaseQuotaOracle};

#[derive(Clone)]
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn as_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl BaseMetadataStore for PgMetadataStore {
    async fn update_crawl_state_if_changed(
        &self,
        crawl_id: &str,
        state: CrawlState,
        finished: Option<DateTime<Utc>>,
        stats: Option<CrawlStats>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE crawls
             SET state = $2,
                 finished = COALESCE($3, finished),
                 stats_found = COALESCE($4, stats_found),
                 stats_done = COALESCE($5, stats_done),
                 stats_size = COALESCE($6, stats_size)
             WHERE id = $1 AND state <> $2",
        )
        .bind(crawl_id)
        .bind(state.as_str())
        .bind(finished)
        .bind(stats.map(|s| as_i64(s.found)))
        .bind(stats.map(|s| as_i64(s.done)))
        .bind(stats.and_then(|s| s.size).map(as_i64))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update state of crawl {}", crawl_id))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_crawl_state(&self, crawl_id: &str) -> Result<Option<CrawlRecordState>> {
        let row = sqlx::query_as::<_, (String, Option<DateTime<Utc>>)>(
            "SELECT state, finished FROM crawls WHERE id = $1",
        )
        .bind(crawl_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load crawl {}", crawl_id))?;

        Ok(row.map(|(state, finished)| CrawlRecordState {
            state: CrawlState::parse(&state).unwrap_or_default(),
            finished,
        }))
    }

    async fn add_crawl_file(&self, crawl_id: &str, file: &CrawlFile) -> Result<()> {
        sqlx::query(
            "INSERT INTO crawl_files (crawl_id, filename, size, hash, def_storage_name)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(crawl_id)
        .bind(&file.filename)
        .bind(as_i64(file.size))
        .bind(&file.hash)
        .bind(file.def_storage_name.as_deref())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to add file to crawl {}", crawl_id))?;
        Ok(())
    }

    async fn add_crawl_errors(&self, crawl_id: &str, errors: &[String]) -> Result<()> {
        sqlx::query(
            "INSERT INTO crawl_errors (crawl_id, message)
             SELECT $1, UNNEST($2::text[])",
        )
        .bind(crawl_id)
        .bind(errors)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to add errors to crawl {}", crawl_id))?;
        Ok(())
    }

    async fn stats_recompute_last(
        &self,
        cid: CrawlConfigId,
        files_added_size: u64,
        inc_crawls: i64,
    ) -> Result<()> {
        sqlx::query(
            "WITH last AS (
                 SELECT id, state, finished FROM crawls
                 WHERE cid = $1 AND finished IS NOT NULL
                 ORDER BY finished DESC
                 LIMIT 1
             )
             UPDATE crawl_configs
             SET crawl_count = crawl_count + $2,
                 total_size = total_size + $3,
                 last_crawl_id = (SELECT id FROM last),
                 last_crawl_state = (SELECT state FROM last),
                 last_crawl_finished = (SELECT finished FROM last)
             WHERE id = $1",
        )
        .bind(cid)
        .bind(inc_crawls)
        .bind(as_i64(files_added_size))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to recompute stats for crawl config {}", cid))?;
        Ok(())
    }

    async fn add_successful_crawl_to_collections(
        &self,
        crawl_id: &str,
        cid: CrawlConfigId,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            "INSERT INTO collection_crawls (collection_id, crawl_id)
             SELECT UNNEST(auto_add_collections), $1 FROM crawl_configs WHERE id = $2
             ON CONFLICT DO NOTHING",
        )
        .bind(crawl_id)
        .bind(cid)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to add crawl {} to collections", crawl_id))?;

        sqlx::query(
            "UPDATE collections SET modified = NOW()
             WHERE id IN (SELECT UNNEST(auto_add_collections) FROM crawl_configs WHERE id = $1)",
        )
        .bind(cid)
        .execute(&mut *tx)
        .await
        .context("Failed to touch collections")?;

        tx.commit().await.context("Failed to commit collection update")?;
        Ok(())
    }

    async fn inc_org_exec_seconds(&self, oid: OrgId, seconds: i64, month: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO org_exec_seconds (oid, month, seconds)
             VALUES ($1, $2, $3)
             ON CONFLICT (oid, month) DO UPDATE
             SET seconds = org_exec_seconds.seconds + EXCLUDED.seconds",
        )
        .bind(oid)
        .bind(month)
        .bind(seconds)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to add execution time for org {}", oid))?;
        Ok(())
    }

    async fn get_crawl_config(&self, cid: CrawlConfigId) -> Result<Option<CrawlConfig>> {
        sqlx::query_as::<_, CrawlConfig>(
            "SELECT id, oid, name, scale, crawl_timeout, max_crawl_size,
                    crawler_channel, profile_filename, last_modified_by
             FROM crawl_configs WHERE id = $1",
        )
        .bind(cid)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load crawl config {}", cid))
    }

    async fn get_org(&self, oid: OrgId) -> Result<Option<Organization>> {
        sqlx::query_as::<_, Organization>(
            "SELECT id, name, storage_name, read_only, max_concurrent_crawls
             FROM organizations WHERE id = $1",
        )
        .bind(oid)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load org {}", oid))
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT id, email, name FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to load user {}", id))
    }
}

#[async_trait]
impl BaseQuotaOracle for PgMetadataStore {
    async fn max_concurrent_crawls(&self, oid: OrgId) -> Result<u32> {
        let limit = sqlx::query_scalar::<_, i32>(
            "SELECT max_concurrent_crawls FROM organizations WHERE id = $1",
        )
        .bind(oid)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load crawl quota for org {}", oid))?;

        Ok(limit.and_then(|l| u32::try_from(l).ok()).unwrap_or(0))
    }
}

#[async_trait]
impl BaseCrawlCreator for PgMetadataStore {
    async fn add_new_crawl(
        &self,
        crawl_id: &str,
        config: &CrawlConfig,
        user: &User,
        manual: bool,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO crawls (id, cid, oid, userid, manual, scale, state, started)
             VALUES ($1, $2, $3, $4, $5, $6, 'starting', NOW())
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(crawl_id)
        .bind(config.id)
        .bind(config.oid)
        .bind(user.id)
        .bind(manual)
        .bind(config.scale.max(1))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to create crawl {}", crawl_id))?;

        Ok(result.rows_affected() > 0)
    }
}
