//! Operator dependencies (using traits for testability)
//!
//! This module provides the dependency container handed to every reconciler.
//! All external services sit behind trait objects so tests can swap in the
//! in-memory fakes from `test_dependencies`.

use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;

use crate::config::{Config, OperatorParams};
use crate::kernel::{
    BaseClusterClient, BaseCrawlCreator, BaseMetadataStore, BaseProgressStoreConnector,
    BaseQuotaOracle, BaseResourceRenderer, DefaultResourceRenderer, KubeClusterClient,
    PgMetadataStore, RedisConnector, TaskPool,
};

#[derive(Clone)]
pub struct OperatorDeps {
    /// Startup parameters; immutable for the life of the process
    pub params: Arc<OperatorParams>,
    pub metadata: Arc<dyn BaseMetadataStore>,
    pub quotas: Arc<dyn BaseQuotaOracle>,
    pub crawl_creator: Arc<dyn BaseCrawlCreator>,
    /// Opens the per-crawl progress store
    pub progress: Arc<dyn BaseProgressStoreConnector>,
    pub cluster: Arc<dyn BaseClusterClient>,
    pub renderer: Arc<dyn BaseResourceRenderer>,
    /// Background work started by reconciliation
    pub tasks: TaskPool,
}

impl OperatorDeps {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: OperatorParams,
        metadata: Arc<dyn BaseMetadataStore>,
        quotas: Arc<dyn BaseQuotaOracle>,
        crawl_creator: Arc<dyn BaseCrawlCreator>,
        progress: Arc<dyn BaseProgressStoreConnector>,
        cluster: Arc<dyn BaseClusterClient>,
        renderer: Arc<dyn BaseResourceRenderer>,
        tasks: TaskPool,
    ) -> Self {
        Self {
            params: Arc::new(params),
            metadata,
            quotas,
            crawl_creator,
            progress,
            cluster,
            renderer,
            tasks,
        }
    }

    /// Production wiring: postgres for records, redis per crawl, the
    /// in-cluster API for deletes.
    pub fn from_config(config: &Config, pool: PgPool) -> Result<Self> {
        let store = Arc::new(PgMetadataStore::new(pool));
        let cluster =
            KubeClusterClient::in_cluster(&config.kubernetes_api_url, &config.operator.namespace)?;

        Ok(Self::new(
            config.operator.clone(),
            store.clone(),
            store.clone(),
            store,
            Arc::new(RedisConnector),
            Arc::new(cluster),
            Arc::new(DefaultResourceRenderer::new(config.operator.clone())),
            TaskPool::new(),
        ))
    }
}
