//! Fail-fast access to a crawl's progress store.

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::OperatorParams;
use crate::kernel::{BaseProgressStore, BaseProgressStoreConnector};

/// Connect and ping, giving up after a few immediate attempts.
///
/// Every attempt is bounded by the store timeout and there is no sleep in
/// between: an unreachable store is reported to the caller, which returns
/// unchanged status and lets the next reconciliation cycle retry.
pub async fn connect_progress_store(
    connector: &dyn BaseProgressStoreConnector,
    params: &OperatorParams,
    crawl_id: &str,
) -> Result<Arc<dyn BaseProgressStore>> {
    let url = params.redis_url(crawl_id);
    let attempts = params.progress_store_connect_attempts.max(1);
    let mut last_error = anyhow!("progress store never attempted");

    for attempt in 1..=attempts {
        match try_connect(connector, &url, params.progress_store_timeout).await {
            Ok(store) => return Ok(store),
            Err(e) => {
                debug!(crawl_id = %crawl_id, attempt, error = %e, "progress store connect failed");
                last_error = e;
            }
        }
    }

    Err(last_error).with_context(|| {
        format!(
            "Progress store for crawl {} unreachable after {} attempts",
            crawl_id, attempts
        )
    })
}

async fn try_connect(
    connector: &dyn BaseProgressStoreConnector,
    url: &str,
    timeout: Duration,
) -> Result<Arc<dyn BaseProgressStore>> {
    let store = tokio::time::timeout(timeout, connector.connect(url))
        .await
        .context("Timed out connecting to progress store")??;

    tokio::time::timeout(timeout, store.ping())
        .await
        .context("Timed out pinging progress store")??;

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::{TestProgressStore, TestProgressStoreConnector};

    #[tokio::test]
    async fn connects_to_reachable_store() {
        let store = TestProgressStore::new();
        let connector = TestProgressStoreConnector::new(store.clone());
        let params = OperatorParams::default();

        assert!(connect_progress_store(&connector, &params, "c1").await.is_ok());
        assert_eq!(connector.connect_calls(), 1);
        assert_eq!(
            connector.urls()[0],
            "redis://redis-c1-0.redis-c1.crawlers.svc.cluster.local/0"
        );
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let store = TestProgressStore::new();
        store.set_reachable(false);
        let connector = TestProgressStoreConnector::new(store);
        let params = OperatorParams {
            progress_store_connect_attempts: 3,
            ..Default::default()
        };

        let err = connect_progress_store(&connector, &params, "c1")
            .await
            .err()
            .map(|e| e.to_string());
        assert!(err.is_some_and(|e| e.contains("unreachable after 3 attempts")));
        assert_eq!(connector.connect_calls(), 3);
    }
}
