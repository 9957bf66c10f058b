//! Test harness around the in-memory dependencies.
//!
//! Each test gets fresh fakes; nothing is shared between tests.

use operator_core::domains::crawl_jobs::models::CrawlState;
use operator_core::kernel::test_dependencies::{
    TestClusterClient, TestMetadataStore, TestProgressStore,
};
use operator_core::kernel::{OperatorDeps, TestDependencies};
use std::sync::Once;

use super::CrawlFixture;

static TRACING: Once = Once::new();

/// Honor RUST_LOG when running tests with `--nocapture`.
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub struct TestHarness {
    pub test: TestDependencies,
    pub deps: OperatorDeps,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_dependencies(TestDependencies::new())
    }

    pub fn with_dependencies(test: TestDependencies) -> Self {
        init_tracing();
        let deps = test.into_deps();
        Self { test, deps }
    }

    /// Harness with a crawl record already in `state`
    pub fn with_crawl(crawl: &CrawlFixture, state: CrawlState) -> Self {
        let metadata = TestMetadataStore::new()
            .with_crawl(&crawl.id, state)
            .with_config(crawl.crawl_config())
            .with_org(crawl.org(0))
            .with_user(crawl.user());
        Self::with_dependencies(TestDependencies::new().mock_metadata(metadata))
    }

    pub fn metadata(&self) -> &TestMetadataStore {
        &self.test.metadata
    }

    pub fn progress(&self) -> &TestProgressStore {
        self.test.progress_store()
    }

    pub fn cluster(&self) -> &TestClusterClient {
        &self.test.cluster
    }

    /// Wait for every background task started so far
    pub async fn settle(&self) {
        self.deps.tasks.wait_idle().await;
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
