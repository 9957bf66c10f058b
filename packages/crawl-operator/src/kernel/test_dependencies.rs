// TestDependencies - in-memory implementations for testing
//
// Provides fake stores and a recording cluster client that can be injected
// into OperatorDeps, so reconciliation can be exercised without redis,
// postgres or a cluster.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use super::{
    BaseClusterClient, BaseCrawlCreator, BaseMetadataStore, BaseProgressStore,
    BaseProgressStoreConnector, BaseQuotaOracle, BaseResourceRenderer, DefaultResourceRenderer,
    OperatorDeps, RenderRequest, TaskPool,
};
use crate::common::{CrawlConfigId, OrgId, UserId};
use crate::config::OperatorParams;
use crate::domains::crawl_jobs::keys;
use crate::domains::crawl_jobs::models::{
    CrawlConfig, CrawlFile, CrawlRecordState, CrawlState, CrawlStats, Organization, User,
};

// =============================================================================
// Test Progress Store
// =============================================================================

#[derive(Default)]
struct ProgressState {
    reachable: bool,
    /// Fail every `lpop` once this many pops have succeeded
    fail_after_pops: Option<usize>,
    pops: usize,
    values: HashMap<String, String>,
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, HashSet<String>>,
    hashes: HashMap<String, BTreeMap<String, String>>,
}

/// In-memory stand-in for one crawl's redis.
#[derive(Clone)]
pub struct TestProgressStore {
    state: Arc<Mutex<ProgressState>>,
}

impl TestProgressStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ProgressState {
                reachable: true,
                ..Default::default()
            })),
        }
    }

    /// Toggle reachability; every call fails while unreachable
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unwrap().reachable = reachable;
    }

    /// Make `lpop` fail after `pops` more successful pops
    pub fn fail_after_pops(&self, pops: usize) {
        let mut state = self.state.lock().unwrap();
        state.pops = 0;
        state.fail_after_pops = Some(pops);
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().fail_after_pops = None;
    }

    /// Append a raw entry to a list
    pub fn push(&self, key: &str, value: &str) {
        self.state
            .lock()
            .unwrap()
            .lists
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
    }

    /// Push a completion entry the way a worker does when a WACZ is uploaded
    pub fn push_completed_file(&self, filename: &str, size: u64, hash: &str) {
        let entry = serde_json::json!({"filename": filename, "size": size, "hash": hash});
        self.push(keys::DONE_MAILBOX, &entry.to_string());
    }

    pub fn push_error(&self, crawl_id: &str, message: &str) {
        self.push(&keys::errors(crawl_id), message);
    }

    pub fn set_worker_status(&self, crawl_id: &str, ordinal: u32, marker: &str) {
        self.state
            .lock()
            .unwrap()
            .hashes
            .entry(keys::worker_status(crawl_id))
            .or_default()
            .insert(ordinal.to_string(), marker.to_string());
    }

    /// Set page counters: `found` distinct pages, `done` finished
    pub fn set_pages(&self, crawl_id: &str, found: u64, done: u64) {
        let mut state = self.state.lock().unwrap();
        state.sets.insert(
            keys::pages_found(crawl_id),
            (0..found).map(|i| format!("https://example.com/{}", i)).collect(),
        );
        state.lists.insert(
            keys::pages_done(crawl_id),
            (0..done).map(|i| i.to_string()).collect(),
        );
    }

    pub fn set_crawl_size(&self, crawl_id: &str, size: u64) {
        self.state
            .lock()
            .unwrap()
            .hashes
            .entry(keys::CRAWL_SIZE.to_string())
            .or_default()
            .insert(crawl_id.to_string(), size.to_string());
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.state.lock().unwrap().values.get(key).cloned()
    }

    pub fn list(&self, key: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .lists
            .get(key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn check(&self) -> Result<std::sync::MutexGuard<'_, ProgressState>> {
        let state = self.state.lock().unwrap();
        if !state.reachable {
            bail!("progress store unreachable");
        }
        Ok(state)
    }
}

impl Default for TestProgressStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseProgressStore for TestProgressStore {
    async fn ping(&self) -> Result<()> {
        self.check().map(|_| ())
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>> {
        let mut state = self.check()?;
        if let Some(limit) = state.fail_after_pops {
            if state.pops >= limit {
                bail!("connection reset while popping {}", key);
            }
        }
        let value = state.lists.get_mut(key).and_then(VecDeque::pop_front);
        if value.is_some() {
            state.pops += 1;
        }
        Ok(value)
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let state = self.check()?;
        let Some(list) = state.lists.get(key) else {
            return Ok(Vec::new());
        };
        let len = list.len() as isize;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return Ok(Vec::new());
        }
        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect())
    }

    async fn llen(&self, key: &str) -> Result<u64> {
        let state = self.check()?;
        Ok(state.lists.get(key).map_or(0, |l| l.len() as u64))
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        let state = self.check()?;
        Ok(state.sets.get(key).map_or(0, |s| s.len() as u64))
    }

    async fn get_counter(&self, key: &str) -> Result<u64> {
        let state = self.check()?;
        Ok(state
            .values
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    async fn incr_by(&self, key: &str, delta: u64) -> Result<u64> {
        let mut state = self.check()?;
        let current: u64 = state
            .values
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let next = current + delta;
        state.values.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.check()?;
        state.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str) -> Result<bool> {
        let mut state = self.check()?;
        if state.values.contains_key(key) {
            return Ok(false);
        }
        state.values.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn hvals(&self, key: &str) -> Result<Vec<String>> {
        let state = self.check()?;
        Ok(state
            .hashes
            .get(key)
            .map(|h| h.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let state = self.check()?;
        Ok(state.hashes.get(key).and_then(|h| h.get(field).cloned()))
    }
}

/// Hands out the same in-memory store for every crawl and records the
/// addresses asked for.
#[derive(Clone)]
pub struct TestProgressStoreConnector {
    store: TestProgressStore,
    urls: Arc<Mutex<Vec<String>>>,
}

impl TestProgressStoreConnector {
    pub fn new(store: TestProgressStore) -> Self {
        Self {
            store,
            urls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn store(&self) -> &TestProgressStore {
        &self.store
    }

    pub fn connect_calls(&self) -> usize {
        self.urls.lock().unwrap().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseProgressStoreConnector for TestProgressStoreConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn BaseProgressStore>> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(Arc::new(self.store.clone()))
    }
}

// =============================================================================
// Test Metadata Store
// =============================================================================

/// A crawl record as the fake metadata store keeps it.
#[derive(Debug, Clone, Default)]
pub struct TestCrawlRecord {
    pub cid: Option<CrawlConfigId>,
    pub state: CrawlState,
    pub finished: Option<DateTime<Utc>>,
    pub stats: Option<CrawlStats>,
    pub files: Vec<CrawlFile>,
    pub errors: Vec<String>,
    pub manual: bool,
}

#[derive(Default)]
struct MetadataState {
    failing: bool,
    crawls: HashMap<String, TestCrawlRecord>,
    configs: HashMap<CrawlConfigId, CrawlConfig>,
    orgs: HashMap<OrgId, Organization>,
    users: HashMap<UserId, User>,
    quotas: HashMap<OrgId, u32>,
    state_writes: Vec<(String, CrawlState)>,
    stats_recomputes: Vec<(CrawlConfigId, u64, i64)>,
    collection_adds: Vec<(String, CrawlConfigId)>,
    exec_seconds: Vec<(OrgId, i64, String)>,
    created: Vec<String>,
}

#[derive(Clone, Default)]
pub struct TestMetadataStore {
    state: Arc<Mutex<MetadataState>>,
}

impl TestMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail, as if the database were down
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    pub fn with_crawl(self, crawl_id: &str, state: CrawlState) -> Self {
        self.state.lock().unwrap().crawls.insert(
            crawl_id.to_string(),
            TestCrawlRecord {
                state,
                ..Default::default()
            },
        );
        self
    }

    pub fn with_finished_crawl(self, crawl_id: &str, state: CrawlState, at: DateTime<Utc>) -> Self {
        self.state.lock().unwrap().crawls.insert(
            crawl_id.to_string(),
            TestCrawlRecord {
                state,
                finished: Some(at),
                ..Default::default()
            },
        );
        self
    }

    pub fn with_config(self, config: CrawlConfig) -> Self {
        self.state.lock().unwrap().configs.insert(config.id, config);
        self
    }

    pub fn with_org(self, org: Organization) -> Self {
        let mut state = self.state.lock().unwrap();
        state
            .quotas
            .insert(org.id, org.max_concurrent_crawls.max(0) as u32);
        state.orgs.insert(org.id, org);
        drop(state);
        self
    }

    pub fn with_user(self, user: User) -> Self {
        self.state.lock().unwrap().users.insert(user.id, user);
        self
    }

    pub fn with_quota(self, oid: OrgId, max_concurrent_crawls: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .quotas
            .insert(oid, max_concurrent_crawls);
        self
    }

    pub fn crawl(&self, crawl_id: &str) -> Option<TestCrawlRecord> {
        self.state.lock().unwrap().crawls.get(crawl_id).cloned()
    }

    /// Every state write attempted, changed or not
    pub fn state_writes(&self) -> Vec<(String, CrawlState)> {
        self.state.lock().unwrap().state_writes.clone()
    }

    pub fn stats_recomputes(&self) -> Vec<(CrawlConfigId, u64, i64)> {
        self.state.lock().unwrap().stats_recomputes.clone()
    }

    pub fn collection_adds(&self) -> Vec<(String, CrawlConfigId)> {
        self.state.lock().unwrap().collection_adds.clone()
    }

    pub fn exec_seconds(&self) -> Vec<(OrgId, i64, String)> {
        self.state.lock().unwrap().exec_seconds.clone()
    }

    /// Crawl ids created through `add_new_crawl`
    pub fn created_crawls(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    fn check(&self) -> Result<std::sync::MutexGuard<'_, MetadataState>> {
        let state = self.state.lock().unwrap();
        if state.failing {
            bail!("metadata store unreachable");
        }
        Ok(state)
    }
}

#[async_trait]
impl BaseMetadataStore for TestMetadataStore {
    async fn update_crawl_state_if_changed(
        &self,
        crawl_id: &str,
        state: CrawlState,
        finished: Option<DateTime<Utc>>,
        stats: Option<CrawlStats>,
    ) -> Result<bool> {
        let mut guard = self.check()?;
        guard.state_writes.push((crawl_id.to_string(), state));

        let Some(record) = guard.crawls.get_mut(crawl_id) else {
            return Ok(false);
        };
        if record.state == state {
            return Ok(false);
        }
        record.state = state;
        if finished.is_some() {
            record.finished = finished;
        }
        if stats.is_some() {
            record.stats = stats;
        }
        Ok(true)
    }

    async fn get_crawl_state(&self, crawl_id: &str) -> Result<Option<CrawlRecordState>> {
        let guard = self.check()?;
        Ok(guard.crawls.get(crawl_id).map(|record| CrawlRecordState {
            state: record.state,
            finished: record.finished,
        }))
    }

    async fn add_crawl_file(&self, crawl_id: &str, file: &CrawlFile) -> Result<()> {
        let mut guard = self.check()?;
        guard
            .crawls
            .entry(crawl_id.to_string())
            .or_default()
            .files
            .push(file.clone());
        Ok(())
    }

    async fn add_crawl_errors(&self, crawl_id: &str, errors: &[String]) -> Result<()> {
        let mut guard = self.check()?;
        guard
            .crawls
            .entry(crawl_id.to_string())
            .or_default()
            .errors
            .extend_from_slice(errors);
        Ok(())
    }

    async fn stats_recompute_last(
        &self,
        cid: CrawlConfigId,
        files_added_size: u64,
        inc_crawls: i64,
    ) -> Result<()> {
        let mut guard = self.check()?;
        guard
            .stats_recomputes
            .push((cid, files_added_size, inc_crawls));
        Ok(())
    }

    async fn add_successful_crawl_to_collections(
        &self,
        crawl_id: &str,
        cid: CrawlConfigId,
    ) -> Result<()> {
        let mut guard = self.check()?;
        guard.collection_adds.push((crawl_id.to_string(), cid));
        Ok(())
    }

    async fn inc_org_exec_seconds(&self, oid: OrgId, seconds: i64, month: &str) -> Result<()> {
        let mut guard = self.check()?;
        guard.exec_seconds.push((oid, seconds, month.to_string()));
        Ok(())
    }

    async fn get_crawl_config(&self, cid: CrawlConfigId) -> Result<Option<CrawlConfig>> {
        Ok(self.check()?.configs.get(&cid).cloned())
    }

    async fn get_org(&self, oid: OrgId) -> Result<Option<Organization>> {
        Ok(self.check()?.orgs.get(&oid).cloned())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.check()?.users.get(&id).cloned())
    }
}

#[async_trait]
impl BaseQuotaOracle for TestMetadataStore {
    async fn max_concurrent_crawls(&self, oid: OrgId) -> Result<u32> {
        Ok(self.check()?.quotas.get(&oid).copied().unwrap_or(0))
    }
}

#[async_trait]
impl BaseCrawlCreator for TestMetadataStore {
    async fn add_new_crawl(
        &self,
        crawl_id: &str,
        config: &CrawlConfig,
        _user: &User,
        manual: bool,
    ) -> Result<bool> {
        let mut guard = self.check()?;
        if guard.crawls.contains_key(crawl_id) {
            return Ok(false);
        }
        guard.crawls.insert(
            crawl_id.to_string(),
            TestCrawlRecord {
                cid: Some(config.id),
                manual,
                ..Default::default()
            },
        );
        guard.created.push(crawl_id.to_string());
        Ok(true)
    }
}

// =============================================================================
// Test Cluster Client
// =============================================================================

/// Records every delete instead of talking to a cluster.
#[derive(Clone, Default)]
pub struct TestClusterClient {
    crawl_jobs: Arc<Mutex<Vec<String>>>,
    pvcs: Arc<Mutex<Vec<String>>>,
    profile_browsers: Arc<Mutex<Vec<String>>>,
}

impl TestClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deleted_crawl_jobs(&self) -> Vec<String> {
        self.crawl_jobs.lock().unwrap().clone()
    }

    pub fn deleted_pvcs(&self) -> Vec<String> {
        self.pvcs.lock().unwrap().clone()
    }

    pub fn deleted_profile_browsers(&self) -> Vec<String> {
        self.profile_browsers.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseClusterClient for TestClusterClient {
    async fn delete_crawl_job(&self, crawl_id: &str) -> Result<()> {
        self.crawl_jobs.lock().unwrap().push(crawl_id.to_string());
        Ok(())
    }

    async fn delete_pvcs(&self, crawl_id: &str) -> Result<()> {
        self.pvcs.lock().unwrap().push(crawl_id.to_string());
        Ok(())
    }

    async fn delete_profile_browser(&self, browser_id: &str) -> Result<()> {
        self.profile_browsers
            .lock()
            .unwrap()
            .push(browser_id.to_string());
        Ok(())
    }
}

// =============================================================================
// Recording Renderer
// =============================================================================

/// Renders with the default templates and remembers every request.
pub struct RecordingRenderer {
    inner: DefaultResourceRenderer,
    requests: Arc<Mutex<Vec<RenderRequest>>>,
}

impl RecordingRenderer {
    pub fn new(params: OperatorParams) -> Self {
        Self {
            inner: DefaultResourceRenderer::new(params),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<RenderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl BaseResourceRenderer for RecordingRenderer {
    fn render(&self, request: &RenderRequest) -> Result<Vec<Value>> {
        self.requests.lock().unwrap().push(request.clone());
        self.inner.render(request)
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

pub struct TestDependencies {
    pub params: OperatorParams,
    pub progress: TestProgressStoreConnector,
    pub metadata: TestMetadataStore,
    pub cluster: TestClusterClient,
    pub renderer: Arc<RecordingRenderer>,
    pub tasks: TaskPool,
}

impl TestDependencies {
    pub fn new() -> Self {
        let params = OperatorParams::default();
        Self {
            renderer: Arc::new(RecordingRenderer::new(params.clone())),
            params,
            progress: TestProgressStoreConnector::new(TestProgressStore::new()),
            metadata: TestMetadataStore::new(),
            cluster: TestClusterClient::new(),
            tasks: TaskPool::new(),
        }
    }

    pub fn mock_params(mut self, params: OperatorParams) -> Self {
        self.renderer = Arc::new(RecordingRenderer::new(params.clone()));
        self.params = params;
        self
    }

    pub fn mock_metadata(mut self, metadata: TestMetadataStore) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn mock_progress(mut self, store: TestProgressStore) -> Self {
        self.progress = TestProgressStoreConnector::new(store);
        self
    }

    /// The progress store every crawl connects to
    pub fn progress_store(&self) -> &TestProgressStore {
        self.progress.store()
    }

    /// Convert into OperatorDeps sharing the same fakes
    pub fn into_deps(&self) -> OperatorDeps {
        let metadata = Arc::new(self.metadata.clone());
        OperatorDeps::new(
            self.params.clone(),
            metadata.clone(),
            metadata.clone(),
            metadata,
            Arc::new(self.progress.clone()),
            Arc::new(self.cluster.clone()),
            self.renderer.clone(),
            self.tasks.clone(),
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
