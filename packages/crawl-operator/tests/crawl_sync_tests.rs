//! Crawl job reconciliation: progress, outcomes and children.

mod common;

use crate::common::{CrawlFixture, TestHarness};
use chrono::Duration;
use operator_core::common::utils::{dt_now, to_k8s_date};
use operator_core::domains::crawl_jobs::keys;
use operator_core::domains::crawl_jobs::machines::{WORKER_DONE, WORKER_FAILED};
use operator_core::domains::crawl_jobs::models::{
    object_name, CrawlState, CrawlStatus, ResourceMap, SyncRequest, STATEFUL_SET,
};
use operator_core::domains::crawl_jobs::sync_crawl;
use serde_json::Value;

// ============================================================================
// Test Helpers
// ============================================================================

fn kinds(children: &[Value]) -> Vec<(String, String)> {
    children
        .iter()
        .map(|child| {
            (
                child["kind"].as_str().unwrap_or_default().to_string(),
                object_name(child).unwrap_or_default().to_string(),
            )
        })
        .collect()
}

fn mark_workers(harness: &TestHarness, crawl: &CrawlFixture, marker: &str) {
    for ordinal in 0..crawl.scale {
        harness
            .progress()
            .set_worker_status(&crawl.id, ordinal, marker);
    }
}

// ============================================================================
// Children
// ============================================================================

#[tokio::test]
async fn new_crawl_renders_crawler_and_redis() {
    let crawl = CrawlFixture::new("c-new").with_scale(2);
    let harness = TestHarness::with_crawl(&crawl, CrawlState::Starting);

    let request = SyncRequest {
        parent: crawl.parent(None),
        children: ResourceMap::new(),
        related: crawl.related(false),
        finalizing: false,
    };
    let response = sync_crawl(&harness.deps, request).await.unwrap();

    assert_eq!(response.status.state, CrawlState::Starting);
    assert_eq!(response.status.scale, 2);
    assert!(!response.finalized);
    assert_eq!(
        kinds(&response.children),
        vec![
            ("StatefulSet".to_string(), "crawl-c-new".to_string()),
            ("ConfigMap".to_string(), "crawl-c-new".to_string()),
            ("Service".to_string(), "crawl-c-new".to_string()),
            ("StatefulSet".to_string(), "redis-c-new".to_string()),
            ("Service".to_string(), "redis-c-new".to_string()),
        ]
    );
    // Nothing to refresh before the crawler exists
    assert_eq!(harness.test.progress.connect_calls(), 0);
}

#[tokio::test]
async fn existing_claim_templates_are_kept() {
    let crawl = CrawlFixture::new("c-pvc");
    let harness = TestHarness::with_crawl(&crawl, CrawlState::Starting);

    let request = crawl.running_request(None);
    let existing = request
        .children
        .get(STATEFUL_SET, "crawl-c-pvc")
        .unwrap()["spec"]["volumeClaimTemplates"]
        .clone();

    let response = sync_crawl(&harness.deps, request).await.unwrap();

    let crawler = response
        .children
        .iter()
        .find(|c| c["kind"] == "StatefulSet" && object_name(c) == Some("crawl-c-pvc"))
        .unwrap();
    assert_eq!(crawler["spec"]["volumeClaimTemplates"], existing);
}

#[tokio::test]
async fn missing_config_fails_crawl() {
    let crawl = CrawlFixture::new("c-noconf");
    let harness = TestHarness::with_crawl(&crawl, CrawlState::Starting);

    let request = SyncRequest {
        parent: crawl.parent(None),
        children: crawl.children(),
        related: ResourceMap::new(),
        finalizing: false,
    };
    let response = sync_crawl(&harness.deps, request).await.unwrap();

    assert_eq!(response.status.state, CrawlState::Failed);
    assert!(response.status.finished.is_some());
    assert!(response.children.is_empty());
    assert_eq!(
        harness.metadata().crawl("c-noconf").unwrap().state,
        CrawlState::Failed
    );
}

#[tokio::test]
async fn missing_config_fails_new_crawl_without_store() {
    let crawl = CrawlFixture::new("c-noconf-new");
    let harness = TestHarness::with_crawl(&crawl, CrawlState::Starting);
    harness.progress().set_reachable(false);

    let request = SyncRequest {
        parent: crawl.parent(None),
        children: ResourceMap::new(),
        related: ResourceMap::new(),
        finalizing: false,
    };
    let response = sync_crawl(&harness.deps, request).await.unwrap();

    assert_eq!(response.status.state, CrawlState::Failed);
    assert!(response.status.finished.is_some());
    assert!(response.children.is_empty());
    assert_eq!(
        harness.metadata().crawl("c-noconf-new").unwrap().state,
        CrawlState::Failed
    );
}

// ============================================================================
// Progress
// ============================================================================

#[tokio::test]
async fn sync_is_idempotent_without_new_reports() {
    let crawl = CrawlFixture::new("c-idem");
    let harness = TestHarness::with_crawl(&crawl, CrawlState::Starting);
    harness.progress().set_pages("c-idem", 10, 4);
    harness.progress().set_crawl_size("c-idem", 2048);

    let first = sync_crawl(&harness.deps, crawl.running_request(None))
        .await
        .unwrap();
    let second = sync_crawl(&harness.deps, crawl.running_request(None))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first.status.state, CrawlState::Running);
    assert_eq!(first.status.pages_found, 10);
    assert_eq!(first.status.pages_done, 4);
    assert_eq!(first.status.size, "2.0 kB");
    assert!(first.status.finished.is_none());
}

#[tokio::test]
async fn no_running_pod_waits_for_capacity() {
    let crawl = CrawlFixture::new("c-wait");
    let harness = TestHarness::with_crawl(&crawl, CrawlState::Starting);

    let mut request = crawl.running_request(None);
    request.related = crawl.related(false);
    let response = sync_crawl(&harness.deps, request).await.unwrap();

    assert_eq!(response.status.state, CrawlState::WaitingCapacity);
    assert!(!response.children.is_empty());
}

#[tokio::test]
async fn drained_files_are_counted_from_store() {
    let crawl = CrawlFixture::new("c-files");
    let harness = TestHarness::with_crawl(&crawl, CrawlState::Running);
    harness.progress().push_completed_file("a.wacz", 100, "h1");
    harness.progress().push_completed_file("b.wacz", 250, "h2");

    let response = sync_crawl(&harness.deps, crawl.running_request(None))
        .await
        .unwrap();

    assert_eq!(response.status.files_added, 2);
    assert_eq!(response.status.files_added_size, 350);
    assert!(harness.progress().list(keys::DONE_MAILBOX).is_empty());

    let record = harness.metadata().crawl("c-files").unwrap();
    let names: Vec<_> = record.files.iter().map(|f| f.filename.as_str()).collect();
    assert_eq!(names.len(), 2);
    assert!(names[0].ends_with("a.wacz"));
}

#[tokio::test]
async fn interrupted_drain_resumes_without_double_counting() {
    let crawl = CrawlFixture::new("c-resume");
    let harness = TestHarness::with_crawl(&crawl, CrawlState::Running);
    for (i, size) in [100u64, 200, 300].iter().enumerate() {
        harness
            .progress()
            .push_completed_file(&format!("f{}.wacz", i), *size, "h");
    }
    harness.progress().fail_after_pops(1);

    let status = CrawlStatus {
        state: CrawlState::Running,
        ..Default::default()
    };
    let first = sync_crawl(&harness.deps, crawl.running_request(Some(status.clone())))
        .await
        .unwrap();

    // The failed cycle reports the old status; one file is already committed
    assert_eq!(first.status, status);
    assert_eq!(harness.metadata().crawl("c-resume").unwrap().files.len(), 1);
    assert_eq!(harness.progress().value(keys::FILES_ADDED).as_deref(), Some("1"));

    harness.progress().clear_failures();
    let second = sync_crawl(&harness.deps, crawl.running_request(Some(status)))
        .await
        .unwrap();

    assert_eq!(second.status.files_added, 3);
    assert_eq!(second.status.files_added_size, 600);
    assert_eq!(harness.metadata().crawl("c-resume").unwrap().files.len(), 3);
}

#[tokio::test]
async fn unreachable_store_leaves_status_unchanged() {
    let crawl = CrawlFixture::new("c-down");
    let harness = TestHarness::with_crawl(&crawl, CrawlState::Running);
    harness.progress().set_reachable(false);

    let status = CrawlStatus {
        state: CrawlState::Running,
        pages_found: 7,
        pages_done: 3,
        ..Default::default()
    };
    let response = sync_crawl(&harness.deps, crawl.running_request(Some(status.clone())))
        .await
        .unwrap();

    assert_eq!(response.status, status);
    assert!(!response.children.is_empty());
    assert!(harness.metadata().state_writes().is_empty());
    assert_eq!(
        harness.test.progress.connect_calls() as u32,
        harness.test.params.progress_store_connect_attempts
    );
}

#[tokio::test]
async fn expired_crawl_is_asked_to_stop() {
    let crawl = CrawlFixture::new("c-expire");
    let harness = TestHarness::with_crawl(&crawl, CrawlState::Running);

    let mut request = crawl.running_request(None);
    request.parent.spec.expire_time = Some(to_k8s_date(dt_now() - Duration::minutes(1)));
    let response = sync_crawl(&harness.deps, request).await.unwrap();

    assert!(response.status.stopping);
    assert_eq!(
        harness.progress().value(&keys::stopping("c-expire")).as_deref(),
        Some("1")
    );
    assert_eq!(
        harness.progress().value(keys::LEGACY_STOP).as_deref(),
        Some("1")
    );
}

// ============================================================================
// Outcomes
// ============================================================================

#[tokio::test]
async fn all_workers_done_with_all_pages_completes() {
    let crawl = CrawlFixture::new("c-done").with_scale(2);
    let harness = TestHarness::with_crawl(&crawl, CrawlState::Running);
    harness.progress().set_pages("c-done", 3, 3);
    harness.progress().push_completed_file("out.wacz", 4096, "h");
    mark_workers(&harness, &crawl, WORKER_DONE);

    let response = sync_crawl(&harness.deps, crawl.running_request(None))
        .await
        .unwrap();
    harness.settle().await;

    assert_eq!(response.status.state, CrawlState::Complete);
    assert!(response.status.finished.is_some());
    assert!(response.children.is_empty());

    let record = harness.metadata().crawl("c-done").unwrap();
    assert_eq!(record.state, CrawlState::Complete);
    assert!(record.finished.is_some());
    assert_eq!(record.stats.map(|s| (s.found, s.done)), Some((3, 3)));

    assert_eq!(harness.metadata().stats_recomputes(), vec![(crawl.cid, 4096, 1)]);
    assert_eq!(
        harness.metadata().collection_adds(),
        vec![("c-done".to_string(), crawl.cid)]
    );

    let exec = harness.metadata().exec_seconds();
    assert_eq!(exec.len(), 1);
    assert_eq!(exec[0].0, crawl.oid);
    assert!(exec[0].1 >= 600);

    // Still inside the default TTL
    assert!(harness.cluster().deleted_crawl_jobs().is_empty());
}

#[tokio::test]
async fn unfinished_pages_give_partial_complete() {
    let crawl = CrawlFixture::new("c-partial");
    let harness = TestHarness::with_crawl(&crawl, CrawlState::Running);
    harness.progress().set_pages("c-partial", 5, 3);
    harness.progress().push_completed_file("out.wacz", 10, "h");
    mark_workers(&harness, &crawl, WORKER_DONE);

    let response = sync_crawl(&harness.deps, crawl.running_request(None))
        .await
        .unwrap();
    harness.settle().await;

    assert_eq!(response.status.state, CrawlState::PartialComplete);
    assert_eq!(harness.metadata().collection_adds().len(), 1);
}

#[tokio::test]
async fn single_page_without_files_fails() {
    let crawl = CrawlFixture::new("c-degenerate");
    let harness = TestHarness::with_crawl(&crawl, CrawlState::Running);
    harness.progress().set_pages("c-degenerate", 1, 1);
    mark_workers(&harness, &crawl, WORKER_DONE);

    let response = sync_crawl(&harness.deps, crawl.running_request(None))
        .await
        .unwrap();
    harness.settle().await;

    assert_eq!(response.status.state, CrawlState::Failed);
    assert!(harness.metadata().collection_adds().is_empty());
    // Failed crawls still count toward the config's history
    assert_eq!(harness.metadata().stats_recomputes().len(), 1);
}

#[tokio::test]
async fn stopped_crawl_with_no_pages_is_canceled() {
    let crawl = CrawlFixture::new("c-cancel").stopping();
    let harness = TestHarness::with_crawl(&crawl, CrawlState::Running);
    harness.progress().set_pages("c-cancel", 4, 0);
    mark_workers(&harness, &crawl, WORKER_FAILED);

    let response = sync_crawl(&harness.deps, crawl.running_request(None))
        .await
        .unwrap();

    assert_eq!(response.status.state, CrawlState::Canceled);
    assert!(response.status.stopping);
}

#[tokio::test]
async fn failed_workers_with_progress_fail() {
    let crawl = CrawlFixture::new("c-fail").stopping();
    let harness = TestHarness::with_crawl(&crawl, CrawlState::Running);
    harness.progress().set_pages("c-fail", 4, 2);
    mark_workers(&harness, &crawl, WORKER_FAILED);

    let response = sync_crawl(&harness.deps, crawl.running_request(None))
        .await
        .unwrap();

    assert_eq!(response.status.state, CrawlState::Failed);
}

#[tokio::test]
async fn partial_worker_markers_keep_running() {
    let crawl = CrawlFixture::new("c-half").with_scale(2);
    let harness = TestHarness::with_crawl(&crawl, CrawlState::Running);
    harness.progress().set_pages("c-half", 3, 3);
    harness
        .progress()
        .set_worker_status("c-half", 0, WORKER_DONE);

    let response = sync_crawl(&harness.deps, crawl.running_request(None))
        .await
        .unwrap();

    assert_eq!(response.status.state, CrawlState::Running);
    assert!(response.status.finished.is_none());
    assert!(!response.children.is_empty());
}
