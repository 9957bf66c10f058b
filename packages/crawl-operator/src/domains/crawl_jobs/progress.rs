//! Draining worker reports into the crawl record.
//!
//! The drain loop pops one mailbox entry at a time; a pop is the commit
//! point. The totals reported in the status are always read back from the
//! store counters afterwards, so a drain that dies halfway is picked up by
//! the next cycle without double counting.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::common::utils::{dt_now, natural_size};
use crate::domains::crawl_jobs::finalizer::{mark_finished, set_state};
use crate::domains::crawl_jobs::keys;
use crate::domains::crawl_jobs::machines::{capacity_state, decide_outcome, CrawlProgress};
use crate::domains::crawl_jobs::models::{
    pod_phase, CrawlFile, CrawlSpec, CrawlState, CrawlStats, CrawlStatus, MailboxEntry,
    ResourceMap, POD,
};
use crate::kernel::{connect_progress_store, BaseProgressStore, OperatorDeps};

/// Refresh a running crawl's status from its progress store.
///
/// Never fails: if either store misbehaves the previous status is returned
/// unchanged and the next cycle tries again.
pub async fn refresh(
    deps: &OperatorDeps,
    spec: &CrawlSpec,
    status: &CrawlStatus,
    related: &ResourceMap,
) -> CrawlStatus {
    let store = match connect_progress_store(deps.progress.as_ref(), &deps.params, &spec.id).await
    {
        Ok(store) => store,
        Err(e) => {
            warn!(crawl_id = %spec.id, error = %e, "progress store unavailable, will retry");
            return status.clone();
        }
    };

    let mut next = status.clone();
    match sync_progress(deps, store, spec, &mut next, related).await {
        Ok(()) => next,
        Err(e) => {
            let error = format!("{:#}", e);
            warn!(crawl_id = %spec.id, error = %error, "crawl refresh failed, will retry");
            status.clone()
        }
    }
}

async fn sync_progress(
    deps: &OperatorDeps,
    store: Arc<dyn BaseProgressStore>,
    spec: &CrawlSpec,
    status: &mut CrawlStatus,
    related: &ResourceMap,
) -> Result<()> {
    let drained = drain_mailbox(deps, store.as_ref(), spec).await?;
    if drained > 0 {
        debug!(crawl_id = %spec.id, drained, "drained completed files");
    }

    status.files_added = store.get_counter(keys::FILES_ADDED).await?;
    status.files_added_size = store.get_counter(keys::FILES_ADDED_SIZE).await?;

    update_crawl_state(deps, store, spec, status, related).await
}

/// Pop every pending completion entry, recording finished files.
pub async fn drain_mailbox(
    deps: &OperatorDeps,
    store: &dyn BaseProgressStore,
    spec: &CrawlSpec,
) -> Result<usize> {
    let mut drained = 0;

    while let Some(raw) = store.lpop(keys::DONE_MAILBOX).await? {
        drained += 1;

        let entry: MailboxEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(crawl_id = %spec.id, error = %e, "skipping malformed mailbox entry");
                continue;
            }
        };

        let Some(filename) = entry.filename.as_deref() else {
            continue;
        };

        let file = CrawlFile::from_completed(
            filename,
            entry.size,
            &entry.hash,
            &spec.storage_name,
            &spec.storage_path,
        );
        deps.metadata.add_crawl_file(&spec.id, &file).await?;
        store.incr_by(keys::FILES_ADDED_SIZE, entry.size).await?;
        store.incr_by(keys::FILES_ADDED, 1).await?;

        info!(crawl_id = %spec.id, filename = %file.filename, size = file.size, "crawl file added");
    }

    Ok(drained)
}

/// Page counters and size as the workers last reported them.
pub async fn crawl_stats(store: &dyn BaseProgressStore, crawl_id: &str) -> Result<CrawlStats> {
    let done = store.llen(&keys::pages_done(crawl_id)).await?;
    let found = store.scard(&keys::pages_found(crawl_id)).await?;
    let size = store
        .hget(keys::CRAWL_SIZE, crawl_id)
        .await?
        .and_then(|size| size.parse().ok());

    Ok(CrawlStats { found, done, size })
}

fn any_pod_running(related: &ResourceMap) -> bool {
    related
        .of_kind(POD)
        .any(|(_, pod)| pod_phase(pod) == Some("Running"))
}

async fn update_crawl_state(
    deps: &OperatorDeps,
    store: Arc<dyn BaseProgressStore>,
    spec: &CrawlSpec,
    status: &mut CrawlStatus,
    related: &ResourceMap,
) -> Result<()> {
    let markers = store.hvals(&keys::worker_status(&spec.id)).await?;
    let stats = crawl_stats(store.as_ref(), &spec.id).await?;

    let stopping = spec.should_stop(dt_now());
    if stopping {
        if !spec.stopping {
            info!(crawl_id = %spec.id, expire_time = ?spec.expire_time, "crawl expired, stopping gracefully");
        }
        store.set(&keys::stopping(&spec.id), "1").await?;
        store.set(keys::LEGACY_STOP, "1").await?;
    }
    status.stopping = stopping;

    let running = capacity_state(any_pod_running(related));
    if running == CrawlState::WaitingCapacity {
        if status.state != CrawlState::Canceled {
            set_state(deps, &spec.id, status, running, None, None).await?;
        }
        return Ok(());
    }

    set_state(deps, &spec.id, status, running, None, None).await?;

    status.pages_done = stats.done;
    status.pages_found = stats.found;
    if let Some(size) = stats.size {
        status.size = natural_size(size);
    }

    let progress = CrawlProgress {
        scale: spec.scale,
        pages_found: stats.found,
        pages_done: stats.done,
        files_added: status.files_added,
        stopping,
        ..Default::default()
    }
    .with_worker_markers(markers.iter().map(String::as_str));

    if let Some(outcome) = decide_outcome(&progress) {
        info!(
            crawl_id = %spec.id,
            outcome = %outcome,
            done = progress.done_workers,
            failed = progress.failed_workers,
            "crawl reached terminal state"
        );
        let snapshot = outcome.is_successful().then_some(stats);
        mark_finished(
            deps,
            Some(store),
            &spec.crawl_ref(),
            status,
            outcome,
            snapshot,
        )
        .await?;
    }

    Ok(())
}
