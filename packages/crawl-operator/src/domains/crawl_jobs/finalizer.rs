//! Crawl lifecycle: state transitions, cancellation, terminal marking and
//! teardown before the CrawlJob resource may be deleted.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::common::utils::{dt_now, from_k8s_date, to_k8s_date};
use crate::domains::crawl_jobs::keys;
use crate::domains::crawl_jobs::models::{
    CrawlRef, CrawlState, CrawlStats, CrawlStatus, ResourceMap, SyncResponse, PVC,
};
use crate::kernel::{connect_progress_store, BaseMetadataStore, BaseProgressStore, OperatorDeps};

/// Errors are copied from the progress store this many at a time.
pub const ERROR_PAGE_SIZE: usize = 100;

/// Result of a state transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// The state changed and the metadata store was updated
    Applied,
    /// Already in that state; nothing was written
    Unchanged,
}

/// Result of an explicit cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Finished,
    AlreadyFinished,
    /// The metadata store could not be written; the crawl was not marked finished
    StoreUnavailable,
}

impl CancelOutcome {
    pub fn is_settled(&self) -> bool {
        !matches!(self, CancelOutcome::StoreUnavailable)
    }
}

// =============================================================================
// State transitions
// =============================================================================

/// Move `status` to `state`, mirroring the change into the metadata store.
///
/// Asking for the current state writes nothing and returns
/// [`StateChange::Unchanged`]. On a write error `status` is left untouched.
pub async fn set_state(
    deps: &OperatorDeps,
    crawl_id: &str,
    status: &mut CrawlStatus,
    state: CrawlState,
    finished: Option<DateTime<Utc>>,
    stats: Option<CrawlStats>,
) -> Result<StateChange> {
    if status.state == state {
        return Ok(StateChange::Unchanged);
    }

    let changed = deps
        .metadata
        .update_crawl_state_if_changed(crawl_id, state, finished, stats)
        .await?;

    info!(crawl_id = %crawl_id, from = %status.state, to = %state, "setting crawl state");
    status.state = state;

    Ok(if changed {
        StateChange::Applied
    } else {
        StateChange::Unchanged
    })
}

// =============================================================================
// Cancellation and terminal marking
// =============================================================================

/// Finish a crawl immediately with `state` (`canceled` or `failed`).
///
/// A crawl that never got its progress store (still queued, or missing its
/// config) is finished all the same; only the error export is skipped.
pub async fn cancel(
    deps: &OperatorDeps,
    crawl: &CrawlRef,
    status: &mut CrawlStatus,
    state: CrawlState,
) -> CancelOutcome {
    let store = match connect_progress_store(deps.progress.as_ref(), &deps.params, &crawl.id).await
    {
        Ok(store) => Some(store),
        Err(e) => {
            debug!(crawl_id = %crawl.id, error = %e, "progress store unavailable, cancelling without it");
            None
        }
    };

    match mark_finished(deps, store, crawl, status, state, None).await {
        Ok(StateChange::Applied) => CancelOutcome::Finished,
        Ok(StateChange::Unchanged) => CancelOutcome::AlreadyFinished,
        Err(e) => {
            warn!(crawl_id = %crawl.id, error = %e, "cannot cancel crawl, metadata store unavailable");
            CancelOutcome::StoreUnavailable
        }
    }
}

/// Move a crawl into a terminal state and start the post-crawl bookkeeping.
///
/// A redundant transition returns [`StateChange::Unchanged`] and starts
/// nothing. When another cycle already recorded the outcome, the persisted
/// finish time is adopted so the status still converges.
pub async fn mark_finished(
    deps: &OperatorDeps,
    store: Option<Arc<dyn BaseProgressStore>>,
    crawl: &CrawlRef,
    status: &mut CrawlStatus,
    state: CrawlState,
    stats: Option<CrawlStats>,
) -> Result<StateChange> {
    let finished = dt_now();

    let change = set_state(deps, &crawl.id, status, state, Some(finished), stats).await?;
    if change == StateChange::Unchanged {
        if status.state == state && status.finished.is_none() {
            let persisted = deps
                .metadata
                .get_crawl_state(&crawl.id)
                .await?
                .and_then(|record| record.finished);
            status.finished = Some(to_k8s_date(persisted.unwrap_or(finished)));
        }
        debug!(crawl_id = %crawl.id, state = %state, "already finished, ignoring");
        return Ok(StateChange::Unchanged);
    }

    status.finished = Some(to_k8s_date(finished));

    let metadata = Arc::clone(&deps.metadata);
    let crawl = crawl.clone();
    let files_added_size = status.files_added_size;
    deps.tasks.spawn(format!("crawl-finished:{}", crawl.id), async move {
        run_finished_tasks(
            metadata.as_ref(),
            store.as_deref(),
            &crawl,
            state,
            finished,
            files_added_size,
        )
        .await
    });

    Ok(StateChange::Applied)
}

/// Bookkeeping after a crawl finished.
///
/// Every step is attempted even when an earlier one fails.
async fn run_finished_tasks(
    metadata: &dyn BaseMetadataStore,
    store: Option<&dyn BaseProgressStore>,
    crawl: &CrawlRef,
    state: CrawlState,
    finished: DateTime<Utc>,
    files_added_size: u64,
) -> Result<()> {
    let mut failures: Vec<String> = Vec::new();

    if let Some(started) = crawl.started {
        let seconds = (finished - started).num_seconds().max(0);
        let month = finished.format("%Y-%m").to_string();
        info!(crawl_id = %crawl.id, oid = %crawl.oid, seconds, "crawl duration");
        if let Err(e) = metadata.inc_org_exec_seconds(crawl.oid, seconds, &month).await {
            failures.push(format!("exec seconds: {:#}", e));
        }
    }

    if let Err(e) = metadata
        .stats_recompute_last(crawl.cid, files_added_size, 1)
        .await
    {
        failures.push(format!("config stats: {:#}", e));
    }

    if let Some(store) = store {
        match export_errors(store, metadata, &crawl.id).await {
            Ok(count) if count > 0 => {
                info!(crawl_id = %crawl.id, count, "exported crawl errors");
            }
            Ok(_) => {}
            // The progress store is usually torn down by now
            Err(e) => debug!(crawl_id = %crawl.id, error = %e, "crawl errors not exported"),
        }
    }

    if state.is_successful() {
        if let Err(e) = metadata
            .add_successful_crawl_to_collections(&crawl.id, crawl.cid)
            .await
        {
            failures.push(format!("collections: {:#}", e));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(failures.join("; ")))
    }
}

/// Copy the crawl's error list into the metadata store, one page at a time.
///
/// Runs at most once per crawl; returns how many errors were copied.
pub async fn export_errors(
    store: &dyn BaseProgressStore,
    metadata: &dyn BaseMetadataStore,
    crawl_id: &str,
) -> Result<usize> {
    if !store.set_nx(keys::ERRORS_EXPORTED, "1").await? {
        return Ok(0);
    }

    let key = keys::errors(crawl_id);
    let mut exported = 0;
    loop {
        let start = exported as isize;
        let stop = start + ERROR_PAGE_SIZE as isize - 1;
        let page = store.lrange(&key, start, stop).await?;
        if page.is_empty() {
            break;
        }

        metadata.add_crawl_errors(crawl_id, &page).await?;
        exported += page.len();

        if page.len() < ERROR_PAGE_SIZE {
            break;
        }
    }

    Ok(exported)
}

// =============================================================================
// Teardown
// =============================================================================

/// Release the crawl's volume claims before letting the resource go.
///
/// While claims remain, their deletion is scheduled and the response says
/// not finalized so the controller calls again.
pub fn finalize(
    deps: &OperatorDeps,
    crawl_id: &str,
    status: CrawlStatus,
    related: &ResourceMap,
    finalized: bool,
) -> SyncResponse {
    let pvcs = related.names(PVC);
    if pvcs.is_empty() {
        return SyncResponse::done(status, finalized);
    }

    info!(crawl_id = %crawl_id, pvcs = ?pvcs, "deleting volume claims");
    let cluster = Arc::clone(&deps.cluster);
    let id = crawl_id.to_string();
    deps.tasks.spawn(format!("delete-pvcs:{}", crawl_id), async move {
        cluster.delete_pvcs(&id).await
    });

    SyncResponse::done(status, false)
}

/// Response for a finished crawl, deleting the job once its TTL ran out.
pub fn handle_finished(
    deps: &OperatorDeps,
    crawl_id: &str,
    status: CrawlStatus,
    ttl_seconds: Option<i64>,
) -> SyncResponse {
    let ttl = ttl_seconds.unwrap_or(deps.params.default_ttl_secs);

    match from_k8s_date(status.finished.as_deref()) {
        Some(finished) if ttl_expired(finished, dt_now(), ttl) => {
            info!(crawl_id = %crawl_id, ttl, "crawl job expired, deleting");
            let cluster = Arc::clone(&deps.cluster);
            let id = crawl_id.to_string();
            deps.tasks.spawn(format!("delete-crawl-job:{}", crawl_id), async move {
                cluster.delete_crawl_job(&id).await
            });
        }
        Some(_) => {}
        None => warn!(crawl_id = %crawl_id, finished = ?status.finished, "unreadable finish time"),
    }

    SyncResponse::done(status, false)
}

/// `(now - finished) > ttl > 0`
pub fn ttl_expired(finished: DateTime<Utc>, now: DateTime<Utc>, ttl: i64) -> bool {
    ttl > 0 && (now - finished).num_seconds() > ttl
}
