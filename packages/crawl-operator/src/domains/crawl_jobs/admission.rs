//! Per-org concurrency limits for starting crawls.

use tracing::{info, warn};

use crate::domains::crawl_jobs::finalizer::set_state;
use crate::domains::crawl_jobs::models::{
    crawl_job_state, object_name, CrawlSpec, CrawlState, CrawlStatus, ResourceMap, CRAWL_JOB,
};
use crate::kernel::OperatorDeps;

/// Whether the crawl named `name` may start, given the org's sibling jobs.
///
/// Siblings that already reached a terminal state do not count. The rest are
/// ranked in the order the controller listed them, not by creation time;
/// admission is re-checked every cycle so the ranking only has to converge.
pub fn admits(quota: u32, name: &str, siblings: &ResourceMap) -> bool {
    if quota == 0 {
        return true;
    }

    if siblings.count(CRAWL_JOB) <= quota as usize {
        return true;
    }

    let mut rank: usize = 0;
    for (key, job) in siblings.of_kind(CRAWL_JOB) {
        if crawl_job_state(job).is_some_and(|state| state.is_terminal()) {
            continue;
        }

        let job_name = object_name(job).unwrap_or(key.as_str());
        if job_name == name {
            return rank < quota as usize;
        }
        rank += 1;
    }

    false
}

/// Admission check for a pending crawl.
///
/// Denied crawls move to `waiting_org_limit`. When the quota cannot be read
/// the crawl simply stays where it is until the next cycle.
pub async fn can_start_new(
    deps: &OperatorDeps,
    spec: &CrawlSpec,
    name: &str,
    related: &ResourceMap,
    status: &mut CrawlStatus,
) -> bool {
    let quota = match deps.quotas.max_concurrent_crawls(spec.oid).await {
        Ok(quota) => quota,
        Err(e) => {
            warn!(crawl_id = %spec.id, error = %e, "cannot read crawl quota, will retry");
            return false;
        }
    };

    if admits(quota, name, related) {
        return true;
    }

    info!(crawl_id = %spec.id, oid = %spec.oid, quota, "org crawl limit reached");
    if let Err(e) = set_state(deps, &spec.id, status, CrawlState::WaitingOrgLimit, None, None).await
    {
        warn!(crawl_id = %spec.id, error = %e, "failed to record waiting state");
    }
    false
}
