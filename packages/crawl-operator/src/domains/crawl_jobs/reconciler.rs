//! Per-cycle reconciliation of a CrawlJob.
//!
//! Given the parent object, its children and related resources, compute the
//! status to report and the full set of children that should exist. Every
//! path yields a response; infrastructure trouble only delays progress.

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::common::utils::{dt_now, from_k8s_date, to_k8s_date};
use crate::common::OperatorError;
use crate::domains::crawl_jobs::admission::can_start_new;
use crate::domains::crawl_jobs::finalizer::{cancel, finalize, handle_finished, set_state};
use crate::domains::crawl_jobs::models::{
    config_map_data, object_name, volume_claim_templates, CrawlRef, CrawlSpec, CrawlState,
    CrawlStatus, ResourceMap, SyncRequest, SyncResponse, CONFIG_MAP, STATEFUL_SET,
};
use crate::domains::crawl_jobs::progress::refresh;
use crate::kernel::renderer::crawler_name;
use crate::kernel::{CrawlerParams, OperatorDeps, RenderRequest};

/// Name of the ConfigMap the API writes for each crawl-config.
pub fn config_map_name(cid: &str) -> String {
    format!("crawl-config-{}", cid)
}

pub fn crawl_job_name(crawl_id: &str) -> String {
    format!("crawljob-{}", crawl_id)
}

/// Storage settings read from the crawl-config map.
struct ConfigMapValues {
    storage_name: String,
    store_path: String,
    store_filename: String,
    profile_filename: String,
}

impl ConfigMapValues {
    fn from_data(data: &Map<String, Value>) -> Option<Self> {
        let value = |key: &str| data.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            storage_name: value("STORAGE_NAME")?,
            store_path: value("STORE_PATH")?,
            store_filename: value("STORE_FILENAME").unwrap_or_default(),
            profile_filename: value("PROFILE_FILENAME").unwrap_or_default(),
        })
    }
}

/// Handle a `sync` or `finalize` call for a CrawlJob.
pub async fn sync_crawl(
    deps: &OperatorDeps,
    request: SyncRequest,
) -> Result<SyncResponse, OperatorError> {
    let SyncRequest {
        parent,
        children,
        related,
        finalizing,
    } = request;

    let crawl = match CrawlRef::from_parent(&parent) {
        Ok(crawl) => crawl,
        // Teardown only needs the job id
        Err(e) if finalizing && !parent.spec.id.is_empty() => {
            warn!(crawl_id = %parent.spec.id, error = %e, "unreadable crawl ids, releasing without bookkeeping");
            let status = parent.status.clone().unwrap_or_default();
            return Ok(release_unidentified(deps, &parent.spec.id, status, &related).await);
        }
        Err(e) => return Err(e),
    };
    let mut status = parent.status.clone().unwrap_or_default();
    status.scale = parent.spec.scale();

    // Being deleted: a crawl that never finished counts as canceled
    if finalizing {
        debug!(crawl_id = %crawl.id, finished = ?status.finished, "finalizing crawl");
        let settled = if status.is_finished() {
            true
        } else {
            cancel(deps, &crawl, &mut status, CrawlState::Canceled)
                .await
                .is_settled()
        };
        return Ok(finalize(deps, &crawl.id, status, &related, settled));
    }

    if status.is_finished() {
        return Ok(handle_finished(
            deps,
            &crawl.id,
            status,
            parent.spec.ttl_seconds_after_finished,
        ));
    }

    let config = related
        .get(CONFIG_MAP, &config_map_name(&parent.spec.cid))
        .and_then(config_map_data)
        .and_then(ConfigMapValues::from_data);
    let Some(config) = config else {
        error!(crawl_id = %crawl.id, cid = %crawl.cid, "crawl config missing, failing crawl");
        cancel(deps, &crawl, &mut status, CrawlState::Failed).await;
        return Ok(SyncResponse::done(status, false));
    };

    let spec = CrawlSpec {
        id: crawl.id.clone(),
        cid: crawl.cid,
        oid: crawl.oid,
        scale: status.scale,
        storage_name: config.storage_name.clone(),
        storage_path: config.store_path.clone(),
        started: crawl.started.unwrap_or_else(dt_now),
        stopping: parent.spec.stopping,
        expire_time: from_k8s_date(parent.spec.expire_time.as_deref()),
    };

    if status.state.is_pending_admission() {
        let name = if parent.metadata.name.is_empty() {
            crawl_job_name(&spec.id)
        } else {
            parent.metadata.name.clone()
        };
        if !can_start_new(deps, &spec, &name, &related, &mut status).await {
            return Ok(SyncResponse::done(status, false));
        }

        if let Err(e) = set_state(deps, &spec.id, &mut status, CrawlState::Starting, None, None).await
        {
            warn!(crawl_id = %spec.id, error = %e, "failed to record starting state");
        }
    }

    if children.contains(STATEFUL_SET, &crawler_name(&spec.id)) {
        status = refresh(deps, &spec, &status, &related).await;
        if status.is_finished() {
            return Ok(handle_finished(
                deps,
                &spec.id,
                status,
                parent.spec.ttl_seconds_after_finished,
            ));
        }
    }

    let params = CrawlerParams::builder()
        .id(spec.id.clone())
        .cid(parent.spec.cid.clone())
        .userid(parent.spec.userid.clone())
        .storage_name(config.storage_name)
        .store_path(config.store_path)
        .store_filename(config.store_filename)
        .profile_filename(config.profile_filename)
        .scale(spec.scale)
        .force_restart(parent.spec.force_restart.clone())
        .redis_url(deps.params.redis_url(&spec.id))
        .build();

    let mut desired = deps.renderer.render(&RenderRequest::Crawler(params.clone()))?;
    desired.extend(deps.renderer.render(&RenderRequest::Redis(params))?);
    keep_volume_claim_templates(&mut desired, &children);

    Ok(SyncResponse {
        status,
        children: desired,
        finalized: false,
    })
}

/// Finalize a crawl whose config and org ids cannot be read.
///
/// The crawl is recorded as canceled when possible; post-crawl bookkeeping
/// needs those ids and is skipped.
async fn release_unidentified(
    deps: &OperatorDeps,
    crawl_id: &str,
    mut status: CrawlStatus,
    related: &ResourceMap,
) -> SyncResponse {
    if !status.is_finished() {
        let finished = dt_now();
        if let Err(e) = set_state(
            deps,
            crawl_id,
            &mut status,
            CrawlState::Canceled,
            Some(finished),
            None,
        )
        .await
        {
            warn!(crawl_id = %crawl_id, error = %e, "failed to record cancellation");
            status.state = CrawlState::Canceled;
        }
        status.finished = Some(to_k8s_date(finished));
    }

    finalize(deps, crawl_id, status, related, true)
}

/// Copy claim templates from StatefulSets that already exist.
///
/// The cluster fills in defaults on creation and the templates are
/// immutable afterwards.
pub fn keep_volume_claim_templates(desired: &mut [Value], existing: &ResourceMap) {
    for child in desired.iter_mut() {
        if child.get("kind").and_then(Value::as_str) != Some("StatefulSet") {
            continue;
        }
        let Some(name) = object_name(child).map(str::to_string) else {
            continue;
        };
        let Some(templates) = existing
            .get(STATEFUL_SET, &name)
            .and_then(volume_claim_templates)
        else {
            continue;
        };

        if let Some(spec) = child.get_mut("spec").and_then(Value::as_object_mut) {
            spec.insert("volumeClaimTemplates".to_string(), templates.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_map_requires_storage() {
        let data = json!({"STORAGE_NAME": "default", "STORE_PATH": "orgs/1/"});
        let values = ConfigMapValues::from_data(data.as_object().unwrap()).unwrap();
        assert_eq!(values.storage_name, "default");
        assert_eq!(values.store_filename, "");

        let partial = json!({"STORAGE_NAME": "default"});
        assert!(ConfigMapValues::from_data(partial.as_object().unwrap()).is_none());
    }

    #[test]
    fn existing_claim_templates_win() {
        let mut desired = vec![
            json!({"kind": "StatefulSet", "metadata": {"name": "crawl-c1"},
                   "spec": {"volumeClaimTemplates": [{"fresh": true}]}}),
            json!({"kind": "Service", "metadata": {"name": "crawl-c1"}, "spec": {}}),
            json!({"kind": "StatefulSet", "metadata": {"name": "redis-c1"},
                   "spec": {"volumeClaimTemplates": [{"fresh": true}]}}),
        ];
        let existing = ResourceMap::new().with(
            STATEFUL_SET,
            "crawl-c1",
            json!({"spec": {"volumeClaimTemplates": [{"existing": true}]}}),
        );

        keep_volume_claim_templates(&mut desired, &existing);

        assert_eq!(desired[0]["spec"]["volumeClaimTemplates"][0]["existing"], true);
        assert!(desired[1]["spec"].get("volumeClaimTemplates").is_none());
        assert_eq!(desired[2]["spec"]["volumeClaimTemplates"][0]["fresh"], true);
    }
}
