//! Turns a cron-spawned trigger into a crawl.
//!
//! The trigger's name doubles as the crawl id. The first sync creates the
//! crawl record and attaches a CrawlJob; later syncs pass the attachment
//! through until the crawl finishes, then mark the trigger complete.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::models::{TriggerSyncRequest, TriggerSyncResponse, CRAWL_CONFIG_LABEL};
use crate::common::utils::{dt_now, to_k8s_date};
use crate::common::{CrawlConfigId, OperatorError};
use crate::domains::crawl_jobs::models::{
    CrawlConfig, CrawlJobSpec, ObjectMeta, Organization, User, CRAWL_JOB,
};
use crate::domains::crawl_jobs::reconciler::crawl_job_name;
use crate::kernel::OperatorDeps;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CrawlJobDescriptor {
    api_version: &'static str,
    kind: &'static str,
    metadata: ObjectMeta,
    spec: CrawlJobSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<Value>,
}

/// Describe the CrawlJob for a scheduled run of `config`.
pub fn new_crawl_job(
    crawl_id: &str,
    config: &CrawlConfig,
    org: &Organization,
    ttl_seconds: i64,
    now: DateTime<Utc>,
) -> Result<Value> {
    let labels = BTreeMap::from([
        ("crawl".to_string(), crawl_id.to_string()),
        ("role".to_string(), "job".to_string()),
        ("oid".to_string(), config.oid.to_string()),
        ("btrix.crawlconfig".to_string(), config.id.to_string()),
        ("btrix.userid".to_string(), config.last_modified_by.to_string()),
    ]);

    let expire_time =
        (config.crawl_timeout > 0).then(|| to_k8s_date(now + Duration::seconds(config.crawl_timeout)));

    let descriptor = CrawlJobDescriptor {
        api_version: "btrix.cloud/v1",
        kind: "CrawlJob",
        metadata: ObjectMeta {
            name: crawl_job_name(crawl_id),
            labels,
            ..Default::default()
        },
        spec: CrawlJobSpec {
            id: crawl_id.to_string(),
            cid: config.id.to_string(),
            oid: config.oid.to_string(),
            userid: config.last_modified_by.to_string(),
            scale: Some(u32::try_from(config.scale).unwrap_or(1).max(1)),
            expire_time,
            ttl_seconds_after_finished: Some(ttl_seconds),
            manual: false,
            storage_name: Some(org.storage_name.clone()),
            crawler_channel: Some(
                config
                    .crawler_channel
                    .clone()
                    .unwrap_or_else(|| "default".to_string()),
            ),
            max_crawl_size: u64::try_from(config.max_crawl_size).ok().filter(|s| *s > 0),
            profile_filename: config.profile_filename.clone(),
            ..Default::default()
        },
        status: None,
    };

    Ok(serde_json::to_value(descriptor)?)
}

/// Everything needed to start a scheduled crawl, or `None` when the run
/// should be skipped.
async fn load_schedule(
    deps: &OperatorDeps,
    cid: CrawlConfigId,
) -> Result<Option<(CrawlConfig, Organization, User)>> {
    let Some(config) = deps.metadata.get_crawl_config(cid).await? else {
        warn!(cid = %cid, "no crawl config, skipping scheduled crawl");
        return Ok(None);
    };

    let Some(org) = deps.metadata.get_org(config.oid).await? else {
        warn!(cid = %cid, oid = %config.oid, "no org, skipping scheduled crawl");
        return Ok(None);
    };

    if org.read_only {
        info!(cid = %cid, oid = %org.id, "org is read-only, skipping scheduled crawl");
        return Ok(None);
    }

    let Some(user) = deps.metadata.get_user(config.last_modified_by).await? else {
        warn!(cid = %cid, userid = %config.last_modified_by, "no user, skipping scheduled crawl");
        return Ok(None);
    };

    Ok(Some((config, org, user)))
}

/// Handle a decorator `sync` call for a cron trigger.
pub async fn sync_scheduled_trigger(
    deps: &OperatorDeps,
    request: TriggerSyncRequest,
) -> Result<TriggerSyncResponse, OperatorError> {
    let TriggerSyncRequest {
        object,
        attachments,
    } = request;
    let metadata = object.metadata;
    let crawl_id = metadata.name.clone();
    if crawl_id.is_empty() {
        return Err(OperatorError::MissingField("metadata.name"));
    }

    let existing: Vec<Value> = attachments
        .of_kind(CRAWL_JOB)
        .map(|(_, job)| job.clone())
        .collect();

    let record = match deps.metadata.get_crawl_state(&crawl_id).await {
        Ok(record) => record,
        Err(e) => {
            warn!(crawl_id = %crawl_id, error = %e, "cannot read crawl, will retry");
            return Ok(TriggerSyncResponse::attach(existing));
        }
    };

    if let Some(finished) = record.as_ref().and_then(|r| r.finished) {
        let completion = object.status.succeeded == 0;
        if completion {
            info!(crawl_id = %crawl_id, finished = %finished, "scheduled crawl complete");
        }
        return Ok(TriggerSyncResponse::finished(
            &metadata,
            to_k8s_date(finished),
            completion,
        ));
    }

    let job_name = crawl_job_name(&crawl_id);
    if attachments.contains(CRAWL_JOB, &job_name) {
        return Ok(TriggerSyncResponse::attach(existing));
    }

    let cid = metadata
        .labels
        .get(CRAWL_CONFIG_LABEL)
        .and_then(|cid| CrawlConfigId::parse(cid).ok());
    let Some(cid) = cid else {
        warn!(crawl_id = %crawl_id, "trigger has no crawl config label, skipping");
        return Ok(TriggerSyncResponse::finished(&metadata, to_k8s_date(dt_now()), true));
    };

    let (config, org, user) = match load_schedule(deps, cid).await {
        Ok(Some(loaded)) => loaded,
        Ok(None) => {
            return Ok(TriggerSyncResponse::finished(
                &metadata,
                to_k8s_date(dt_now()),
                true,
            ))
        }
        Err(e) => {
            warn!(crawl_id = %crawl_id, error = %e, "cannot load schedule, will retry");
            return Ok(TriggerSyncResponse::attach(existing));
        }
    };

    // Only the first sync creates the record; later ones re-attach the job
    if record.is_none() {
        match deps
            .crawl_creator
            .add_new_crawl(&crawl_id, &config, &user, false)
            .await
        {
            Ok(true) => info!(crawl_id = %crawl_id, cid = %cid, "scheduled crawl created"),
            Ok(false) => info!(crawl_id = %crawl_id, "scheduled crawl already recorded"),
            Err(e) => {
                warn!(crawl_id = %crawl_id, error = %e, "cannot create scheduled crawl, will retry");
                return Ok(TriggerSyncResponse::attach(existing));
            }
        }
    }

    let mut job = new_crawl_job(
        &crawl_id,
        &config,
        &org,
        deps.params.default_ttl_secs,
        dt_now(),
    )?;

    // A job for this crawl may have raced into existence under another name
    let raced_status = existing
        .iter()
        .find(|job| job.pointer("/spec/id").and_then(Value::as_str) == Some(crawl_id.as_str()))
        .and_then(|job| job.get("status"))
        .cloned();
    if let (Some(status), Some(object)) = (raced_status, job.as_object_mut()) {
        object.insert("status".to_string(), status);
    }

    Ok(TriggerSyncResponse::attach(vec![job]))
}
