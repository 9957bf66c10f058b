//! Cluster objects and requests shaped the way the controller sends them.

use chrono::{DateTime, Duration, Utc};
use operator_core::common::utils::{dt_now, to_k8s_date};
use operator_core::common::{CrawlConfigId, OrgId, UserId};
use operator_core::domains::crawl_jobs::models::{
    CrawlConfig, CrawlJobObject, CrawlJobSpec, CrawlState, CrawlStatus, ObjectMeta, Organization,
    ResourceMap, SyncRequest, User, CONFIG_MAP, CRAWL_JOB, POD, PVC, STATEFUL_SET,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// One crawl job and the resources around it.
#[derive(Debug, Clone)]
pub struct CrawlFixture {
    pub id: String,
    pub cid: CrawlConfigId,
    pub oid: OrgId,
    pub userid: UserId,
    pub scale: u32,
    pub stopping: bool,
    pub created: DateTime<Utc>,
}

impl CrawlFixture {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            cid: CrawlConfigId::new(),
            oid: OrgId::new(),
            userid: UserId::new(),
            scale: 1,
            stopping: false,
            created: dt_now() - Duration::minutes(10),
        }
    }

    pub fn in_org(mut self, oid: OrgId) -> Self {
        self.oid = oid;
        self
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    pub fn stopping(mut self) -> Self {
        self.stopping = true;
        self
    }

    pub fn job_name(&self) -> String {
        format!("crawljob-{}", self.id)
    }

    pub fn parent(&self, status: Option<CrawlStatus>) -> CrawlJobObject {
        CrawlJobObject {
            metadata: ObjectMeta {
                name: self.job_name(),
                creation_timestamp: Some(to_k8s_date(self.created)),
                labels: BTreeMap::from([
                    ("crawl".to_string(), self.id.clone()),
                    ("oid".to_string(), self.oid.to_string()),
                ]),
                ..Default::default()
            },
            spec: CrawlJobSpec {
                id: self.id.clone(),
                cid: self.cid.to_string(),
                oid: self.oid.to_string(),
                userid: self.userid.to_string(),
                scale: Some(self.scale),
                stopping: self.stopping,
                ..Default::default()
            },
            status,
        }
    }

    pub fn config_map(&self) -> Value {
        json!({
            "metadata": {
                "name": format!("crawl-config-{}", self.cid),
                "labels": {"btrix.crawlconfig": self.cid.to_string()}
            },
            "data": {
                "STORAGE_NAME": "default",
                "STORE_PATH": format!("{}/", self.oid),
                "STORE_FILENAME": "@ts-@hostsuffix.wacz"
            }
        })
    }

    pub fn pod(&self, ordinal: u32, phase: &str) -> Value {
        json!({
            "metadata": {
                "name": format!("crawl-{}-{}", self.id, ordinal),
                "labels": {"crawl": self.id, "role": "crawler"}
            },
            "status": {"phase": phase}
        })
    }

    pub fn pvc(&self, ordinal: u32) -> Value {
        json!({
            "metadata": {
                "name": format!("crawl-data-crawl-{}-{}", self.id, ordinal),
                "labels": {"crawl": self.id}
            }
        })
    }

    /// Config map plus one crawler pod per replica
    pub fn related(&self, pods_running: bool) -> ResourceMap {
        let phase = if pods_running { "Running" } else { "Pending" };
        let mut related = ResourceMap::new().with(
            CONFIG_MAP,
            format!("crawl-config-{}", self.cid),
            self.config_map(),
        );
        for ordinal in 0..self.scale {
            let pod = self.pod(ordinal, phase);
            related.insert(POD, format!("crawl-{}-{}", self.id, ordinal), pod);
        }
        related
    }

    pub fn with_pvcs(&self, related: ResourceMap) -> ResourceMap {
        (0..self.scale).fold(related, |map, ordinal| {
            map.with(
                PVC,
                format!("crawl-data-crawl-{}-{}", self.id, ordinal),
                self.pvc(ordinal),
            )
        })
    }

    /// Children as they look once the crawler was created
    pub fn children(&self) -> ResourceMap {
        ResourceMap::new().with(
            STATEFUL_SET,
            format!("crawl-{}", self.id),
            json!({
                "metadata": {"name": format!("crawl-{}", self.id)},
                "spec": {
                    "replicas": self.scale,
                    "volumeClaimTemplates": [{
                        "metadata": {"name": "crawl-data"},
                        "spec": {"storageClassName": "standard"}
                    }]
                }
            }),
        )
    }

    /// A sync for a crawl whose crawler already exists
    pub fn running_request(&self, status: Option<CrawlStatus>) -> SyncRequest {
        SyncRequest {
            parent: self.parent(status),
            children: self.children(),
            related: self.related(true),
            finalizing: false,
        }
    }

    pub fn crawl_config(&self) -> CrawlConfig {
        CrawlConfig {
            id: self.cid,
            oid: self.oid,
            name: "Nightly".to_string(),
            scale: self.scale as i32,
            crawl_timeout: 0,
            max_crawl_size: 0,
            crawler_channel: None,
            profile_filename: None,
            last_modified_by: self.userid,
        }
    }

    pub fn org(&self, max_concurrent_crawls: i32) -> Organization {
        Organization {
            id: self.oid,
            name: "Test Org".to_string(),
            storage_name: "default".to_string(),
            read_only: false,
            max_concurrent_crawls,
        }
    }

    pub fn user(&self) -> User {
        User {
            id: self.userid,
            email: "crawler@example.com".to_string(),
            name: "Crawler".to_string(),
        }
    }
}

/// A sibling CrawlJob as listed among related resources.
pub fn sibling_job(name: &str, state: Option<CrawlState>) -> Value {
    let mut job = json!({"metadata": {"name": name}});
    if let Some(state) = state {
        job["status"] = json!({"state": state.as_str()});
    }
    job
}

/// Add sibling jobs to `related` in listing order.
pub fn with_siblings(related: ResourceMap, siblings: &[(&str, Option<CrawlState>)]) -> ResourceMap {
    siblings.iter().fold(related, |map, (name, state)| {
        map.with(CRAWL_JOB, *name, sibling_job(name, *state))
    })
}

/// Status of a crawl that finished `ago` in the past.
pub fn finished_status(state: CrawlState, ago: Duration) -> CrawlStatus {
    CrawlStatus {
        state,
        finished: Some(to_k8s_date(dt_now() - ago)),
        ..Default::default()
    }
}
