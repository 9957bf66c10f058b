use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CrawlJobObject;
use crate::common::utils::from_k8s_date;
use crate::common::{CrawlConfigId, Id, OperatorError, OrgId};

/// Raw `spec` block of a CrawlJob resource, as the controller sends it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrawlJobSpec {
    pub id: String,
    pub cid: String,
    pub oid: String,
    pub userid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    pub stopping: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_seconds_after_finished: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_restart: Option<String>,
    pub manual: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crawler_channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_crawl_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_filename: Option<String>,
}

impl CrawlJobSpec {
    pub fn scale(&self) -> u32 {
        self.scale.unwrap_or(1).max(1)
    }
}

/// Identity of a crawl job, known even when its crawl-config is not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRef {
    pub id: String,
    pub cid: CrawlConfigId,
    pub oid: OrgId,
    /// Creation time of the CrawlJob resource
    pub started: Option<DateTime<Utc>>,
}

impl CrawlRef {
    pub fn from_parent(parent: &CrawlJobObject) -> Result<Self, OperatorError> {
        let spec = &parent.spec;
        if spec.id.is_empty() {
            return Err(OperatorError::MissingField("spec.id"));
        }

        Ok(Self {
            id: spec.id.clone(),
            cid: parse_id("spec.cid", &spec.cid)?,
            oid: parse_id("spec.oid", &spec.oid)?,
            started: from_k8s_date(parent.metadata.creation_timestamp.as_deref()),
        })
    }
}

fn parse_id<T>(field: &'static str, value: &str) -> Result<Id<T>, OperatorError> {
    if value.is_empty() {
        return Err(OperatorError::MissingField(field));
    }
    Id::parse(value).map_err(|source| OperatorError::InvalidId { field, source })
}

/// Desired state of one crawl for a single reconciliation cycle.
///
/// Built from the resource spec plus the crawl-config map; never mutated
/// once built, except that an expired crawl is asked to stop.
#[derive(Debug, Clone)]
pub struct CrawlSpec {
    pub id: String,
    pub cid: CrawlConfigId,
    pub oid: OrgId,
    pub scale: u32,
    pub storage_name: String,
    pub storage_path: String,
    pub started: DateTime<Utc>,
    pub stopping: bool,
    pub expire_time: Option<DateTime<Utc>>,
}

impl CrawlSpec {
    pub fn crawl_ref(&self) -> CrawlRef {
        CrawlRef {
            id: self.id.clone(),
            cid: self.cid,
            oid: self.oid,
            started: Some(self.started),
        }
    }

    /// Whether workers should wind down this cycle: a stop was requested or
    /// the crawl ran past its expiry.
    pub fn should_stop(&self, now: DateTime<Utc>) -> bool {
        self.stopping || self.expire_time.is_some_and(|expire| now > expire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn spec(expire_time: Option<DateTime<Utc>>) -> CrawlSpec {
        CrawlSpec {
            id: "c1".to_string(),
            cid: CrawlConfigId::new(),
            oid: OrgId::new(),
            scale: 1,
            storage_name: "default".to_string(),
            storage_path: "orgs/1/".to_string(),
            started: Utc::now(),
            stopping: false,
            expire_time,
        }
    }

    #[test]
    fn expiry_forces_stop() {
        let now = Utc::now();
        assert!(spec(Some(now - Duration::seconds(1))).should_stop(now));
        assert!(!spec(Some(now + Duration::seconds(60))).should_stop(now));
        assert!(!spec(None).should_stop(now));
    }

    #[test]
    fn crawl_ref_requires_ids() {
        let mut parent = CrawlJobObject::default();
        assert!(matches!(
            CrawlRef::from_parent(&parent),
            Err(OperatorError::MissingField("spec.id"))
        ));

        parent.spec.id = "c1".to_string();
        parent.spec.cid = "not-a-uuid".to_string();
        parent.spec.oid = OrgId::new().to_string();
        assert!(matches!(
            CrawlRef::from_parent(&parent),
            Err(OperatorError::InvalidId { field: "spec.cid", .. })
        ));

        let cid = CrawlConfigId::new();
        parent.spec.cid = cid.to_string();
        parent.metadata.creation_timestamp = Some("2024-03-01T12:00:00Z".to_string());
        let crawl = CrawlRef::from_parent(&parent).unwrap();
        assert_eq!(crawl.cid, cid);
        assert!(crawl.started.is_some());
    }

    #[test]
    fn scale_defaults_to_one() {
        let raw: CrawlJobSpec = serde_json::from_value(serde_json::json!({"id": "x"})).unwrap();
        assert_eq!(raw.scale(), 1);
    }
}
