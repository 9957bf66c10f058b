//! Request and response shapes of the reconciliation webhooks.
//!
//! Everything the operator owns is typed. Child and related resources are
//! raw cluster objects and stay opaque `Value`s, read only through the
//! accessor functions at the bottom of this module.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::{CrawlJobSpec, CrawlStatus};

pub const STATEFUL_SET: &str = "StatefulSet.apps/v1";
pub const CONFIG_MAP: &str = "ConfigMap.v1";
pub const PVC: &str = "PersistentVolumeClaim.v1";
pub const POD: &str = "Pod.v1";
pub const CRAWL_JOB: &str = "CrawlJob.btrix.cloud/v1";

/// Resources grouped by `Kind.group/version`, then by name.
///
/// Insertion order is the order the controller listed them in and is
/// preserved end to end; admission ranking depends on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceMap(IndexMap<String, IndexMap<String, Value>>);

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: &str, name: &str) -> Option<&Value> {
        self.0.get(kind).and_then(|by_name| by_name.get(name))
    }

    pub fn contains(&self, kind: &str, name: &str) -> bool {
        self.get(kind, name).is_some()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.0.get(kind).map_or(0, IndexMap::len)
    }

    pub fn of_kind(&self, kind: &str) -> impl Iterator<Item = (&String, &Value)> {
        self.0.get(kind).into_iter().flat_map(IndexMap::iter)
    }

    pub fn names(&self, kind: &str) -> Vec<String> {
        self.of_kind(kind).map(|(name, _)| name.clone()).collect()
    }

    pub fn insert(&mut self, kind: &str, name: impl Into<String>, value: Value) {
        self.0
            .entry(kind.to_string())
            .or_default()
            .insert(name.into(), value);
    }

    pub fn with(mut self, kind: &str, name: impl Into<String>, value: Value) -> Self {
        self.insert(kind, name, value);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// The CrawlJob parent object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlJobObject {
    pub metadata: ObjectMeta,
    pub spec: CrawlJobSpec,
    pub status: Option<CrawlStatus>,
}

/// Body of `sync` and `finalize` calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncRequest {
    pub parent: CrawlJobObject,
    pub children: ResourceMap,
    pub related: ResourceMap,
    pub finalizing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub status: CrawlStatus,
    pub children: Vec<Value>,
    pub finalized: bool,
}

impl SyncResponse {
    /// Response that keeps no children around.
    pub fn done(status: CrawlStatus, finalized: bool) -> Self {
        Self {
            status,
            children: Vec::new(),
            finalized,
        }
    }
}

/// Body of the `customize` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomizeRequest {
    pub parent: CrawlJobObject,
    pub controller: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomizeResponse {
    pub related_resources: Vec<RelatedResourceRule>,
}

/// A label query the controller runs before the next sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedResourceRule {
    pub api_version: String,
    pub resource: String,
    pub label_selector: LabelSelector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
}

// =============================================================================
// Accessors for opaque cluster objects
// =============================================================================

pub fn object_name(object: &Value) -> Option<&str> {
    object.pointer("/metadata/name").and_then(Value::as_str)
}

pub fn pod_phase(pod: &Value) -> Option<&str> {
    pod.pointer("/status/phase").and_then(Value::as_str)
}

/// `status.state` of a CrawlJob object; `None` when unset or unknown.
pub fn crawl_job_state(job: &Value) -> Option<super::CrawlState> {
    job.pointer("/status/state")
        .and_then(Value::as_str)
        .and_then(super::CrawlState::parse)
}

pub fn config_map_data(config_map: &Value) -> Option<&serde_json::Map<String, Value>> {
    config_map.get("data").and_then(Value::as_object)
}

pub fn volume_claim_templates(stateful_set: &Value) -> Option<&Value> {
    stateful_set.pointer("/spec/volumeClaimTemplates")
}
