use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::domains::crawl_jobs::models::{ObjectMeta, ResourceMap};

/// Label on the trigger naming the crawl-config to run.
pub const CRAWL_CONFIG_LABEL: &str = "btrix.crawlconfig";

/// The Job object a CronJob spawned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerObject {
    pub metadata: ObjectMeta,
    pub status: TriggerStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerStatus {
    pub succeeded: u32,
}

/// Body of the decorator `sync` call for triggers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerSyncRequest {
    pub object: TriggerObject,
    pub attachments: ResourceMap,
}

/// Completion block set on a trigger once its crawl is done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerCompletion {
    pub succeeded: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    pub completion_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSyncResponse {
    pub attachments: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TriggerCompletion>,
}

impl TriggerSyncResponse {
    pub fn attach(attachments: Vec<Value>) -> Self {
        Self {
            attachments,
            annotations: None,
            status: None,
        }
    }

    /// Mark the trigger finished at `finished`, with no attachments.
    /// `completion` is only set the first time.
    pub fn finished(metadata: &ObjectMeta, finished: String, completion: bool) -> Self {
        let status = completion.then(|| TriggerCompletion {
            succeeded: 1,
            start_time: metadata.creation_timestamp.clone(),
            completion_time: finished.clone(),
        });

        Self {
            attachments: Vec::new(),
            annotations: Some(BTreeMap::from([("finished".to_string(), finished)])),
            status,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.annotations
            .as_ref()
            .is_some_and(|a| a.contains_key("finished"))
    }
}
