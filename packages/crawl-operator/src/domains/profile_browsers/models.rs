use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domains::crawl_jobs::models::ObjectMeta;

/// `spec` block of a ProfileJob resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileBrowserSpec {
    pub id: String,
    pub userid: String,
    pub storage_name: String,
    pub storage_path: String,
    pub profile_filename: String,
    pub start_url: Option<String>,
    pub vnc_password: Option<String>,
    pub expire_time: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileBrowserObject {
    pub metadata: ObjectMeta,
    pub spec: ProfileBrowserSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileBrowserSyncRequest {
    pub parent: ProfileBrowserObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileBrowserSyncResponse {
    pub status: Value,
    pub children: Vec<Value>,
}
