//! Interactive browsers used to build crawl login profiles.

use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::models::{ProfileBrowserSyncRequest, ProfileBrowserSyncResponse};
use crate::common::utils::{dt_now, from_k8s_date};
use crate::common::OperatorError;
use crate::kernel::{OperatorDeps, ProfileBrowserParams, RenderRequest};

/// Handle a `sync` call for a profile browser.
///
/// Once the browser's expiry has passed (or it never had a readable one) the
/// resource is deleted and no children are kept.
pub async fn sync_profile_browser(
    deps: &OperatorDeps,
    request: ProfileBrowserSyncRequest,
) -> Result<ProfileBrowserSyncResponse, OperatorError> {
    let spec = request.parent.spec;
    if spec.id.is_empty() {
        return Err(OperatorError::MissingField("spec.id"));
    }

    let expired = from_k8s_date(spec.expire_time.as_deref()).map_or(true, |expire| dt_now() >= expire);
    if expired {
        info!(browser_id = %spec.id, "profile browser expired, deleting");
        let cluster = Arc::clone(&deps.cluster);
        let id = spec.id.clone();
        deps.tasks
            .spawn(format!("delete-profile-browser:{}", spec.id), async move {
                cluster.delete_profile_browser(&id).await
            });

        return Ok(ProfileBrowserSyncResponse {
            status: json!({}),
            children: Vec::new(),
        });
    }

    let params = ProfileBrowserParams::builder()
        .id(spec.id)
        .userid(spec.userid)
        .storage_name(spec.storage_name)
        .storage_path(spec.storage_path)
        .profile_filename(spec.profile_filename)
        .url(spec.start_url.unwrap_or_else(|| "about:blank".to_string()))
        .vnc_password(spec.vnc_password)
        .build();

    let children = deps
        .renderer
        .render(&RenderRequest::ProfileBrowser(params))?;

    Ok(ProfileBrowserSyncResponse {
        status: json!({}),
        children,
    })
}
