use axum::{extract::Extension, Json};

use crate::common::OperatorError;
use crate::domains::profile_browsers::{
    sync_profile_browser, ProfileBrowserSyncRequest, ProfileBrowserSyncResponse,
};
use crate::kernel::OperatorDeps;

pub async fn profile_browser_sync_handler(
    Extension(deps): Extension<OperatorDeps>,
    Json(request): Json<ProfileBrowserSyncRequest>,
) -> Result<Json<ProfileBrowserSyncResponse>, OperatorError> {
    Ok(Json(sync_profile_browser(&deps, request).await?))
}
