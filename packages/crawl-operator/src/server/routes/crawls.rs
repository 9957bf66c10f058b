use axum::{extract::Extension, Json};

use crate::common::OperatorError;
use crate::domains::crawl_jobs::models::{
    CustomizeRequest, CustomizeResponse, SyncRequest, SyncResponse,
};
use crate::domains::crawl_jobs::{related_resources, sync_crawl};
use crate::kernel::OperatorDeps;

pub async fn crawl_sync_handler(
    Extension(deps): Extension<OperatorDeps>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, OperatorError> {
    Ok(Json(sync_crawl(&deps, request).await?))
}

pub async fn crawl_finalize_handler(
    Extension(deps): Extension<OperatorDeps>,
    Json(mut request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, OperatorError> {
    // Only registered as the finalize hook, so the flag is implied
    request.finalizing = true;
    tracing::debug!(crawl = %request.parent.metadata.name, "finalize hook");
    Ok(Json(sync_crawl(&deps, request).await?))
}

pub async fn crawl_customize_handler(
    Json(request): Json<CustomizeRequest>,
) -> Result<Json<CustomizeResponse>, OperatorError> {
    Ok(Json(related_resources(&request.parent)?))
}
