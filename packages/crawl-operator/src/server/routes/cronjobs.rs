use axum::{extract::Extension, Json};

use crate::common::OperatorError;
use crate::domains::scheduled_jobs::{
    sync_scheduled_trigger, TriggerSyncRequest, TriggerSyncResponse,
};
use crate::kernel::OperatorDeps;

pub async fn cronjob_sync_handler(
    Extension(deps): Extension<OperatorDeps>,
    Json(request): Json<TriggerSyncRequest>,
) -> Result<Json<TriggerSyncResponse>, OperatorError> {
    Ok(Json(sync_scheduled_trigger(&deps, request).await?))
}
