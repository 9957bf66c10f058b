use axum::Json;
use serde_json::{json, Value};

/// Liveness probe; answers as long as the process serves requests.
pub async fn health_handler() -> Json<Value> {
    Json(json!({}))
}
