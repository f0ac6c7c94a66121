use axum::Json;
use chrono::Utc;

use crate::models::HealthResponse;

/// health
///
/// [Public Route] Liveness probe for load balancers and monitoring.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
        service: "blog-cms".to_string(),
        timestamp: Utc::now(),
    })
}
