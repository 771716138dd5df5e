use vidtube_types::api::HealthStatus;

use crate::error::ApiError;
use crate::response::ApiResponse;

/// GET /api/v1/healthcheck
pub async fn healthcheck() -> ApiResponse<HealthStatus> {
    ApiResponse::ok(
        HealthStatus {
            status: "ok".to_string(),
        },
        "Health check passed",
    )
}

/// Envelope-shaped 404 for any route that does not exist.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}
