use actix_web::{http::StatusCode, HttpResponse};

use crate::routes::ApiResponse;

/// GET /health_check
///
/// Liveness only: touches neither the credential store nor the blob store.
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::new(
        StatusCode::OK,
        serde_json::json!({ "status": "up" }),
        "OK",
    ))
}
