use crate::models::HealthResponse;
use crate::VERSION;
use actix_web::{HttpResponse, Result};

/// Health check endpoint
///
/// # Errors
/// Returns an error if health status cannot be determined
pub async fn health() -> Result<HttpResponse> {
    let response = HealthResponse {
        status: "ok".to_string(),
        message: "U2F step authentication is running".to_string(),
        version: VERSION.to_string(),
    };
    Ok(HttpResponse::Ok().json(response))
}
