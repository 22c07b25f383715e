use axum::{Json, Router, extract::State, routing::get};

use crate::models::AppState;
use crate::routes::ApiOk;

#[derive(serde::Serialize)]
pub struct HealthData {
    pub status: &'static str,
    pub catalog_backend: &'static str,
    pub appointment_backend: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// Unauthenticated liveness check.
pub async fn health(State(state): State<AppState>) -> Json<ApiOk<HealthData>> {
    let (catalog_backend, appointment_backend) = state.scheduler.backend_tags();
    Json(ApiOk {
        data: HealthData {
            status: "ok",
            catalog_backend,
            appointment_backend,
        },
    })
}
