// src/routes/service_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, SchedulingError},
    middleware::auth_context::AuthContext,
    models::{AppState, NewService, Service, Slot},
    routes::ApiOk,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_services).post(create_service))
        .route("/{service_id}", get(get_service).patch(patch_service))
        .route("/{service_id}/slots", get(list_slots))
}

#[derive(Debug, Deserialize)]
pub struct PatchServiceBody {
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SlotsDto {
    pub service_id: Uuid,
    pub date: String,
    pub slots: Vec<Slot>,
}

/* ============================================================
   GET /services
   ============================================================ */

pub async fn list_services(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<ApiOk<Vec<Service>>>, ApiError> {
    let services = state.scheduler.list_services().await?;
    Ok(Json(ApiOk { data: services }))
}

/* ============================================================
   POST /services
   ============================================================ */

pub async fn create_service(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<NewService>,
) -> Result<(StatusCode, Json<ApiOk<Service>>), ApiError> {
    let service = state.scheduler.create_service(&auth.caller(), body).await?;
    Ok((StatusCode::CREATED, Json(ApiOk { data: service })))
}

/* ============================================================
   GET /services/{service_id}
   ============================================================ */

pub async fn get_service(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(service_id): Path<Uuid>,
) -> Result<Json<ApiOk<Service>>, ApiError> {
    let service = state.scheduler.get_service(service_id).await?;
    Ok(Json(ApiOk { data: service }))
}

/* ============================================================
   PATCH /services/{service_id}
   ============================================================ */

pub async fn patch_service(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(service_id): Path<Uuid>,
    Json(body): Json<PatchServiceBody>,
) -> Result<Json<ApiOk<Service>>, ApiError> {
    let service = state
        .scheduler
        .set_service_active(&auth.caller(), service_id, body.active)
        .await?;
    Ok(Json(ApiOk { data: service }))
}

/* ============================================================
   GET /services/{service_id}/slots?date=YYYY-MM-DD
   ============================================================ */

pub async fn list_slots(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(service_id): Path<Uuid>,
    Query(q): Query<SlotsQuery>,
) -> Result<Json<ApiOk<SlotsDto>>, ApiError> {
    let date = q
        .date
        .ok_or_else(|| SchedulingError::InvalidDate("date is required".into()))?;
    let slots = state.scheduler.list_slots(service_id, &date).await?;
    Ok(Json(ApiOk {
        data: SlotsDto {
            service_id,
            date: date.trim().to_string(),
            slots,
        },
    }))
}
