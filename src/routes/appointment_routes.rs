// src/routes/appointment_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{AppState, Appointment, AppointmentStatus},
    routes::ApiOk,
    scheduling::service::BookRequest,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", post(book_appointment))
        .route("/appointments/mine", get(list_my_appointments))
        .route("/appointments/{appointment_id}", get(get_appointment))
        .route("/appointments/{appointment_id}/cancel", patch(cancel_appointment))
        .route("/appointments/{appointment_id}/status", patch(set_status))
}

#[derive(Debug, Deserialize)]
pub struct MineQuery {
    pub student_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: AppointmentStatus,
    pub admin_notes: Option<String>,
}

/* ============================================================
   POST /appointments
   ============================================================ */

pub async fn book_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<BookRequest>,
) -> Result<(StatusCode, Json<ApiOk<Appointment>>), ApiError> {
    let appointment = state.scheduler.book(&auth.caller(), body).await?;
    Ok((StatusCode::CREATED, Json(ApiOk { data: appointment })))
}

/* ============================================================
   GET /appointments/mine
   ============================================================ */

pub async fn list_my_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<MineQuery>,
) -> Result<Json<ApiOk<Vec<Appointment>>>, ApiError> {
    let appointments = state
        .scheduler
        .list_appointments(&auth.caller(), q.student_id)
        .await?;
    Ok(Json(ApiOk { data: appointments }))
}

/* ============================================================
   GET /appointments/{appointment_id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let appointment = state
        .scheduler
        .get_appointment(&auth.caller(), appointment_id)
        .await?;
    Ok(Json(ApiOk { data: appointment }))
}

/* ============================================================
   PATCH /appointments/{appointment_id}/cancel
   ============================================================ */

pub async fn cancel_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let appointment = state.scheduler.cancel(&auth.caller(), appointment_id).await?;
    Ok(Json(ApiOk { data: appointment }))
}

/* ============================================================
   PATCH /appointments/{appointment_id}/status (staff)
   ============================================================ */

pub async fn set_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> Result<Json<ApiOk<Appointment>>, ApiError> {
    let appointment = state
        .scheduler
        .set_status(&auth.caller(), appointment_id, body.status, body.admin_notes)
        .await?;
    Ok(Json(ApiOk { data: appointment }))
}
