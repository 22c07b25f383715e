// src/routes/queue_routes.rs

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::{ApiError, SchedulingError},
    middleware::auth_context::AuthContext,
    models::{AppState, QueueEntry, StudentQueuePosition},
    routes::ApiOk,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/queue", get(list_queue))
        .route("/queue/me", get(my_position))
}

#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    /// Defaults to today in campus time.
    pub date: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MyPositionQuery {
    pub date: Option<String>,
    pub student_id: Option<Uuid>,
}

/* ============================================================
   GET /queue?date=&department=
   ============================================================ */

pub async fn list_queue(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(q): Query<QueueQuery>,
) -> Result<Json<ApiOk<Vec<QueueEntry>>>, ApiError> {
    let department = q
        .department
        .ok_or_else(|| SchedulingError::Validation("department is required".into()))?;
    let entries = state
        .scheduler
        .list_queue(q.date.as_deref(), &department)
        .await?;
    Ok(Json(ApiOk { data: entries }))
}

/* ============================================================
   GET /queue/me?date=&student_id=
   ============================================================ */

pub async fn my_position(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<MyPositionQuery>,
) -> Result<Json<ApiOk<Vec<StudentQueuePosition>>>, ApiError> {
    let positions = state
        .scheduler
        .my_position(&auth.caller(), q.date.as_deref(), q.student_id)
        .await?;
    Ok(Json(ApiOk { data: positions }))
}
