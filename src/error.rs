use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::AppointmentStatus;

/// Caller-facing scheduling failures. Every variant is recoverable and is
/// returned to the caller as-is; only `Contention` is worth retrying.
#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: Uuid },

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("{time} is not on the {duration_minutes}-minute slot grid starting at {window_start}")]
    SlotMisaligned {
        time: NaiveTime,
        duration_minutes: i32,
        window_start: NaiveTime,
    },

    #[error("slot {date} {time} is already taken")]
    SlotUnavailable { date: NaiveDate, time: NaiveTime },

    #[error("cannot move appointment from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("appointment slot {date} {time} has already started")]
    PastDue { date: NaiveDate, time: NaiveTime },

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("no queued appointment for this student on {0}")]
    NotInQueue(NaiveDate),

    #[error("service {0} is not accepting bookings")]
    ServiceInactive(Uuid),

    #[error("{0}")]
    Validation(String),

    #[error("store is busy, retry shortly")]
    Contention,

    #[error("storage error: {0}")]
    Storage(String),
}

impl SchedulingError {
    pub fn appointment_not_found(id: Uuid) -> Self {
        SchedulingError::NotFound { what: "appointment", id }
    }

    pub fn service_not_found(id: Uuid) -> Self {
        SchedulingError::NotFound { what: "service", id }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SchedulingError::NotFound { .. } => "NOT_FOUND",
            SchedulingError::InvalidDate(_) => "INVALID_DATE",
            SchedulingError::SlotMisaligned { .. } => "SLOT_MISALIGNED",
            SchedulingError::SlotUnavailable { .. } => "SLOT_UNAVAILABLE",
            SchedulingError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SchedulingError::PastDue { .. } => "PAST_DUE",
            SchedulingError::Unauthorized(_) => "UNAUTHORIZED",
            SchedulingError::NotInQueue(_) => "NOT_IN_QUEUE",
            SchedulingError::ServiceInactive(_) => "SERVICE_INACTIVE",
            SchedulingError::Validation(_) => "VALIDATION_ERROR",
            SchedulingError::Contention => "CONTENTION",
            SchedulingError::Storage(_) => "INTERNAL",
        }
    }
}

impl From<sqlx::Error> for SchedulingError {
    fn from(e: sqlx::Error) -> Self {
        SchedulingError::Storage(format!("db error: {e}"))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    Forbidden(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    Unavailable(&'static str, String),
    Internal(String),
}

impl ApiError {
    pub fn missing_identity() -> Self {
        ApiError::Unauthorized("MISSING_IDENTITY", "Caller identity headers are missing or invalid".into())
    }

    fn to_error_response(code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
            },
        })
    }
}

impl From<SchedulingError> for ApiError {
    fn from(e: SchedulingError) -> Self {
        let code = e.code();
        let message = e.to_string();
        match e {
            SchedulingError::NotFound { .. } | SchedulingError::NotInQueue(_) => {
                ApiError::NotFound(code, message)
            }
            SchedulingError::InvalidDate(_)
            | SchedulingError::SlotMisaligned { .. }
            | SchedulingError::Validation(_) => ApiError::BadRequest(code, message),
            SchedulingError::SlotUnavailable { .. }
            | SchedulingError::InvalidTransition { .. }
            | SchedulingError::PastDue { .. }
            | SchedulingError::ServiceInactive(_) => ApiError::Conflict(code, message),
            SchedulingError::Unauthorized(_) => ApiError::Forbidden(code, message),
            SchedulingError::Contention => ApiError::Unavailable(code, message),
            SchedulingError::Storage(msg) => {
                tracing::error!(error = %msg, "storage failure");
                ApiError::Internal(msg)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(code, msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Forbidden(code, msg) => {
                (StatusCode::FORBIDDEN, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::BadRequest(code, msg) => {
                (StatusCode::BAD_REQUEST, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::NotFound(code, msg) => {
                (StatusCode::NOT_FOUND, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Conflict(code, msg) => {
                (StatusCode::CONFLICT, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Unavailable(code, msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError::to_error_response(code, &msg),
            )
                .into_response(),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::to_error_response("INTERNAL", &msg),
            )
                .into_response(),
        }
    }
}
