use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use sqlx::FromRow;
use uuid::Uuid;

use crate::scheduling::{events::EventBus, service::SchedulingService};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: std::sync::Arc<SchedulingService>,
    pub events: EventBus,
}

/* -------------------------
   Callers
--------------------------*/

/// Role forwarded by the auth gateway.
/// Sent as `X-Caller-Role: student|staff|admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Staff,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Role::Student),
            "staff" => Some(Role::Staff),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }

    pub fn is_staff(self) -> bool {
        matches!(self, Role::Staff | Role::Admin)
    }
}

/// Pre-authenticated identity threaded into every scheduling call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

#[cfg(test)]
impl Caller {
    pub fn student(user_id: Uuid) -> Self {
        Self { user_id, role: Role::Student }
    }

    pub fn staff(user_id: Uuid) -> Self {
        Self { user_id, role: Role::Staff }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self { user_id, role: Role::Admin }
    }
}

/* -------------------------
   Catalog
--------------------------*/

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Service {
    pub service_id: Uuid,
    pub name: String,
    pub department: String,
    pub duration_minutes: i32,
    #[sqlx(rename = "is_active")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewService {
    pub name: String,
    pub department: String,
    pub duration_minutes: i32,
}

/* -------------------------
   Appointments
--------------------------*/

/// Stored as smallint:
/// 0 pending, 1 approved, 2 rejected, 3 completed, 4 cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending = 0,
    Approved = 1,
    Rejected = 2,
    Completed = 3,
    Cancelled = 4,
}

impl AppointmentStatus {
    /// Active appointments hold their slot and sit in the queue.
    pub fn is_active(self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Approved)
    }

    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Approved, Completed)
                | (Approved, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Approved => "approved",
            AppointmentStatus::Rejected => "rejected",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-day, per-department queue token, displayed as `RE-001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenNumber {
    pub code: String,
    pub seq: i32,
}

impl TokenNumber {
    /// Two-letter code taken from the department's leading letters.
    pub fn department_code(department: &str) -> String {
        let mut code: String = department
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .take(2)
            .map(|c| c.to_ascii_uppercase())
            .collect();
        while code.len() < 2 {
            code.push('X');
        }
        code
    }
}

impl fmt::Display for TokenNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:03}", self.code, self.seq)
    }
}

impl Serialize for TokenNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Appointment {
    pub appointment_id: Uuid,
    pub student_id: Uuid,
    pub service_id: Uuid,
    pub department: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: AppointmentStatus,
    pub token_number: TokenNumber,
    pub notes: Option<String>,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything a booking needs before the store assigns a token sequence.
#[derive(Debug, Clone)]
pub struct AppointmentDraft {
    pub appointment_id: Uuid,
    pub student_id: Uuid,
    pub service_id: Uuid,
    pub department: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AppointmentDraft {
    pub fn into_appointment(self, token_seq: i32) -> Appointment {
        let token_number = TokenNumber {
            code: TokenNumber::department_code(&self.department),
            seq: token_seq,
        };
        Appointment {
            appointment_id: self.appointment_id,
            student_id: self.student_id,
            service_id: self.service_id,
            department: self.department,
            date: self.date,
            time: self.time,
            status: AppointmentStatus::Pending,
            token_number,
            notes: self.notes,
            admin_notes: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/* -------------------------
   Derived views
--------------------------*/

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub available: bool,
    pub elapsed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub appointment_id: Uuid,
    pub token_number: TokenNumber,
    pub queue_position: usize,
    pub service_id: Uuid,
    pub time: NaiveTime,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentQueuePosition {
    pub department: String,
    pub entry: QueueEntry,
    pub queue_length: usize,
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, sqlx::FromRow)]
pub struct AppointmentRow {
    pub appointment_id: Uuid,
    pub student_id: Uuid,
    pub service_id: Uuid,
    pub department: String,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub status: AppointmentStatus,
    pub token_code: String,
    pub token_seq: i32,
    pub notes: Option<String>,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AppointmentRow> for Appointment {
    fn from(row: AppointmentRow) -> Self {
        Appointment {
            appointment_id: row.appointment_id,
            student_id: row.student_id,
            service_id: row.service_id,
            department: row.department,
            date: row.appointment_date,
            time: row.appointment_time,
            status: row.status,
            token_number: TokenNumber {
                code: row.token_code,
                seq: row.token_seq,
            },
            notes: row.notes,
            admin_notes: row.admin_notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
