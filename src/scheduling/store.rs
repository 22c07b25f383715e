//! Appointment store: the only writer of appointment records.
//!
//! Persistence backends implement [`AppointmentRepository`], which exposes
//! two atomic primitives (`reserve` and `compare_and_set_status`) plus
//! reads. [`AppointmentStore`] layers the booking rules, the status state
//! machine and event emission on top of whichever backend is configured.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::models::{Appointment, AppointmentDraft, AppointmentStatus, Service};
use crate::scheduling::clock::Clock;
use crate::scheduling::events::{AppointmentEvent, EventBus, EventKind};
use crate::scheduling::slots::SlotGrid;

const MAX_NOTES_LEN: usize = 1000;

/// Lost compare-and-set races tolerated before reporting contention.
const MAX_STATUS_ATTEMPTS: usize = 5;

#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    /// Inserts a pending appointment if no pending/approved appointment holds
    /// `(service_id, date, time)`, taking the next token sequence for
    /// `(date, department)` in the same atomic step. A taken slot fails with
    /// `SlotUnavailable` and consumes no sequence number.
    async fn reserve(&self, draft: AppointmentDraft) -> Result<Appointment, SchedulingError>;

    async fn fetch(&self, appointment_id: Uuid) -> Result<Option<Appointment>, SchedulingError>;

    /// Moves `appointment_id` from `expected` to `next`. Returns `None` when
    /// the stored status is no longer `expected`.
    async fn compare_and_set_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        next: AppointmentStatus,
        admin_notes: Option<String>,
    ) -> Result<Option<Appointment>, SchedulingError>;

    async fn active_for_service(
        &self,
        service_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, SchedulingError>;

    async fn active_for_department(
        &self,
        date: NaiveDate,
        department: &str,
    ) -> Result<Vec<Appointment>, SchedulingError>;

    async fn active_for_student(
        &self,
        date: NaiveDate,
        student_id: Uuid,
    ) -> Result<Vec<Appointment>, SchedulingError>;

    /// Full history, newest slot first.
    async fn list_for_student(&self, student_id: Uuid) -> Result<Vec<Appointment>, SchedulingError>;
}

pub fn clean_notes(raw: Option<String>, field: &str) -> Result<Option<String>, SchedulingError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_NOTES_LEN {
        return Err(SchedulingError::Validation(format!(
            "{field} is too long (max {MAX_NOTES_LEN})"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

pub struct AppointmentStore {
    repo: Arc<dyn AppointmentRepository>,
    grid: SlotGrid,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl AppointmentStore {
    pub fn new(
        repo: Arc<dyn AppointmentRepository>,
        grid: SlotGrid,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            repo,
            grid,
            clock,
            events,
        }
    }

    pub fn backend_tag(&self) -> &'static str {
        self.repo.backend_tag()
    }

    pub async fn book(
        &self,
        student_id: Uuid,
        service: &Service,
        date: NaiveDate,
        time: NaiveTime,
        notes: Option<String>,
    ) -> Result<Appointment, SchedulingError> {
        let notes = clean_notes(notes, "notes")?;
        self.grid.check_bookable(service, date, time, self.clock.now())?;

        let draft = AppointmentDraft {
            appointment_id: Uuid::new_v4(),
            student_id,
            service_id: service.service_id,
            department: service.department.clone(),
            date,
            time,
            notes,
            created_at: Utc::now(),
        };

        let appointment = match self.repo.reserve(draft).await {
            Ok(a) => a,
            Err(e) => {
                tracing::info!(
                    service_id = %service.service_id,
                    %date,
                    %time,
                    error = %e,
                    "booking refused"
                );
                return Err(e);
            }
        };

        tracing::info!(
            appointment_id = %appointment.appointment_id,
            service_id = %appointment.service_id,
            %date,
            %time,
            token = %appointment.token_number,
            "appointment booked"
        );
        self.events
            .publish(AppointmentEvent::from_appointment(EventKind::Booked, &appointment));
        Ok(appointment)
    }

    pub async fn cancel(&self, appointment_id: Uuid) -> Result<Appointment, SchedulingError> {
        self.transition(appointment_id, AppointmentStatus::Cancelled, None)
            .await
    }

    pub async fn set_status(
        &self,
        appointment_id: Uuid,
        next: AppointmentStatus,
        admin_notes: Option<String>,
    ) -> Result<Appointment, SchedulingError> {
        let admin_notes = clean_notes(admin_notes, "admin_notes")?;
        self.transition(appointment_id, next, admin_notes).await
    }

    /// Compare-and-set loop: re-read, re-validate, retry when another
    /// request changed the status in between.
    async fn transition(
        &self,
        appointment_id: Uuid,
        next: AppointmentStatus,
        admin_notes: Option<String>,
    ) -> Result<Appointment, SchedulingError> {
        for _ in 0..MAX_STATUS_ATTEMPTS {
            let current = self.get(appointment_id).await?;
            if !current.status.can_transition_to(next) {
                return Err(SchedulingError::InvalidTransition {
                    from: current.status,
                    to: next,
                });
            }
            if next == AppointmentStatus::Cancelled
                && current.date.and_time(current.time) <= self.clock.now()
            {
                return Err(SchedulingError::PastDue {
                    date: current.date,
                    time: current.time,
                });
            }

            let updated = self
                .repo
                .compare_and_set_status(appointment_id, current.status, next, admin_notes.clone())
                .await?;
            let Some(updated) = updated else {
                tracing::debug!(%appointment_id, "status changed concurrently, re-reading");
                continue;
            };

            tracing::info!(
                %appointment_id,
                from = %current.status,
                to = %updated.status,
                "appointment status changed"
            );
            let kind = if next == AppointmentStatus::Cancelled {
                EventKind::Cancelled
            } else {
                EventKind::StatusChanged
            };
            self.events
                .publish(AppointmentEvent::from_appointment(kind, &updated));
            return Ok(updated);
        }

        tracing::warn!(%appointment_id, "status update kept losing races");
        Err(SchedulingError::Contention)
    }

    pub async fn get(&self, appointment_id: Uuid) -> Result<Appointment, SchedulingError> {
        self.repo
            .fetch(appointment_id)
            .await?
            .ok_or_else(|| SchedulingError::appointment_not_found(appointment_id))
    }

    /// Slot start times held by pending/approved appointments.
    pub async fn taken_times(
        &self,
        service_id: Uuid,
        date: NaiveDate,
    ) -> Result<HashSet<NaiveTime>, SchedulingError> {
        Ok(self
            .repo
            .active_for_service(service_id, date)
            .await?
            .into_iter()
            .map(|a| a.time)
            .collect())
    }

    pub async fn active_in_department(
        &self,
        date: NaiveDate,
        department: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        self.repo.active_for_department(date, department).await
    }

    pub async fn active_for_student(
        &self,
        date: NaiveDate,
        student_id: Uuid,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        self.repo.active_for_student(date, student_id).await
    }

    pub async fn list_for_student(&self, student_id: Uuid) -> Result<Vec<Appointment>, SchedulingError> {
        self.repo.list_for_student(student_id).await
    }
}
