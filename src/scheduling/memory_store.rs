use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::models::{Appointment, AppointmentDraft, AppointmentStatus};
use crate::scheduling::store::AppointmentRepository;

type SlotKey = (Uuid, NaiveDate, NaiveTime);
type CounterKey = (NaiveDate, String);

#[derive(Default)]
struct MemoryState {
    appointments: HashMap<Uuid, Appointment>,
    /// Active (pending/approved) holder of each slot.
    active_slots: HashMap<SlotKey, Uuid>,
    /// Last issued token sequence per day and department.
    counters: HashMap<CounterKey, i32>,
}

/// Process-local store. A single lock covers the record set, so every
/// reserve and status change is applied as one step.
#[derive(Default)]
pub struct MemoryAppointments {
    state: Mutex<MemoryState>,
}

impl MemoryAppointments {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppointmentRepository for MemoryAppointments {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn reserve(&self, draft: AppointmentDraft) -> Result<Appointment, SchedulingError> {
        let mut state = self.state.lock().await;
        let slot: SlotKey = (draft.service_id, draft.date, draft.time);
        if state.active_slots.contains_key(&slot) {
            return Err(SchedulingError::SlotUnavailable {
                date: draft.date,
                time: draft.time,
            });
        }

        let counter = state
            .counters
            .entry((draft.date, draft.department.clone()))
            .or_insert(0);
        *counter += 1;
        let seq = *counter;

        let appointment = draft.into_appointment(seq);
        state.active_slots.insert(slot, appointment.appointment_id);
        state
            .appointments
            .insert(appointment.appointment_id, appointment.clone());
        Ok(appointment)
    }

    async fn fetch(&self, appointment_id: Uuid) -> Result<Option<Appointment>, SchedulingError> {
        Ok(self.state.lock().await.appointments.get(&appointment_id).cloned())
    }

    async fn compare_and_set_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        next: AppointmentStatus,
        admin_notes: Option<String>,
    ) -> Result<Option<Appointment>, SchedulingError> {
        let mut state = self.state.lock().await;
        let Some(appointment) = state.appointments.get_mut(&appointment_id) else {
            return Ok(None);
        };
        if appointment.status != expected {
            return Ok(None);
        }

        appointment.status = next;
        if admin_notes.is_some() {
            appointment.admin_notes = admin_notes;
        }
        appointment.updated_at = Utc::now();
        let updated = appointment.clone();

        if !next.is_active() {
            let slot: SlotKey = (updated.service_id, updated.date, updated.time);
            if state.active_slots.get(&slot) == Some(&appointment_id) {
                state.active_slots.remove(&slot);
            }
        }
        Ok(Some(updated))
    }

    async fn active_for_service(
        &self,
        service_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let state = self.state.lock().await;
        let mut out: Vec<Appointment> = state
            .appointments
            .values()
            .filter(|a| a.service_id == service_id && a.date == date && a.status.is_active())
            .cloned()
            .collect();
        out.sort_by_key(|a| a.time);
        Ok(out)
    }

    async fn active_for_department(
        &self,
        date: NaiveDate,
        department: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let state = self.state.lock().await;
        let mut out: Vec<Appointment> = state
            .appointments
            .values()
            .filter(|a| a.date == date && a.department == department && a.status.is_active())
            .cloned()
            .collect();
        out.sort_by_key(|a| a.token_number.seq);
        Ok(out)
    }

    async fn active_for_student(
        &self,
        date: NaiveDate,
        student_id: Uuid,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let state = self.state.lock().await;
        let mut out: Vec<Appointment> = state
            .appointments
            .values()
            .filter(|a| a.date == date && a.student_id == student_id && a.status.is_active())
            .cloned()
            .collect();
        out.sort_by_key(|a| a.time);
        Ok(out)
    }

    async fn list_for_student(&self, student_id: Uuid) -> Result<Vec<Appointment>, SchedulingError> {
        let state = self.state.lock().await;
        let mut out: Vec<Appointment> = state
            .appointments
            .values()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| (b.date, b.time, b.created_at).cmp(&(a.date, a.time, a.created_at)));
        Ok(out)
    }
}
