use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::models::{
    Appointment, AppointmentStatus, Caller, NewService, QueueEntry, Role, Service, Slot,
    StudentQueuePosition,
};
use crate::scheduling::catalog::ServiceCatalog;
use crate::scheduling::clock::Clock;
use crate::scheduling::queue::QueueProjector;
use crate::scheduling::slots::SlotGrid;
use crate::scheduling::store::AppointmentStore;

#[derive(Debug, Clone, Deserialize)]
pub struct BookRequest {
    /// Staff book on behalf of a student; students may omit it.
    pub student_id: Option<Uuid>,
    pub service_id: Uuid,
    pub date: String,
    pub time: String,
    pub notes: Option<String>,
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, SchedulingError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| SchedulingError::InvalidDate(format!("{raw:?} is not a YYYY-MM-DD date")))
}

pub fn parse_time(raw: &str) -> Result<NaiveTime, SchedulingError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| SchedulingError::Validation(format!("{raw:?} is not an HH:MM time")))
}

fn ensure_staff(caller: &Caller) -> Result<(), SchedulingError> {
    if caller.role.is_staff() {
        Ok(())
    } else {
        Err(SchedulingError::Unauthorized("only staff can do this"))
    }
}

fn ensure_admin(caller: &Caller) -> Result<(), SchedulingError> {
    if caller.role == Role::Admin {
        Ok(())
    } else {
        Err(SchedulingError::Unauthorized("only admins can manage the service catalog"))
    }
}

fn ensure_owner_or_staff(caller: &Caller, student_id: Uuid) -> Result<(), SchedulingError> {
    if caller.role.is_staff() || caller.user_id == student_id {
        Ok(())
    } else {
        Err(SchedulingError::Unauthorized("appointment belongs to another student"))
    }
}

/// Students act on themselves; staff must name the student.
fn resolve_student(caller: &Caller, requested: Option<Uuid>) -> Result<Uuid, SchedulingError> {
    match (caller.role.is_staff(), requested) {
        (true, Some(id)) => Ok(id),
        (true, None) => Err(SchedulingError::Validation(
            "student_id is required when acting for a student".into(),
        )),
        (false, None) => Ok(caller.user_id),
        (false, Some(id)) if id == caller.user_id => Ok(id),
        (false, Some(_)) => Err(SchedulingError::Unauthorized(
            "students can only act for themselves",
        )),
    }
}

/// Facade over catalog, slot grid, appointment store and queue projector.
/// Holds no mutable state of its own.
pub struct SchedulingService {
    catalog: Arc<dyn ServiceCatalog>,
    store: Arc<AppointmentStore>,
    grid: SlotGrid,
    clock: Arc<dyn Clock>,
}

impl SchedulingService {
    pub fn new(
        catalog: Arc<dyn ServiceCatalog>,
        store: Arc<AppointmentStore>,
        grid: SlotGrid,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            store,
            grid,
            clock,
        }
    }

    pub fn backend_tags(&self) -> (&'static str, &'static str) {
        (self.catalog.backend_tag(), self.store.backend_tag())
    }

    fn date_or_today(&self, raw: Option<&str>) -> Result<NaiveDate, SchedulingError> {
        match raw {
            Some(raw) if !raw.trim().is_empty() => parse_date(raw),
            _ => Ok(self.clock.today()),
        }
    }

    /* ------------------------------------------------------------
       Catalog
       ------------------------------------------------------------ */

    pub async fn list_services(&self) -> Result<Vec<Service>, SchedulingError> {
        self.catalog.list().await
    }

    pub async fn get_service(&self, service_id: Uuid) -> Result<Service, SchedulingError> {
        self.catalog.get(service_id).await
    }

    pub async fn create_service(&self, caller: &Caller, new: NewService) -> Result<Service, SchedulingError> {
        ensure_admin(caller)?;
        let service = self.catalog.create(new).await?;
        tracing::info!(
            service_id = %service.service_id,
            department = %service.department,
            duration_minutes = service.duration_minutes,
            "service created"
        );
        Ok(service)
    }

    pub async fn set_service_active(
        &self,
        caller: &Caller,
        service_id: Uuid,
        active: bool,
    ) -> Result<Service, SchedulingError> {
        ensure_admin(caller)?;
        let service = self.catalog.set_active(service_id, active).await?;
        tracing::info!(%service_id, active, "service availability changed");
        Ok(service)
    }

    /* ------------------------------------------------------------
       Slots and bookings
       ------------------------------------------------------------ */

    pub async fn list_slots(&self, service_id: Uuid, date: &str) -> Result<Vec<Slot>, SchedulingError> {
        let date = parse_date(date)?;
        let service = self.catalog.get(service_id).await?;
        let now = self.clock.now();
        self.grid.check_day(&service, date, now)?;

        let taken = self.store.taken_times(service_id, date).await?;
        Ok(self.grid.project(&service, date, now, &taken))
    }

    pub async fn book(&self, caller: &Caller, req: BookRequest) -> Result<Appointment, SchedulingError> {
        let student_id = resolve_student(caller, req.student_id)?;
        let date = parse_date(&req.date)?;
        let time = parse_time(&req.time)?;
        let service = self.catalog.get(req.service_id).await?;

        self.store
            .book(student_id, &service, date, time, req.notes)
            .await
    }

    pub async fn cancel(&self, caller: &Caller, appointment_id: Uuid) -> Result<Appointment, SchedulingError> {
        let current = self.store.get(appointment_id).await?;
        ensure_owner_or_staff(caller, current.student_id)?;
        tracing::debug!(
            %appointment_id,
            requested_by = %caller.user_id,
            role = caller.role.as_str(),
            "cancel requested"
        );
        self.store.cancel(appointment_id).await
    }

    pub async fn set_status(
        &self,
        caller: &Caller,
        appointment_id: Uuid,
        next: AppointmentStatus,
        admin_notes: Option<String>,
    ) -> Result<Appointment, SchedulingError> {
        ensure_staff(caller)?;
        self.store.set_status(appointment_id, next, admin_notes).await
    }

    pub async fn get_appointment(&self, caller: &Caller, appointment_id: Uuid) -> Result<Appointment, SchedulingError> {
        let appointment = self.store.get(appointment_id).await?;
        ensure_owner_or_staff(caller, appointment.student_id)?;
        Ok(appointment)
    }

    pub async fn list_appointments(
        &self,
        caller: &Caller,
        student_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let student_id = resolve_student(caller, student_id)?;
        self.store.list_for_student(student_id).await
    }

    /* ------------------------------------------------------------
       Queue
       ------------------------------------------------------------ */

    pub async fn list_queue(&self, date: Option<&str>, department: &str) -> Result<Vec<QueueEntry>, SchedulingError> {
        let date = self.date_or_today(date)?;
        let department = department.trim();
        if department.is_empty() {
            return Err(SchedulingError::Validation("department is required".into()));
        }
        let appointments = self.store.active_in_department(date, department).await?;
        Ok(QueueProjector::project(appointments))
    }

    /// One position per department the student is queued in on `date`,
    /// ordered by slot time.
    pub async fn my_position(
        &self,
        caller: &Caller,
        date: Option<&str>,
        student_id: Option<Uuid>,
    ) -> Result<Vec<StudentQueuePosition>, SchedulingError> {
        let student_id = resolve_student(caller, student_id)?;
        let date = self.date_or_today(date)?;

        let mine = self.store.active_for_student(date, student_id).await?;
        if mine.is_empty() {
            return Err(SchedulingError::NotInQueue(date));
        }

        let mut queues: HashMap<String, Vec<QueueEntry>> = HashMap::new();
        let mut out = Vec::with_capacity(mine.len());
        for appointment in mine {
            if !queues.contains_key(&appointment.department) {
                let active = self
                    .store
                    .active_in_department(date, &appointment.department)
                    .await?;
                queues.insert(appointment.department.clone(), QueueProjector::project(active));
            }
            let Some(queue) = queues.get(&appointment.department) else {
                continue;
            };
            // Changed between the two reads; the next read will settle it.
            let Ok(entry) = QueueProjector::locate(queue, appointment.appointment_id, date) else {
                continue;
            };
            out.push(StudentQueuePosition {
                department: appointment.department.clone(),
                entry,
                queue_length: queue.len(),
            });
        }

        if out.is_empty() {
            return Err(SchedulingError::NotInQueue(date));
        }
        out.sort_by_key(|p| p.entry.time);
        Ok(out)
    }
}
