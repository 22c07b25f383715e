//! Same-day queue view, rebuilt from the authoritative appointments on every
//! read. Nothing here is cached or persisted.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::models::{Appointment, QueueEntry};

pub struct QueueProjector;

impl QueueProjector {
    /// Ranks active appointments of one date and department by token
    /// sequence. Anything terminal is dropped.
    pub fn project<I>(appointments: I) -> Vec<QueueEntry>
    where
        I: IntoIterator<Item = Appointment>,
    {
        let mut active: Vec<Appointment> = appointments
            .into_iter()
            .filter(|a| a.status.is_active())
            .collect();
        active.sort_by_key(|a| a.token_number.seq);

        active
            .into_iter()
            .enumerate()
            .map(|(rank, a)| QueueEntry {
                appointment_id: a.appointment_id,
                token_number: a.token_number,
                queue_position: rank + 1,
                service_id: a.service_id,
                time: a.time,
                status: a.status,
            })
            .collect()
    }

    pub fn locate(
        queue: &[QueueEntry],
        appointment_id: Uuid,
        date: NaiveDate,
    ) -> Result<QueueEntry, SchedulingError> {
        queue
            .iter()
            .find(|e| e.appointment_id == appointment_id)
            .cloned()
            .ok_or(SchedulingError::NotInQueue(date))
    }
}
