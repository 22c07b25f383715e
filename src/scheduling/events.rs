use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentStatus};

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Booked,
    Cancelled,
    StatusChanged,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Booked => "booked",
            EventKind::Cancelled => "cancelled",
            EventKind::StatusChanged => "status_changed",
        }
    }
}

/// Payload handed to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppointmentEvent {
    pub kind: EventKind,
    pub appointment_id: Uuid,
    pub student_id: Uuid,
    pub new_status: AppointmentStatus,
    pub occurred_at: DateTime<Utc>,
}

impl AppointmentEvent {
    pub fn from_appointment(kind: EventKind, appointment: &Appointment) -> Self {
        Self {
            kind,
            appointment_id: appointment.appointment_id,
            student_id: appointment.student_id,
            new_status: appointment.status,
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppointmentEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    /// Fire and forget; nobody listening is fine.
    pub fn publish(&self, event: AppointmentEvent) {
        let receivers = self.tx.send(event.clone()).unwrap_or(0);
        tracing::debug!(
            kind = ?event.kind,
            appointment_id = %event.appointment_id,
            status = %event.new_status,
            receivers,
            "appointment event published"
        );
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppointmentEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind) -> AppointmentEvent {
        AppointmentEvent {
            kind,
            appointment_id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            new_status: AppointmentStatus::Pending,
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let sent = event(EventKind::Booked);
        bus.publish(sent.clone());
        assert_eq!(rx.recv().await.unwrap(), sent);
    }

    #[test]
    fn publishing_without_subscribers_is_not_an_error() {
        EventBus::new().publish(event(EventKind::Cancelled));
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_value(event(EventKind::StatusChanged)).unwrap();
        assert_eq!(json["kind"], "status_changed");
        assert_eq!(json["new_status"], "pending");
        assert_eq!(json["kind"], EventKind::StatusChanged.as_str());
    }
}
