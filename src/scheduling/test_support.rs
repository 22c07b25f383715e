use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::models::{AppState, NewService, Service};
use crate::scheduling::catalog::{MemoryCatalog, ServiceCatalog};
use crate::scheduling::clock::Clock;
use crate::scheduling::events::EventBus;
use crate::scheduling::memory_store::MemoryAppointments;
use crate::scheduling::service::SchedulingService;
use crate::scheduling::slots::{DayWindow, SlotGrid};
use crate::scheduling::store::AppointmentStore;

pub fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// Clock the test moves by hand.
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap()
    }
}

/// In-memory wiring with a 09:00-10:00 window, the clock parked at 08:00
/// on `day`, and three active services:
/// - transcript: REG, 15 minutes
/// - verification: REG, 30 minutes
/// - library: LIB, 20 minutes
pub struct Fixture {
    pub clock: Arc<FixedClock>,
    pub events: EventBus,
    pub catalog: Arc<MemoryCatalog>,
    pub store: Arc<AppointmentStore>,
    pub scheduler: Arc<SchedulingService>,
    pub day: NaiveDate,
    pub transcript: Service,
    pub verification: Service,
    pub library: Service,
}

impl Fixture {
    pub async fn new() -> Self {
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let clock = Arc::new(FixedClock::new(day.and_time(t(8, 0))));
        let events = EventBus::new();
        let grid = SlotGrid::new(DayWindow::new(t(9, 0), t(10, 0)).unwrap());

        let catalog = Arc::new(MemoryCatalog::new());
        let store = Arc::new(AppointmentStore::new(
            Arc::new(MemoryAppointments::new()),
            grid,
            clock.clone(),
            events.clone(),
        ));
        let scheduler = Arc::new(SchedulingService::new(
            catalog.clone(),
            store.clone(),
            grid,
            clock.clone(),
        ));

        let transcript = create(&catalog, "Transcript Request", "REG", 15).await;
        let verification = create(&catalog, "Enrollment Verification", "REG", 30).await;
        let library = create(&catalog, "Library Card", "LIB", 20).await;

        Self {
            clock,
            events,
            catalog,
            store,
            scheduler,
            day,
            transcript,
            verification,
            library,
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            scheduler: self.scheduler.clone(),
            events: self.events.clone(),
        }
    }
}

async fn create(catalog: &MemoryCatalog, name: &str, department: &str, duration_minutes: i32) -> Service {
    catalog
        .create(NewService {
            name: name.into(),
            department: department.into(),
            duration_minutes,
        })
        .await
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_moves_only_when_told() {
        let clock = FixedClock::new(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap().and_time(t(8, 0)));
        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now().time(), t(9, 30));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
    }
}
