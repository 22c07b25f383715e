//! Slot grid: the bookable time slots of one service on one day.
//!
//! Slots are derived, never stored. Availability is recomputed from the
//! active appointments the caller fetched from the store for this read.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::SchedulingError;
use crate::models::{Service, Slot};

/// Daily booking window shared by every service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl DayWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Candidate `(start, end)` pairs stepping by `duration_minutes`; a
    /// candidate that would run past the window end is dropped.
    pub fn candidates(&self, duration_minutes: i32) -> Vec<(NaiveTime, NaiveTime)> {
        let Some(step) = step_secs(duration_minutes) else {
            return Vec::new();
        };
        let window_start = u64::from(self.start.num_seconds_from_midnight());
        let window_end = u64::from(self.end.num_seconds_from_midnight());

        let mut out = Vec::new();
        let mut at = window_start;
        while at + step <= window_end {
            if let (Some(start), Some(end)) = (time_at(at), time_at(at + step)) {
                out.push((start, end));
            }
            at += step;
        }
        out
    }

    /// Returns the slot end when `time` starts a whole slot inside the window.
    pub fn align(&self, time: NaiveTime, duration_minutes: i32) -> Result<NaiveTime, SchedulingError> {
        let misaligned = || SchedulingError::SlotMisaligned {
            time,
            duration_minutes,
            window_start: self.start,
        };
        let step = step_secs(duration_minutes).ok_or_else(misaligned)?;
        if time.nanosecond() != 0 {
            return Err(misaligned());
        }

        let at = u64::from(time.num_seconds_from_midnight());
        let window_start = u64::from(self.start.num_seconds_from_midnight());
        let window_end = u64::from(self.end.num_seconds_from_midnight());
        if at < window_start || (at - window_start) % step != 0 || at + step > window_end {
            return Err(misaligned());
        }
        time_at(at + step).ok_or_else(misaligned)
    }
}

fn step_secs(duration_minutes: i32) -> Option<u64> {
    u64::try_from(duration_minutes).ok().filter(|m| *m > 0).map(|m| m * 60)
}

fn time_at(secs: u64) -> Option<NaiveTime> {
    NaiveTime::from_num_seconds_from_midnight_opt(u32::try_from(secs).ok()?, 0)
}

#[derive(Debug, Clone, Copy)]
pub struct SlotGrid {
    window: DayWindow,
}

impl SlotGrid {
    pub fn new(window: DayWindow) -> Self {
        Self { window }
    }

    /// Rejects services closed to new bookings and days before today.
    pub fn check_day(&self, service: &Service, date: NaiveDate, now: NaiveDateTime) -> Result<(), SchedulingError> {
        if !service.active {
            return Err(SchedulingError::ServiceInactive(service.service_id));
        }
        if date < now.date() {
            return Err(SchedulingError::InvalidDate(format!(
                "{date} is before today ({})",
                now.date()
            )));
        }
        Ok(())
    }

    /// Full validation for a booking request; availability is left to the
    /// store, which re-checks it atomically with the insert.
    pub fn check_bookable(
        &self,
        service: &Service,
        date: NaiveDate,
        time: NaiveTime,
        now: NaiveDateTime,
    ) -> Result<(), SchedulingError> {
        self.check_day(service, date, now)?;
        self.window.align(time, service.duration_minutes)?;
        if date.and_time(time) <= now {
            return Err(SchedulingError::InvalidDate(format!(
                "slot {date} {time} has already started"
            )));
        }
        Ok(())
    }

    /// Marks every candidate slot against the times currently held by
    /// pending/approved appointments.
    pub fn project(
        &self,
        service: &Service,
        date: NaiveDate,
        now: NaiveDateTime,
        taken: &HashSet<NaiveTime>,
    ) -> Vec<Slot> {
        self.window
            .candidates(service.duration_minutes)
            .into_iter()
            .map(|(start_time, end_time)| Slot {
                start_time,
                end_time,
                available: !taken.contains(&start_time),
                elapsed: date.and_time(start_time) <= now,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn window(start: NaiveTime, end: NaiveTime) -> DayWindow {
        DayWindow::new(start, end).unwrap()
    }

    fn service(duration_minutes: i32, active: bool) -> Service {
        Service {
            service_id: Uuid::new_v4(),
            name: "Transcript Request".into(),
            department: "REG".into(),
            duration_minutes,
            active,
            created_at: Utc::now(),
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    #[test]
    fn quarter_hour_grid_over_one_hour() {
        let starts: Vec<_> = window(t(9, 0), t(10, 0))
            .candidates(15)
            .into_iter()
            .map(|(s, _)| s)
            .collect();
        assert_eq!(starts, vec![t(9, 0), t(9, 15), t(9, 30), t(9, 45)]);
    }

    #[test]
    fn trailing_partial_slot_is_dropped() {
        let slots = window(t(9, 0), t(10, 0)).candidates(25);
        assert_eq!(slots, vec![(t(9, 0), t(9, 25)), (t(9, 25), t(9, 50))]);
    }

    #[test]
    fn every_candidate_is_aligned_and_inside_window() {
        let w = window(t(8, 30), t(17, 0));
        for duration in [5, 10, 15, 20, 30, 45, 60, 90, 240] {
            for (start, end) in w.candidates(duration) {
                assert!(start >= w.start && end <= w.end);
                let offset = (start - w.start).num_minutes();
                assert_eq!(offset % i64::from(duration), 0);
                assert_eq!((end - start).num_minutes(), i64::from(duration));
                assert_eq!(w.align(start, duration).unwrap(), end);
            }
        }
    }

    #[test]
    fn window_shorter_than_duration_has_no_slots() {
        assert!(window(t(9, 0), t(9, 30)).candidates(45).is_empty());
        assert!(window(t(9, 0), t(9, 30)).candidates(0).is_empty());
    }

    #[test]
    fn late_window_does_not_wrap_past_midnight() {
        let w = window(t(22, 0), NaiveTime::from_hms_opt(23, 59, 59).unwrap());
        let slots = w.candidates(60);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0], (t(22, 0), t(23, 0)));
    }

    #[test]
    fn misaligned_times_are_rejected_not_rounded() {
        let w = window(t(9, 0), t(10, 0));
        for bad in [t(9, 10), t(8, 45), t(10, 0), NaiveTime::from_hms_opt(9, 15, 30).unwrap()] {
            assert!(matches!(
                w.align(bad, 15),
                Err(SchedulingError::SlotMisaligned { .. })
            ));
        }
        assert_eq!(w.align(t(9, 45), 15).unwrap(), t(10, 0));
    }

    #[test]
    fn past_days_and_inactive_services_are_refused() {
        let grid = SlotGrid::new(window(t(9, 0), t(10, 0)));
        let now = day().and_time(t(8, 0));
        let yesterday = day().pred_opt().unwrap();
        assert!(matches!(
            grid.check_day(&service(15, true), yesterday, now),
            Err(SchedulingError::InvalidDate(_))
        ));
        assert!(matches!(
            grid.check_day(&service(15, false), day(), now),
            Err(SchedulingError::ServiceInactive(_))
        ));
        assert!(grid.check_day(&service(15, true), day(), now).is_ok());
    }

    #[test]
    fn today_is_bookable_until_the_slot_starts() {
        let grid = SlotGrid::new(window(t(9, 0), t(10, 0)));
        let svc = service(15, true);
        let now = day().and_time(t(9, 20));
        assert!(matches!(
            grid.check_bookable(&svc, day(), t(9, 15), now),
            Err(SchedulingError::InvalidDate(_))
        ));
        assert!(grid.check_bookable(&svc, day(), t(9, 30), now).is_ok());
    }

    #[test]
    fn projection_marks_taken_and_elapsed_slots() {
        let grid = SlotGrid::new(window(t(9, 0), t(10, 0)));
        let svc = service(15, true);
        let taken: HashSet<_> = [t(9, 45)].into_iter().collect();
        let slots = grid.project(&svc, day(), day().and_time(t(9, 15)), &taken);

        let flags: Vec<_> = slots.iter().map(|s| (s.start_time, s.available, s.elapsed)).collect();
        assert_eq!(
            flags,
            vec![
                (t(9, 0), true, true),
                (t(9, 15), true, true),
                (t(9, 30), true, false),
                (t(9, 45), false, false),
            ]
        );
    }
}
