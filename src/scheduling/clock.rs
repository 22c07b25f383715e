use chrono::{FixedOffset, NaiveDate, NaiveDateTime, Utc};

/// Campus-local wall clock. All "today" and "already started" decisions go
/// through this so there is exactly one notion of local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset).naive_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn system_clock_applies_offset() {
        let ahead = SystemClock::new(FixedOffset::east_opt(3 * 3600).unwrap());
        let utc = SystemClock::new(FixedOffset::east_opt(0).unwrap());
        let diff = ahead.now() - utc.now();
        assert!((diff - Duration::hours(3)).num_seconds().abs() <= 1);
    }
}
