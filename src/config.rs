use std::env;

use anyhow::{anyhow, bail, Context};
use chrono::{FixedOffset, NaiveTime};

use crate::scheduling::slots::DayWindow;

#[derive(Clone, Debug)]
pub struct Config {
    /// `None` runs the server on in-memory stores.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub bind_addr: String,
    pub campus_offset: FixedOffset,
    pub window: DayWindow,
    pub booking_retry_attempts: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|s| !s.trim().is_empty());
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let db_max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("DB_MAX_CONNECTIONS must be a positive integer, got {raw:?}"))?,
            None => 10,
        };

        let campus_offset = match lookup("CAMPUS_UTC_OFFSET") {
            Some(raw) => parse_offset(&raw)?,
            None => FixedOffset::east_opt(0).ok_or_else(|| anyhow!("zero offset"))?,
        };

        let start = parse_clock("BOOKING_WINDOW_START", lookup("BOOKING_WINDOW_START"), (9, 0))?;
        let end = parse_clock("BOOKING_WINDOW_END", lookup("BOOKING_WINDOW_END"), (17, 0))?;
        let window = DayWindow::new(start, end)
            .ok_or_else(|| anyhow!("BOOKING_WINDOW_START must be before BOOKING_WINDOW_END"))?;

        let booking_retry_attempts = match lookup("BOOKING_RETRY_ATTEMPTS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("BOOKING_RETRY_ATTEMPTS must be an integer, got {raw:?}"))?
                .max(1),
            None => 3,
        };

        Ok(Self {
            database_url,
            db_max_connections,
            bind_addr,
            campus_offset,
            window,
            booking_retry_attempts,
        })
    }
}

fn parse_clock(key: &str, raw: Option<String>, default: (u32, u32)) -> anyhow::Result<NaiveTime> {
    match raw {
        Some(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M")
            .with_context(|| format!("{key} must be HH:MM, got {raw:?}")),
        None => NaiveTime::from_hms_opt(default.0, default.1, 0)
            .ok_or_else(|| anyhow!("invalid default for {key}")),
    }
}

/// Accepts `+HH:MM` / `-HH:MM`.
fn parse_offset(raw: &str) -> anyhow::Result<FixedOffset> {
    let raw = raw.trim();
    let (sign, rest) = match raw.chars().next() {
        Some('+') => (1, &raw[1..]),
        Some('-') => (-1, &raw[1..]),
        _ => bail!("CAMPUS_UTC_OFFSET must look like +05:30, got {raw:?}"),
    };
    let (hours, minutes) = rest
        .split_once(':')
        .ok_or_else(|| anyhow!("CAMPUS_UTC_OFFSET must look like +05:30, got {raw:?}"))?;
    let hours: i32 = hours.parse().context("CAMPUS_UTC_OFFSET hours")?;
    let minutes: i32 = minutes.parse().context("CAMPUS_UTC_OFFSET minutes")?;
    if !(0..=23).contains(&hours) {
        bail!("CAMPUS_UTC_OFFSET hours out of range: {raw:?}");
    }
    if !(0..60).contains(&minutes) {
        bail!("CAMPUS_UTC_OFFSET minutes out of range: {raw:?}");
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| anyhow!("CAMPUS_UTC_OFFSET out of range: {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_env() {
        let cfg = config_from(&[]).unwrap();
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.bind_addr, "127.0.0.1:8080");
        assert_eq!(cfg.window.start, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(cfg.window.end, NaiveTime::from_hms_opt(17, 0, 0).unwrap());
        assert_eq!(cfg.booking_retry_attempts, 3);
        assert_eq!(cfg.campus_offset.local_minus_utc(), 0);
    }

    #[test]
    fn parses_offset_and_window() {
        let cfg = config_from(&[
            ("CAMPUS_UTC_OFFSET", "+05:30"),
            ("BOOKING_WINDOW_START", "08:30"),
            ("BOOKING_WINDOW_END", "12:00"),
            ("BOOKING_RETRY_ATTEMPTS", "0"),
            ("DATABASE_URL", "postgres://localhost/campus"),
        ])
        .unwrap();
        assert_eq!(cfg.campus_offset.local_minus_utc(), 5 * 3600 + 30 * 60);
        assert_eq!(cfg.window.start, NaiveTime::from_hms_opt(8, 30, 0).unwrap());
        assert_eq!(cfg.booking_retry_attempts, 1);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/campus"));

        let west = config_from(&[("CAMPUS_UTC_OFFSET", "-04:00")]).unwrap();
        assert_eq!(west.campus_offset.local_minus_utc(), -4 * 3600);
    }

    #[test]
    fn rejects_inverted_window_and_bad_offset() {
        assert!(config_from(&[
            ("BOOKING_WINDOW_START", "17:00"),
            ("BOOKING_WINDOW_END", "09:00"),
        ])
        .is_err());
        assert!(config_from(&[("CAMPUS_UTC_OFFSET", "IST")]).is_err());
        assert!(config_from(&[("BOOKING_WINDOW_START", "9am")]).is_err());
    }

    #[test]
    fn rejects_offsets_beyond_a_day() {
        for raw in ["+1193046:00", "+99:00", "-24:00", "+-5:00", "+05:60"] {
            assert!(parse_offset(raw).is_err(), "{raw}");
        }
        assert_eq!(parse_offset("+23:59").unwrap().local_minus_utc(), 23 * 3600 + 59 * 60);
        assert_eq!(parse_offset("-12:00").unwrap().local_minus_utc(), -12 * 3600);
    }
}
