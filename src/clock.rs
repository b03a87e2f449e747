//! Wall-clock helpers: current time in milliseconds and recording-window
//! computation in a configured timezone.
//!
//! The recorder is a live process and its clock genuinely is the system
//! clock (no simulation clock to keep in sync). This module is the single
//! place that reads it, so tests can construct windows around a fixed `now`
//! without reaching for `std::time` anywhere else.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone};
use chrono_tz::Tz;

/// Milliseconds since the Unix epoch, matching `recv_time_ms` / `event_time_ms`
/// columns in the persisted file formats.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Parse an `HH:MM` string into (hour, minute), as `mm_recorder.recorder._parse_hhmm` does.
pub fn parse_hhmm(value: &str, label: &str) -> anyhow::Result<(u32, u32)> {
    let mut parts = value.trim().splitn(2, ':');
    let (h, m) = match (parts.next(), parts.next()) {
        (Some(h), Some(m)) => (h, m),
        _ => anyhow::bail!("{label} must be in HH:MM format (got {value:?})"),
    };
    let hour: u32 = h
        .parse()
        .map_err(|_| anyhow::anyhow!("{label} must be in HH:MM format (got {value:?})"))?;
    let minute: u32 = m
        .parse()
        .map_err(|_| anyhow::anyhow!("{label} must be in HH:MM format (got {value:?})"))?;
    if hour > 23 || minute > 59 {
        anyhow::bail!("{label} must be a valid 24h time (got {value:?})");
    }
    Ok((hour, minute))
}

/// Recording window, expressed in a named timezone. `start` and `end` are
/// times-of-day; `end_day_offset` is the number of days `end` falls after
/// the day `start` falls on (spec §4.5 step 1).
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub tz: Tz,
    pub start_hhmm: (u32, u32),
    pub end_hhmm: (u32, u32),
    pub end_day_offset: i64,
}

/// Compute the concrete `[window_start, window_end)` instants that contain
/// `now`, possibly rolling back one day if `now` falls inside *yesterday's*
/// window (mirrors `mm_recorder.recorder.run_recorder`'s prev-window check).
pub fn compute_window(now: DateTime<Tz>, cfg: &WindowConfig) -> (DateTime<Tz>, DateTime<Tz>) {
    let (window_start, window_end) = window_for_day(now, cfg);
    if now < window_start {
        let prev_start = window_start - ChronoDuration::days(1);
        let prev_end = window_end - ChronoDuration::days(1);
        if now <= prev_end {
            return (prev_start, prev_end);
        }
    }
    (window_start, window_end)
}

fn window_for_day(now: DateTime<Tz>, cfg: &WindowConfig) -> (DateTime<Tz>, DateTime<Tz>) {
    let start_time = NaiveTime::from_hms_opt(cfg.start_hhmm.0, cfg.start_hhmm.1, 0).unwrap();
    let end_time = NaiveTime::from_hms_opt(cfg.end_hhmm.0, cfg.end_hhmm.1, 0).unwrap();

    let start_naive = now.date_naive().and_time(start_time);
    let mut end_naive = now.date_naive().and_time(end_time) + ChronoDuration::days(cfg.end_day_offset);

    let start = cfg.tz.from_local_datetime(&start_naive).single().expect("unambiguous window start");
    let mut end = cfg.tz.from_local_datetime(&end_naive).single().unwrap_or_else(|| {
        // DST fold/gap: fall back to UTC-naive interpretation rather than panic.
        cfg.tz.from_utc_datetime(&end_naive)
    });

    if end <= start {
        end_naive += ChronoDuration::days(1);
        end = cfg.tz.from_local_datetime(&end_naive).single().unwrap_or_else(|| cfg.tz.from_utc_datetime(&end_naive));
    }

    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn berlin() -> Tz {
        "Europe/Berlin".parse().unwrap()
    }

    #[test]
    fn parses_valid_hhmm() {
        assert_eq!(parse_hhmm("00:15", "X").unwrap(), (0, 15));
        assert_eq!(parse_hhmm("23:59", "X").unwrap(), (23, 59));
    }

    #[test]
    fn rejects_invalid_hhmm() {
        assert!(parse_hhmm("24:00", "X").is_err());
        assert!(parse_hhmm("nope", "X").is_err());
    }

    #[test]
    fn window_rolls_back_when_now_is_before_todays_start() {
        let tz = berlin();
        let cfg = WindowConfig { tz, start_hhmm: (0, 0), end_hhmm: (0, 15), end_day_offset: 1 };
        // 00:05 local time: inside yesterday's [00:00, +1d 00:15) window.
        let now = tz.with_ymd_and_hms(2026, 7, 28, 0, 5, 0).unwrap();
        let (start, end) = compute_window(now, &cfg);
        assert_eq!(start.date_naive(), now.date_naive() - ChronoDuration::days(1));
        assert!(now >= start && now < end);
    }

    #[test]
    fn window_for_normal_daytime_window() {
        use chrono::Timelike;
        let tz = berlin();
        let cfg = WindowConfig { tz, start_hhmm: (9, 0), end_hhmm: (17, 0), end_day_offset: 0 };
        let now = tz.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        let (start, end) = compute_window(now, &cfg);
        assert_eq!(start.hour(), 9);
        assert_eq!(end.hour(), 17);
    }
}
