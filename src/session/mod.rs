//! Session Filter: a UTC-hour gate admitting or rejecting a timestamp for trading.

use chrono::{DateTime, Timelike, Utc};

use crate::domain::stream_config::SessionWindow;

/// Admit if `start <= hour(ts) < end`. `(0, 24)` admits everything.
pub fn admits(window: SessionWindow, ts: DateTime<Utc>) -> bool {
    let hour = ts.hour();
    window.start_hour <= hour && hour < window.end_hour
}

/// The scalp strategy's additional rule: no new entries within 30 minutes of `end`.
pub fn within_end_buffer(window: SessionWindow, ts: DateTime<Utc>, buffer_minutes: i64) -> bool {
    if window.end_hour >= 24 {
        return false;
    }
    let end_of_window = ts
        .date_naive()
        .and_hms_opt(window.end_hour, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(ts);
    let minutes_to_end = (end_of_window - ts).num_minutes();
    (0..buffer_minutes).contains(&minutes_to_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn all_day_window_admits_everything() {
        let window = SessionWindow::all_day();
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 23, 59, 0).unwrap();
        assert!(admits(window, ts));
    }

    #[test]
    fn half_open_window_excludes_end_hour() {
        let window = SessionWindow {
            start_hour: 8,
            end_hour: 16,
        };
        assert!(admits(window, Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap()));
        assert!(admits(window, Utc.with_ymd_and_hms(2026, 1, 1, 15, 59, 0).unwrap()));
        assert!(!admits(window, Utc.with_ymd_and_hms(2026, 1, 1, 16, 0, 0).unwrap()));
        assert!(!admits(window, Utc.with_ymd_and_hms(2026, 1, 1, 7, 59, 0).unwrap()));
    }

    #[test]
    fn end_buffer_blocks_last_thirty_minutes() {
        let window = SessionWindow {
            start_hour: 8,
            end_hour: 16,
        };
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 15, 45, 0).unwrap();
        assert!(within_end_buffer(window, ts, 30));

        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 15, 0, 0).unwrap();
        assert!(!within_end_buffer(window, ts, 30));
    }
}
