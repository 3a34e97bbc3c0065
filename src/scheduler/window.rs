//! Campaign scheduling window
//!
//! Bounds when the scheduler may dispatch sessions for a campaign.

use chrono::{Datelike, Local, NaiveTime, Weekday};
use tracing::debug;

/// Scheduling window configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleWindow {
    /// Enable windowing; a disabled window always permits activity
    pub enabled: bool,
    /// Start time (HH:MM format)
    pub start_time: String,
    /// End time (HH:MM format)
    pub end_time: String,
    /// Days of the week to run (0 = Monday, 6 = Sunday)
    pub days: Vec<u8>,
}

impl Default for ScheduleWindow {
    fn default() -> Self {
        Self {
            enabled: false,
            start_time: "00:00".to_string(),
            end_time: "23:59".to_string(),
            days: vec![0, 1, 2, 3, 4, 5, 6],
        }
    }
}

impl ScheduleWindow {
    /// Check if current time is within the scheduled window
    pub fn is_within_schedule(&self) -> bool {
        if !self.enabled {
            return true; // If windowing disabled, always allow
        }

        let now = Local::now();

        // Check day of week
        let today = match now.weekday() {
            Weekday::Mon => 0,
            Weekday::Tue => 1,
            Weekday::Wed => 2,
            Weekday::Thu => 3,
            Weekday::Fri => 4,
            Weekday::Sat => 5,
            Weekday::Sun => 6,
        };

        if !self.days.contains(&today) {
            debug!("Today ({}) not in scheduled days: {:?}", today, self.days);
            return false;
        }

        // Parse start and end times
        let start = match NaiveTime::parse_from_str(&self.start_time, "%H:%M") {
            Ok(t) => t,
            Err(_) => {
                debug!("Invalid start time format: {}", self.start_time);
                return true;
            }
        };

        let end = match NaiveTime::parse_from_str(&self.end_time, "%H:%M") {
            Ok(t) => t,
            Err(_) => {
                debug!("Invalid end time format: {}", self.end_time);
                return true;
            }
        };

        let current_time = now.time();

        // Handle overnight windows (e.g. 22:00 - 06:00)
        if start > end {
            return current_time >= start || current_time <= end;
        }

        current_time >= start && current_time <= end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window_is_open() {
        let window = ScheduleWindow::default();
        assert!(!window.enabled);
        assert!(window.is_within_schedule());
    }

    #[test]
    fn test_disabled_window_always_allows() {
        let window = ScheduleWindow {
            enabled: true,
            days: vec![],
            ..Default::default()
        };
        // No days selected: nothing is permitted
        assert!(!window.is_within_schedule());

        let window = ScheduleWindow {
            enabled: false,
            days: vec![],
            ..Default::default()
        };
        assert!(window.is_within_schedule());
    }

    #[test]
    fn test_all_day_every_day_permits() {
        let window = ScheduleWindow {
            enabled: true,
            ..Default::default()
        };
        assert!(window.is_within_schedule());
    }

    #[test]
    fn test_invalid_time_format_falls_open() {
        let window = ScheduleWindow {
            enabled: true,
            start_time: "not-a-time".into(),
            ..Default::default()
        };
        assert!(window.is_within_schedule());
    }
}
