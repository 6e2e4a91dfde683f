use crate::types::FetchConfig;
use chrono::{Duration, NaiveTime, Weekday};

/// Which days are quiet and which day carries the weekly summary.
#[derive(Debug, Clone)]
pub struct CalendarConfig {
    pub silent_weekdays: Vec<Weekday>,
    pub weekly_day: Weekday,
    /// Cutoff used when no push history exists yet.
    pub lookback: Duration,
}

impl CalendarConfig {
    pub fn is_silent(&self, day: Weekday) -> bool {
        self.silent_weekdays.contains(&day)
    }

    pub fn is_weekly_day(&self, day: Weekday) -> bool {
        day == self.weekly_day
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            silent_weekdays: vec![Weekday::Sat, Weekday::Sun],
            weekly_day: Weekday::Fri,
            lookback: Duration::days(1),
        }
    }
}

/// Local times of the three scheduler triggers.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub daily_fetch: NaiveTime,
    pub daily_delivery: NaiveTime,
    pub weekly_fetch: NaiveTime,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_fetch: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(),
            daily_delivery: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or_default(),
            weekly_fetch: NaiveTime::from_hms_opt(10, 16, 0).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobConfig {
    pub backend_url: String,
    /// When set, push history lives in Postgres instead of the backend.
    pub database_url: Option<String>,
    pub webhook_url: Option<String>,
    pub webhook_title: String,
    /// GitHub `owner/name` receiving weekly summaries.
    pub issue_repo: Option<String>,
    pub issue_token: Option<String>,
    /// Linked from every digest footer.
    pub digest_index_url: String,
    pub login_attempts: u32,
    pub calendar: CalendarConfig,
    pub schedule: ScheduleConfig,
    pub fetch: FetchConfig,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:3000/api".to_string(),
            database_url: None,
            webhook_url: None,
            webhook_title: "Today's digest".to_string(),
            issue_repo: None,
            issue_token: None,
            digest_index_url: "https://github.com/MechanicianW/little-robot/issues".to_string(),
            login_attempts: 5,
            calendar: CalendarConfig::default(),
            schedule: ScheduleConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}
