use crate::config::ScheduleConfig;
use crate::pipeline::DigestJob;
use crate::types::PushType;
use chrono::{DateTime, Datelike, Days, Local, NaiveTime, TimeZone, Weekday};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    DailyFetch,
    DailyDelivery,
    WeeklyFetch,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::DailyFetch => "daily fetch",
            Trigger::DailyDelivery => "daily delivery",
            Trigger::WeeklyFetch => "weekly fetch",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct TriggerSpec {
    pub trigger: Trigger,
    pub time: NaiveTime,
    /// `None` fires every day.
    pub weekday: Option<Weekday>,
}

impl TriggerSpec {
    /// First local time strictly after `after` at which this trigger fires.
    pub fn next_fire(&self, after: DateTime<Local>) -> Option<DateTime<Local>> {
        let today = after.date_naive();
        (0..=8u64).find_map(|offset| {
            let date = today.checked_add_days(Days::new(offset))?;
            if self.weekday.is_some_and(|day| day != date.weekday()) {
                return None;
            }
            let candidate = Local.from_local_datetime(&date.and_time(self.time)).earliest()?;
            (candidate > after).then_some(candidate)
        })
    }
}

/// Fixed calendar of triggers driving a [`DigestJob`].
#[derive(Debug, Clone)]
pub struct Schedule {
    triggers: Vec<TriggerSpec>,
}

impl Schedule {
    pub fn new(config: &ScheduleConfig, weekly_day: Weekday) -> Self {
        Self {
            triggers: vec![
                TriggerSpec {
                    trigger: Trigger::DailyFetch,
                    time: config.daily_fetch,
                    weekday: None,
                },
                TriggerSpec {
                    trigger: Trigger::DailyDelivery,
                    time: config.daily_delivery,
                    weekday: None,
                },
                TriggerSpec {
                    trigger: Trigger::WeeklyFetch,
                    time: config.weekly_fetch,
                    weekday: Some(weekly_day),
                },
            ],
        }
    }

    pub fn triggers(&self) -> &[TriggerSpec] {
        &self.triggers
    }

    pub fn next_fire(&self, after: DateTime<Local>) -> Option<(DateTime<Local>, Trigger)> {
        self.triggers
            .iter()
            .filter_map(|spec| spec.next_fire(after).map(|at| (at, spec.trigger)))
            .min_by_key(|(at, _)| *at)
    }

    /// Runs forever, firing each trigger in turn. A trigger never overlaps
    /// the previous one; a slow batch simply delays the next check.
    pub async fn run(&self, job: Arc<DigestJob>) {
        info!("Scheduler started with {} triggers", self.triggers.len());
        let mut last = Local::now();

        loop {
            let Some((at, trigger)) = self.next_fire(last) else {
                error!("No upcoming trigger, stopping scheduler");
                return;
            };

            info!("Next trigger: {} at {}", trigger, at.format("%Y-%m-%d %H:%M:%S"));
            let wait = (at - Local::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            fire(&job, trigger).await;
            last = at;
        }
    }
}

pub async fn fire(job: &DigestJob, trigger: Trigger) {
    info!("Trigger fired: {}", trigger);

    match trigger {
        Trigger::DailyFetch | Trigger::WeeklyFetch => {
            let kind = if trigger == Trigger::WeeklyFetch {
                PushType::Weekly
            } else {
                PushType::Daily
            };
            match job.run_batch(kind).await {
                Ok(report) => info!(batch_id = %report.batch_id, "Batch finished: {:?}", report.status),
                Err(e) => error!("Batch failed: {}", e),
            }
        }
        Trigger::DailyDelivery => match job.deliver().await {
            Ok(Some(_)) => {}
            Ok(None) => info!("Nothing to deliver"),
            Err(e) => error!("{}", e),
        },
    }
}
