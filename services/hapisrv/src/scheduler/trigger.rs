//! Firing times for interval jobs
//!
//! All times are local wall-clock. A trigger never catches up: after a firing
//! (or a skipped one) the next due time is the first one strictly after now.

use chrono::{Duration, Months, NaiveDateTime, NaiveTime, Timelike};
use errors::{HapiError, HapiResult};
use hapi_model::{IntervalJob, TimeUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Every `interval` units, counted from process start
    Every { unit: TimeUnit, interval: u32 },
    /// Once per calendar day at a fixed time
    DailyAt(NaiveTime),
    /// Once per minute boundary, `second` seconds past it
    EveryMinute { second: u32 },
}

impl Trigger {
    /// Trigger for a job, `None` for combinations that are not scheduled
    pub fn for_job(job: &IntervalJob) -> HapiResult<Option<Self>> {
        if job.interval >= 1 {
            let interval = u32::try_from(job.interval).map_err(|_| {
                HapiError::configuration(format!(
                    "Job {} interval {} out of range",
                    job.job_id, job.interval
                ))
            })?;
            return Ok(Some(Trigger::Every {
                unit: job.time_unit,
                interval,
            }));
        }
        if job.interval != -1 {
            return Err(HapiError::configuration(format!(
                "Job {} has invalid interval {}",
                job.job_id, job.interval
            )));
        }

        match job.time_unit {
            TimeUnit::Day => {
                let at = job.at_time.as_deref().ok_or_else(|| {
                    HapiError::configuration(format!("Daily job {} has no at_time", job.job_id))
                })?;
                Ok(Some(Trigger::DailyAt(parse_time_of_day(at).ok_or_else(
                    || {
                        HapiError::configuration(format!(
                            "Daily job {} has invalid at_time '{}'",
                            job.job_id, at
                        ))
                    },
                )?)))
            },
            TimeUnit::Minute => {
                let second = match job.at_time.as_deref() {
                    None => 0,
                    Some(at) => parse_second(at).ok_or_else(|| {
                        HapiError::configuration(format!(
                            "Minute job {} has invalid at_time '{}'",
                            job.job_id, at
                        ))
                    })?,
                };
                Ok(Some(Trigger::EveryMinute { second }))
            },
            _ => Ok(None),
        }
    }

    /// First firing after `start`
    pub fn first_due(&self, start: NaiveDateTime) -> Option<NaiveDateTime> {
        match *self {
            Trigger::Every { .. } => self.step(start),
            Trigger::DailyAt(at) => {
                let today = start.date().and_time(at);
                if today > start {
                    Some(today)
                } else {
                    Some(today + Duration::days(1))
                }
            },
            Trigger::EveryMinute { second } => {
                let boundary = start.with_second(0)?.with_nanosecond(0)?;
                let candidate = boundary + Duration::seconds(i64::from(second));
                if candidate > start {
                    Some(candidate)
                } else {
                    Some(candidate + Duration::minutes(1))
                }
            },
        }
    }

    /// Next firing after `due` that lies strictly after `now`
    pub fn next_after(&self, due: NaiveDateTime, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut next = self.step(due)?;
        while next <= now {
            next = self.step(next)?;
        }
        Some(next)
    }

    fn step(&self, from: NaiveDateTime) -> Option<NaiveDateTime> {
        match *self {
            Trigger::Every { unit, interval } => {
                let n = i64::from(interval);
                match unit {
                    TimeUnit::Month => from.checked_add_months(Months::new(interval)),
                    TimeUnit::Week => Some(from + Duration::weeks(n)),
                    TimeUnit::Day => Some(from + Duration::days(n)),
                    TimeUnit::Hour => Some(from + Duration::hours(n)),
                    TimeUnit::Minute => Some(from + Duration::minutes(n)),
                }
            },
            Trigger::DailyAt(_) => Some(from + Duration::days(1)),
            Trigger::EveryMinute { .. } => Some(from + Duration::minutes(1)),
        }
    }
}

/// `HH:MM` or `HH:MM:SS`
fn parse_time_of_day(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
}

/// `:SS` or `SS`, below 60
fn parse_second(text: &str) -> Option<u32> {
    let text = text.trim();
    let digits = text.strip_prefix(':').unwrap_or(text);
    if digits.is_empty() {
        return Some(0);
    }
    digits.parse::<u32>().ok().filter(|s| *s < 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use hapi_model::{JobKind, JobTarget};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    fn job(unit: TimeUnit, interval: i64, at_time: Option<&str>) -> IntervalJob {
        IntervalJob {
            job_id: 1,
            job_name: "job".into(),
            rtuid: "RTU1".into(),
            target: JobTarget::Command("env".into()),
            kind: JobKind::LogStatus,
            time_unit: unit,
            interval,
            at_time: at_time.map(String::from),
            enabled: true,
            timeout_secs: 1,
        }
    }

    #[test]
    fn test_for_job_forms() {
        assert_eq!(
            Trigger::for_job(&job(TimeUnit::Hour, 2, None)).unwrap(),
            Some(Trigger::Every {
                unit: TimeUnit::Hour,
                interval: 2
            })
        );
        assert_eq!(
            Trigger::for_job(&job(TimeUnit::Day, -1, Some("08:30"))).unwrap(),
            Some(Trigger::DailyAt(NaiveTime::from_hms_opt(8, 30, 0).unwrap()))
        );
        assert_eq!(
            Trigger::for_job(&job(TimeUnit::Minute, -1, Some(":15"))).unwrap(),
            Some(Trigger::EveryMinute { second: 15 })
        );
        assert_eq!(
            Trigger::for_job(&job(TimeUnit::Minute, -1, None)).unwrap(),
            Some(Trigger::EveryMinute { second: 0 })
        );
        // Tolerated gap: not armed, not an error
        assert_eq!(Trigger::for_job(&job(TimeUnit::Week, -1, None)).unwrap(), None);
    }

    #[test]
    fn test_for_job_rejects_bad_times() {
        assert!(Trigger::for_job(&job(TimeUnit::Day, -1, None)).is_err());
        assert!(Trigger::for_job(&job(TimeUnit::Day, -1, Some("25:00"))).is_err());
        assert!(Trigger::for_job(&job(TimeUnit::Minute, -1, Some(":75"))).is_err());
        assert!(Trigger::for_job(&job(TimeUnit::Hour, -3, None)).is_err());
    }

    #[test]
    fn test_periodic_counts_from_start() {
        let t = Trigger::Every {
            unit: TimeUnit::Minute,
            interval: 5,
        };
        let start = at(2026, 3, 1, 10, 0, 7);
        assert_eq!(t.first_due(start), Some(at(2026, 3, 1, 10, 5, 7)));
    }

    #[test]
    fn test_daily_today_or_tomorrow() {
        let t = Trigger::DailyAt(NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(
            t.first_due(at(2026, 3, 1, 7, 0, 0)),
            Some(at(2026, 3, 1, 8, 0, 0))
        );
        assert_eq!(
            t.first_due(at(2026, 3, 1, 8, 0, 0)),
            Some(at(2026, 3, 2, 8, 0, 0))
        );
    }

    #[test]
    fn test_minute_boundary_with_offset() {
        let t = Trigger::EveryMinute { second: 15 };
        assert_eq!(
            t.first_due(at(2026, 3, 1, 7, 0, 10)),
            Some(at(2026, 3, 1, 7, 0, 15))
        );
        assert_eq!(
            t.first_due(at(2026, 3, 1, 7, 0, 20)),
            Some(at(2026, 3, 1, 7, 1, 15))
        );
    }

    #[test]
    fn test_next_after_skips_missed_firings() {
        let t = Trigger::EveryMinute { second: 0 };
        let due = at(2026, 3, 1, 7, 0, 0);
        let now = at(2026, 3, 1, 7, 4, 30);
        assert_eq!(t.next_after(due, now), Some(at(2026, 3, 1, 7, 5, 0)));
    }

    #[test]
    fn test_month_steps_clamp_to_month_end() {
        let t = Trigger::Every {
            unit: TimeUnit::Month,
            interval: 1,
        };
        assert_eq!(
            t.first_due(at(2026, 1, 31, 9, 0, 0)),
            Some(at(2026, 2, 28, 9, 0, 0))
        );
    }
}
