use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::{
    error::{BossbatError, Result},
    job::{Every, Trigger},
};

/// Shortest TTL the store accepts. Demands are armed with it so they expire at once.
pub const MIN_DELAY: Duration = Duration::from_millis(1);

/// Parse a human duration (`"200 ms"`, `"1h 30m"`, `"250"`) into milliseconds.
///
/// A bare number is read as milliseconds.
pub fn parse_duration(text: &str) -> Result<u64> {
    let compact: String = text.split_whitespace().collect();
    if compact.is_empty() {
        return Err(BossbatError::invalid_kind("string", "empty duration"));
    }
    if let Ok(ms) = compact.parse::<u64>() {
        return Ok(ms);
    }
    humantime::parse_duration(&compact)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .map_err(|e| BossbatError::invalid_kind("string", format!("cannot parse duration '{text}': {e}")))
}

/// Parse a 5- or 6-field cron expression. Five fields get a `0` seconds field.
pub fn parse_cron(expression: &str) -> Result<cron::Schedule> {
    let normalized = match expression.split_whitespace().count() {
        5 => format!("0 {expression}"),
        _ => expression.to_string(),
    };
    cron::Schedule::from_str(&normalized)
        .map_err(|e| BossbatError::invalid_kind("cron", format!("'{expression}': {e}")))
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| BossbatError::InvalidTimezone(name.to_string()))
}

/// A validated trigger, ready to compute delays.
#[derive(Debug, Clone)]
pub enum Plan {
    Interval(Duration),
    Cron { schedule: Box<cron::Schedule>, tz: Tz },
    OnDemand,
}

impl Plan {
    /// Validate `trigger`. `default_tz` applies to cron triggers without their own timezone.
    pub fn resolve(trigger: &Trigger, default_tz: Option<&str>) -> Result<Self> {
        match trigger {
            Trigger::Interval { every } => {
                let ms = match every {
                    Every::Millis(ms) => *ms,
                    Every::Human(text) => parse_duration(text)?,
                };
                Ok(Self::Interval(Duration::from_millis(ms)))
            }
            Trigger::Cron {
                expression,
                timezone,
            } => {
                let schedule = parse_cron(expression)?;
                let tz = match timezone.as_deref().or(default_tz) {
                    Some(name) => parse_timezone(name)?,
                    None => Tz::UTC,
                };
                Ok(Self::Cron {
                    schedule: Box::new(schedule),
                    tz,
                })
            }
            Trigger::OnDemand => Ok(Self::OnDemand),
        }
    }

    /// Delay until the next occurrence after `now`. Never zero.
    ///
    /// `None` for on-demand plans and for cron schedules with no future occurrence.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Self::Interval(every) => Some((*every).max(MIN_DELAY)),
            Self::Cron { schedule, tz } => cron_delay(schedule, *tz, now),
            Self::OnDemand => None,
        }
    }
}

fn cron_delay(schedule: &cron::Schedule, tz: Tz, now: DateTime<Utc>) -> Option<Duration> {
    let mut upcoming = schedule.after(&now.with_timezone(&tz));
    let until = |at: DateTime<Tz>| (at.with_timezone(&Utc) - now).num_milliseconds();

    let mut delay_ms = until(upcoming.next()?);
    if delay_ms <= 0 {
        // Rounded down to nothing; take the occurrence after.
        delay_ms = until(upcoming.next()?);
    }
    let delay_ms = u64::try_from(delay_ms).unwrap_or(0);
    Some(Duration::from_millis(delay_ms).max(MIN_DELAY))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
    }

    #[test]
    fn human_and_numeric_intervals_match() {
        assert_eq!(parse_duration("200 ms").unwrap(), 200);
        assert_eq!(parse_duration("200ms").unwrap(), 200);
        assert_eq!(parse_duration("200").unwrap(), 200);

        let human = Plan::resolve(&Trigger::every("200 ms"), None).unwrap();
        let numeric = Plan::resolve(&Trigger::every(200u64), None).unwrap();
        assert_eq!(human.next_delay(at(0, 0, 0)), numeric.next_delay(at(0, 0, 0)));
    }

    #[test]
    fn compound_durations() {
        assert_eq!(parse_duration("1h 30m").unwrap(), 5_400_000);
        assert_eq!(parse_duration("2 s").unwrap(), 2000);
    }

    #[test]
    fn unparseable_duration_is_invalid_kind() {
        assert!(matches!(
            parse_duration("every now and then"),
            Err(BossbatError::InvalidTriggerKind { .. })
        ));
        assert!(matches!(
            parse_duration("   "),
            Err(BossbatError::InvalidTriggerKind { .. })
        ));
    }

    #[test]
    fn zero_interval_is_clamped() {
        let plan = Plan::resolve(&Trigger::every(0u64), None).unwrap();
        assert_eq!(plan.next_delay(at(0, 0, 0)), Some(MIN_DELAY));
    }

    #[test]
    fn cron_every_second() {
        let plan = Plan::resolve(&Trigger::cron("*/1 * * * * *"), None).unwrap();
        let now = at(0, 0, 0) + chrono::Duration::milliseconds(250);
        assert_eq!(plan.next_delay(now), Some(Duration::from_millis(750)));
    }

    #[test]
    fn five_field_cron_gets_seconds() {
        let plan = Plan::resolve(&Trigger::cron("0 * * * *"), None).unwrap();
        assert_eq!(plan.next_delay(at(0, 30, 0)), Some(Duration::from_secs(30 * 60)));
    }

    #[test]
    fn cron_uses_job_timezone() {
        // 08:00 in Helsinki is 06:00 UTC in January.
        let plan = Plan::resolve(&Trigger::cron_in("0 0 8 * * *", "Europe/Helsinki"), None).unwrap();
        assert_eq!(plan.next_delay(at(5, 0, 0)), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn cron_falls_back_to_worker_timezone() {
        let plan = Plan::resolve(&Trigger::cron("0 0 8 * * *"), Some("Europe/Helsinki")).unwrap();
        assert_eq!(plan.next_delay(at(5, 0, 0)), Some(Duration::from_secs(3600)));

        let utc = Plan::resolve(&Trigger::cron("0 0 8 * * *"), None).unwrap();
        assert_eq!(utc.next_delay(at(5, 0, 0)), Some(Duration::from_secs(3 * 3600)));
    }

    #[test]
    fn sub_millisecond_gap_moves_to_following_occurrence() {
        let plan = Plan::resolve(&Trigger::cron("*/1 * * * * *"), None).unwrap();
        let now = at(0, 0, 0) + chrono::Duration::microseconds(999_600);
        let delay = plan.next_delay(now).unwrap();
        assert!(delay > Duration::ZERO);
        assert_eq!(delay, Duration::from_millis(1000));
    }

    #[test]
    fn invalid_cron_and_timezone() {
        assert!(matches!(
            Plan::resolve(&Trigger::cron("not a cron"), None),
            Err(BossbatError::InvalidTriggerKind { ref kind, .. }) if kind == "cron"
        ));
        assert!(matches!(
            Plan::resolve(&Trigger::cron_in("* * * * * *", "Mars/Olympus"), None),
            Err(BossbatError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn on_demand_has_no_delay() {
        let plan = Plan::resolve(&Trigger::OnDemand, None).unwrap();
        assert_eq!(plan.next_delay(at(0, 0, 0)), None);
    }
}
