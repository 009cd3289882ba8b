use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::{BossbatError, JobError, Result};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Outcome of one occurrence, as seen by every middleware layer.
pub type WorkResult = std::result::Result<(), JobError>;

/// The job body. Receives the job name.
pub type WorkFn = Arc<dyn Fn(String) -> BoxFuture<WorkResult> + Send + Sync>;

/// Interval between two runs: either raw milliseconds or a human duration such as `"200 ms"`.
///
/// From JSON, any non-negative number is accepted; fractions are rounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Every {
    Millis(u64),
    Human(String),
}

impl From<u64> for Every {
    fn from(ms: u64) -> Self {
        Self::Millis(ms)
    }
}

impl From<Duration> for Every {
    fn from(d: Duration) -> Self {
        Self::Millis(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

impl From<&str> for Every {
    fn from(s: &str) -> Self {
        Self::Human(s.to_string())
    }
}

impl From<String> for Every {
    fn from(s: String) -> Self {
        Self::Human(s)
    }
}

impl TryFrom<&Value> for Every {
    type Error = BossbatError;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(Self::Human(s.clone())),
            Value::Number(n) => match (n.as_u64(), n.as_f64()) {
                (Some(ms), _) => Ok(Self::Millis(ms)),
                // Fractional milliseconds round to the nearest whole one.
                (None, Some(ms)) if ms.is_finite() && ms >= 0.0 => Ok(Self::Millis(ms.round() as u64)),
                _ => Err(BossbatError::invalid_kind(
                    "number",
                    format!("{n} is not a non-negative number of milliseconds"),
                )),
            },
            other => Err(BossbatError::invalid_kind(
                json_kind(other),
                "expected a duration string or a number of milliseconds",
            )),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// When a job fires on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Fixed delay between occurrences.
    Interval { every: Every },
    /// Cron expression (5 or 6 fields). `timezone` overrides the worker's `tz`.
    Cron {
        expression: String,
        timezone: Option<String>,
    },
    /// Never fires by itself; runs only through `demand`.
    OnDemand,
}

impl Trigger {
    pub fn every(every: impl Into<Every>) -> Self {
        Self::Interval {
            every: every.into(),
        }
    }

    pub fn cron(expression: impl Into<String>) -> Self {
        Self::Cron {
            expression: expression.into(),
            timezone: None,
        }
    }

    pub fn cron_in(expression: impl Into<String>, timezone: impl Into<String>) -> Self {
        Self::Cron {
            expression: expression.into(),
            timezone: Some(timezone.into()),
        }
    }

    /// Interval and cron jobs rearm themselves after each notification.
    pub fn is_recurring(&self) -> bool {
        !matches!(self, Self::OnDemand)
    }

    /// Read a trigger out of a JSON job table entry.
    ///
    /// Recognized keys are `every` (string or number), `cron` and `timezone`.
    /// An entry with neither `every` nor `cron` is on-demand.
    pub fn from_value(value: &Value) -> Result<Self> {
        if let Some(every) = value.get("every").filter(|v| !v.is_null()) {
            return Ok(Self::Interval {
                every: Every::try_from(every)?,
            });
        }
        match value.get("cron").filter(|v| !v.is_null()) {
            Some(Value::String(expression)) => {
                let timezone = match value.get("timezone") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(tz)) => Some(tz.clone()),
                    Some(other) => {
                        return Err(BossbatError::invalid_kind(
                            json_kind(other),
                            "timezone must be a string",
                        ));
                    }
                };
                Ok(Self::Cron {
                    expression: expression.clone(),
                    timezone,
                })
            }
            Some(other) => Err(BossbatError::invalid_kind(
                json_kind(other),
                "cron must be an expression string",
            )),
            None => Ok(Self::OnDemand),
        }
    }
}

/// A named unit of work plus the trigger that schedules it.
#[derive(Clone)]
pub struct JobDefinition {
    pub trigger: Trigger,
    pub work: WorkFn,
}

impl JobDefinition {
    pub fn new<F, Fut>(trigger: Trigger, work: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkResult> + Send + 'static,
    {
        Self {
            trigger,
            work: Arc::new(move |name| Box::pin(work(name))),
        }
    }

    pub fn on_demand<F, Fut>(work: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkResult> + Send + 'static,
    {
        Self::new(Trigger::OnDemand, work)
    }

    pub fn is_recurring(&self) -> bool {
        self.trigger.is_recurring()
    }

    pub fn perform(&self, name: String) -> BoxFuture<WorkResult> {
        (self.work)(name)
    }
}

impl fmt::Debug for JobDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDefinition")
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_from_json_string_and_number() {
        assert_eq!(
            Every::try_from(&json!("200 ms")).unwrap(),
            Every::Human("200 ms".to_string())
        );
        assert_eq!(Every::try_from(&json!(200)).unwrap(), Every::Millis(200));
    }

    #[test]
    fn every_rejects_objects() {
        let err = Every::try_from(&json!({})).unwrap_err();
        assert!(matches!(err, BossbatError::InvalidTriggerKind { ref kind, .. } if kind == "object"));
    }

    #[test]
    fn every_rounds_fractional_millis() {
        assert_eq!(Every::try_from(&json!(200.5)).unwrap(), Every::Millis(201));
        assert_eq!(Every::try_from(&json!(0.4)).unwrap(), Every::Millis(0));
        assert_eq!(
            Trigger::from_value(&json!({ "every": 199.6 })).unwrap(),
            Trigger::every(200u64)
        );
    }

    #[test]
    fn every_rejects_negative_numbers() {
        let err = Every::try_from(&json!(-5)).unwrap_err();
        assert!(matches!(err, BossbatError::InvalidTriggerKind { ref kind, .. } if kind == "number"));
    }

    #[test]
    fn trigger_from_value_picks_variant() {
        assert_eq!(
            Trigger::from_value(&json!({ "every": "1s" })).unwrap(),
            Trigger::every("1s")
        );
        assert_eq!(
            Trigger::from_value(&json!({ "cron": "*/1 * * * * *", "timezone": "Europe/Helsinki" }))
                .unwrap(),
            Trigger::cron_in("*/1 * * * * *", "Europe/Helsinki")
        );
        assert_eq!(Trigger::from_value(&json!({})).unwrap(), Trigger::OnDemand);
    }

    #[test]
    fn trigger_from_value_rejects_bad_every() {
        assert!(Trigger::from_value(&json!({ "every": [1, 2] })).is_err());
        assert!(Trigger::from_value(&json!({ "cron": 5 })).is_err());
    }

    #[test]
    fn only_on_demand_is_not_recurring() {
        assert!(Trigger::every(100u64).is_recurring());
        assert!(Trigger::cron("0 * * * *").is_recurring());
        assert!(!Trigger::OnDemand.is_recurring());
    }

    #[test]
    fn duration_converts_to_millis() {
        assert_eq!(Every::from(Duration::from_secs(2)), Every::Millis(2000));
    }

    #[tokio::test]
    async fn perform_passes_the_job_name() {
        let def = JobDefinition::on_demand(|name| async move {
            if name == "named" {
                Ok(())
            } else {
                Err(format!("unexpected name {name}").into())
            }
        });
        assert!(def.perform("named".to_string()).await.is_ok());
        assert!(def.perform("other".to_string()).await.is_err());
    }
}
