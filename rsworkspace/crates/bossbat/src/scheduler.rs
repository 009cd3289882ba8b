use chrono::Utc;
use tracing::debug;

use crate::{
    error::{BossbatError, Result},
    keys::KeySpace,
    schedule::{MIN_DELAY, Plan},
    traits::TimerStore,
};

/// Arms timer keys. Every write is "set if absent", so racing workers that try
/// to arm the same cycle collapse into one timer.
#[derive(Clone)]
pub struct TriggerScheduler<S> {
    store: S,
    keys: KeySpace,
}

impl<S: TimerStore> TriggerScheduler<S> {
    pub fn new(store: S, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Arm the next run of `name`.
    ///
    /// Without a plan this is a demand: the demand key is armed with the minimal
    /// TTL so it expires at once, leaving any regular timer untouched.
    /// Returns `true` if this call armed the key, `false` if it was already armed
    /// (or the plan has no upcoming occurrence).
    pub async fn schedule_run(&self, name: &str, plan: Option<&Plan>) -> Result<bool> {
        let (key, delay) = match plan {
            None => (self.keys.demand_key(name), MIN_DELAY),
            Some(plan) => match plan.next_delay(Utc::now()) {
                Some(delay) => (self.keys.job_key(name), delay),
                None => {
                    debug!(job = %name, "No upcoming occurrence, not arming");
                    return Ok(false);
                }
            },
        };

        let armed = self
            .store
            .arm(key.clone(), name.to_string(), delay)
            .await
            .map_err(|e| BossbatError::Store(e.to_string()))?;

        if armed {
            debug!(job = %name, key = %key, delay_ms = delay.as_millis() as u64, "Armed timer");
        }
        Ok(armed)
    }

    /// Delete the regular timer of `name`. An in-flight lock or demand is left to expire.
    pub async fn disarm(&self, name: &str) -> Result<()> {
        self.store
            .disarm(self.keys.job_key(name))
            .await
            .map_err(|e| BossbatError::Store(e.to_string()))
    }
}
