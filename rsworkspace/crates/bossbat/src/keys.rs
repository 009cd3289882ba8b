//! Store key layout.
//!
//! | Purpose | Key |
//! |---|---|
//! | Recurring/cron timer | `<prefix>:work:<name>` |
//! | Demand timer | `<prefix>:work:demand:<name>` |
//! | Execution lock | `<prefix>:lock:<name>` |

pub const DEFAULT_PREFIX: &str = "bossbat";

const WORK_SEGMENT: &str = "work";
const DEMAND_SEGMENT: &str = "demand";
const LOCK_SEGMENT: &str = "lock";

/// Which timer produced an expiry notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expired {
    Timer(String),
    Demand(String),
}

impl Expired {
    pub fn job_name(&self) -> &str {
        match self {
            Self::Timer(name) | Self::Demand(name) => name,
        }
    }
}

/// Builds and parses the keys of one namespace.
#[derive(Debug, Clone)]
pub struct KeySpace {
    work: String,
    demand: String,
    lock: String,
}

impl KeySpace {
    pub fn new(prefix: &str) -> Self {
        Self {
            work: format!("{prefix}:{WORK_SEGMENT}:"),
            demand: format!("{prefix}:{WORK_SEGMENT}:{DEMAND_SEGMENT}:"),
            lock: format!("{prefix}:{LOCK_SEGMENT}:"),
        }
    }

    pub fn job_key(&self, name: &str) -> String {
        format!("{}{name}", self.work)
    }

    pub fn demand_key(&self, name: &str) -> String {
        format!("{}{name}", self.demand)
    }

    pub fn lock_key(&self, name: &str) -> String {
        format!("{}{name}", self.lock)
    }

    /// Recover the job name from an expired key. `None` for keys outside `<prefix>:work:`.
    ///
    /// The demand prefix is checked first, so a job literally named `demand:x`
    /// has its timer read back as a demand for `x`.
    pub fn parse_expired(&self, key: &str) -> Option<Expired> {
        if let Some(name) = key.strip_prefix(&self.demand) {
            return Some(Expired::Demand(name.to_string()));
        }
        key.strip_prefix(&self.work)
            .map(|name| Expired::Timer(name.to_string()))
    }
}

/// Keyspace-notification channel for expired keys in database `db`.
pub fn expired_channel(db: i64) -> String {
    format!("__keyevent@{db}__:expired")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_keys_under_prefix() {
        let keys = KeySpace::new("p");
        assert_eq!(keys.job_key("report"), "p:work:report");
        assert_eq!(keys.demand_key("report"), "p:work:demand:report");
        assert_eq!(keys.lock_key("report"), "p:lock:report");
    }

    #[test]
    fn parses_timer_and_demand_keys() {
        let keys = KeySpace::new(DEFAULT_PREFIX);
        assert_eq!(
            keys.parse_expired("bossbat:work:report"),
            Some(Expired::Timer("report".to_string()))
        );
        assert_eq!(
            keys.parse_expired("bossbat:work:demand:report"),
            Some(Expired::Demand("report".to_string()))
        );
    }

    #[test]
    fn ignores_foreign_keys() {
        let keys = KeySpace::new(DEFAULT_PREFIX);
        assert_eq!(keys.parse_expired("some-other-key"), None);
        assert_eq!(keys.parse_expired("bossbat:lock:report"), None);
        assert_eq!(keys.parse_expired("other:work:report"), None);
    }

    #[test]
    fn colons_in_names_round_trip() {
        let keys = KeySpace::new(DEFAULT_PREFIX);
        let name = "something:with:colons";
        assert_eq!(
            keys.parse_expired(&keys.job_key(name)).unwrap().job_name(),
            name
        );
        assert_eq!(
            keys.parse_expired(&keys.demand_key(name)).unwrap().job_name(),
            name
        );
    }

    #[test]
    fn prefix_with_colons_still_parses() {
        let keys = KeySpace::new("app:jobs");
        assert_eq!(
            keys.parse_expired("app:jobs:work:a:b"),
            Some(Expired::Timer("a:b".to_string()))
        );
    }

    #[test]
    fn channel_is_scoped_to_db() {
        assert_eq!(expired_channel(0), "__keyevent@0__:expired");
        assert_eq!(expired_channel(3), "__keyevent@3__:expired");
    }
}
