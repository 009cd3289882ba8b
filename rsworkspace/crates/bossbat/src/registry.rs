use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{job::JobDefinition, schedule::Plan};

/// A hired job: its definition plus the validated trigger.
#[derive(Debug, Clone)]
pub struct RegisteredJob {
    pub definition: JobDefinition,
    pub plan: Plan,
}

/// Per-worker table of hired jobs, shared between the public handle, the router and
/// the coordinator. Never shared across workers.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<String, RegisteredJob>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. Returns the replaced job, if any.
    pub fn insert(&self, name: String, job: RegisteredJob) -> Option<RegisteredJob> {
        self.write().insert(name, job)
    }

    pub fn remove(&self, name: &str) -> Option<RegisteredJob> {
        self.write().remove(name)
    }

    /// A copy of the job, detached from the table.
    pub fn get(&self, name: &str) -> Option<RegisteredJob> {
        self.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    // A panic inside a job never runs while this lock is held, so a poisoned
    // table is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, RegisteredJob>> {
        self.jobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, RegisteredJob>> {
        self.jobs.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Trigger;

    fn job(trigger: Trigger) -> RegisteredJob {
        let plan = Plan::resolve(&trigger, None).unwrap();
        RegisteredJob {
            definition: JobDefinition::new(trigger, |_| async { Ok(()) }),
            plan,
        }
    }

    #[test]
    fn insert_replaces_previous_definition() {
        let registry = JobRegistry::new();
        assert!(registry.insert("a".into(), job(Trigger::every(100u64))).is_none());

        let replaced = registry.insert("a".into(), job(Trigger::every(200u64)));
        assert_eq!(
            replaced.unwrap().definition.trigger,
            Trigger::every(100u64)
        );
        assert_eq!(registry.get("a").unwrap().definition.trigger, Trigger::every(200u64));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_and_clear() {
        let registry = JobRegistry::new();
        registry.insert("a".into(), job(Trigger::OnDemand));
        registry.insert("b".into(), job(Trigger::OnDemand));

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert!(!registry.contains("a"));
        assert_eq!(registry.names(), vec!["b".to_string()]);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn clones_share_the_table() {
        let registry = JobRegistry::new();
        let other = registry.clone();
        registry.insert("shared".into(), job(Trigger::OnDemand));
        assert!(other.contains("shared"));
    }
}
