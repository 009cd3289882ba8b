use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::{
    coordinator::{Outcome, WorkCoordinator},
    keys::KeySpace,
    registry::JobRegistry,
    scheduler::TriggerScheduler,
    traits::{JobLock, TimerStore},
};

/// Sole reader of a worker's expiry channel.
pub struct NotificationRouter<S> {
    keys: KeySpace,
    registry: JobRegistry,
    scheduler: TriggerScheduler<S>,
    coordinator: WorkCoordinator<S>,
}

impl<S: TimerStore + JobLock> NotificationRouter<S> {
    pub fn new(
        keys: KeySpace,
        registry: JobRegistry,
        scheduler: TriggerScheduler<S>,
        coordinator: WorkCoordinator<S>,
    ) -> Self {
        Self {
            keys,
            registry,
            scheduler,
            coordinator,
        }
    }

    /// Handle one expired key.
    ///
    /// Dispatches the work and, for recurring jobs, rearms the next cycle. Both are
    /// spawned: rearming never waits on the lock race, and the router never waits
    /// on either. Returns the work task, or `None` if the key was ignored.
    pub fn route(&self, key: &str) -> Option<JoinHandle<Outcome>> {
        let Some(expired) = self.keys.parse_expired(key) else {
            trace!(key = %key, "Ignoring foreign expired key");
            return None;
        };
        let name = expired.job_name().to_string();

        let Some(job) = self.registry.get(&name) else {
            debug!(job = %name, key = %key, "Ignoring notification for unknown job");
            return None;
        };

        let work = self.coordinator.dispatch(name.clone());

        if job.definition.is_recurring() {
            let scheduler = self.scheduler.clone();
            tokio::spawn(async move {
                if let Err(e) = scheduler.schedule_run(&name, Some(&job.plan)).await {
                    warn!(job = %name, error = %e, "Failed to rearm job");
                }
            });
        }

        Some(work)
    }

    /// Route every key until the channel closes.
    pub async fn run(self, mut events: mpsc::Receiver<String>) {
        while let Some(key) = events.recv().await {
            self.route(&key);
        }
        debug!("Expiry channel closed, router stopping");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::job::{JobDefinition, Trigger};
    use crate::middleware::MiddlewareChain;
    use crate::mocks::MemoryStore;
    use crate::registry::RegisteredJob;
    use crate::schedule::Plan;

    struct Fixture {
        store: MemoryStore,
        registry: JobRegistry,
        router: NotificationRouter<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let keys = KeySpace::new("bossbat");
        let registry = JobRegistry::new();
        let scheduler = TriggerScheduler::new(store.clone(), keys.clone());
        let coordinator = WorkCoordinator::new(
            store.clone(),
            keys.clone(),
            Duration::from_secs(2),
            registry.clone(),
            MiddlewareChain::new(),
        );
        Fixture {
            router: NotificationRouter::new(keys, registry.clone(), scheduler, coordinator),
            store,
            registry,
        }
    }

    fn register(registry: &JobRegistry, name: &str, trigger: Trigger, counter: &Arc<AtomicUsize>) {
        let counter = Arc::clone(counter);
        let definition = JobDefinition::new(trigger, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });
        let plan = Plan::resolve(&definition.trigger, None).unwrap();
        registry.insert(name.to_string(), RegisteredJob { definition, plan });
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_keys_are_ignored() {
        let f = fixture();
        let counter = Arc::new(AtomicUsize::new(0));
        register(&f.registry, "report", Trigger::every(200u64), &counter);

        assert!(f.router.route("other:work:report").is_none());
        assert!(f.router.route("session:42").is_none());
        assert!(f.router.route("bossbat:lock:report").is_none());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(f.store.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_jobs_are_ignored() {
        let f = fixture();
        assert!(f.router.route("bossbat:work:ghost").is_none());
        assert!(f.store.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn recurring_job_runs_and_rearms() {
        let f = fixture();
        let counter = Arc::new(AtomicUsize::new(0));
        register(&f.registry, "report", Trigger::every(200u64), &counter);

        let outcome = f.router.route("bossbat:work:report").unwrap().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(f.store.contains("bossbat:work:report"));
    }

    #[tokio::test(start_paused = true)]
    async fn on_demand_job_is_not_rearmed() {
        let f = fixture();
        let counter = Arc::new(AtomicUsize::new(0));
        register(&f.registry, "manual", Trigger::OnDemand, &counter);

        let outcome = f
            .router
            .route("bossbat:work:demand:manual")
            .unwrap()
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(outcome, Outcome::Completed);
        assert!(f.store.keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_happens_even_when_lock_is_lost() {
        let f = fixture();
        let counter = Arc::new(AtomicUsize::new(0));
        register(&f.registry, "report", Trigger::every(200u64), &counter);
        f.store
            .set_nx_px("bossbat:lock:report", "peer", Duration::from_secs(2))
            .await
            .unwrap();

        let outcome = f.router.route("bossbat:work:report").unwrap().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(outcome, Outcome::LockUnavailable);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(f.store.contains("bossbat:work:report"));
    }

    #[tokio::test(start_paused = true)]
    async fn colon_names_round_trip() {
        let f = fixture();
        let counter = Arc::new(AtomicUsize::new(0));
        register(&f.registry, "reports:daily:eu", Trigger::every(200u64), &counter);

        let outcome = f
            .router
            .route("bossbat:work:reports:daily:eu")
            .unwrap()
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_when_channel_closes() {
        let f = fixture();
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(f.router.run(rx));
        drop(tx);
        task.await.unwrap();
    }
}
