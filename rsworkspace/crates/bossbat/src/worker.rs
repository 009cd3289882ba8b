use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{
    config::BossbatConfig,
    coordinator::WorkCoordinator,
    error::{BossbatError, Result},
    job::{JobDefinition, WorkResult},
    keys::KeySpace,
    middleware::{Middleware, MiddlewareChain, Next},
    redis_impls::{RedisExpiryFeed, RedisStore},
    registry::{JobRegistry, RegisteredJob},
    router::NotificationRouter,
    schedule::{Plan, parse_timezone},
    scheduler::TriggerScheduler,
    traits::{ExpiryFeed, ExpirySubscription, JobLock, TimerStore},
};

/// Everything that holds a store connection. Dropped as a whole by `quit`.
struct Running<S> {
    scheduler: TriggerScheduler<S>,
    router: JoinHandle<()>,
    forwarder: JoinHandle<()>,
}

impl<S> Running<S> {
    fn abort(&self) {
        self.router.abort();
        self.forwarder.abort();
    }
}

/// One worker: its own job table and QA chain, racing its peers over a shared store.
///
/// Several workers may live in one process; each must `hire` the jobs it should
/// take part in.
pub struct Bossbat<S> {
    config: BossbatConfig,
    registry: JobRegistry,
    qas: MiddlewareChain,
    running: Mutex<Option<Running<S>>>,
}

impl Bossbat<RedisStore> {
    /// Open the command and subscriber connections described by `config`.
    pub async fn connect(config: BossbatConfig) -> Result<Self> {
        let client = redis::Client::open(config.connection.connection_info()?)?;
        let store = RedisStore::connect(&client).await?;
        let feed = RedisExpiryFeed::new(client);
        Self::with_backend(store, &feed, config).await
    }
}

impl<S: TimerStore + JobLock> Bossbat<S> {
    /// Enable expiry events (unless disabled in `config`), subscribe, and start routing.
    pub async fn with_backend<F: ExpiryFeed>(store: S, feed: &F, config: BossbatConfig) -> Result<Self> {
        validate_tz(&config)?;
        let db = config.connection.database()?;

        if config.disable_redis_config {
            debug!("Skipping notify-keyspace-events configuration");
        } else {
            feed.enable_expiry_events()
                .await
                .map_err(|e| BossbatError::Store(e.to_string()))?;
        }

        let subscription = feed
            .subscribe(db)
            .await
            .map_err(|e| BossbatError::Subscribe(e.to_string()))?;
        Self::from_subscription(store, subscription, config)
    }

    /// Start routing an already-open subscription. Must be called inside a Tokio runtime.
    pub fn from_subscription(store: S, subscription: ExpirySubscription, config: BossbatConfig) -> Result<Self> {
        validate_tz(&config)?;

        let keys = KeySpace::new(&config.prefix);
        let registry = JobRegistry::new();
        let qas = MiddlewareChain::new();
        let scheduler = TriggerScheduler::new(store.clone(), keys.clone());
        let coordinator = WorkCoordinator::new(
            store,
            keys.clone(),
            config.lock_ttl(),
            registry.clone(),
            qas.clone(),
        );

        let (events, forwarder) = subscription.into_parts();
        let router = NotificationRouter::new(keys, registry.clone(), scheduler.clone(), coordinator);
        let router = tokio::spawn(router.run(events));

        info!(prefix = %config.prefix, ttl_ms = config.ttl, "Worker started");
        Ok(Self {
            config,
            registry,
            qas,
            running: Mutex::new(Some(Running {
                scheduler,
                router,
                forwarder,
            })),
        })
    }

    fn scheduler(&self) -> Result<TriggerScheduler<S>> {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|running| running.scheduler.clone())
            .ok_or(BossbatError::Stopped)
    }

    /// Register `definition` under `name`, replacing any previous one, and arm the
    /// first timer if the trigger recurs.
    ///
    /// An invalid trigger fails here, before anything is written to the store. The
    /// job is registered only once its timer is armed; on error any previous
    /// definition stays in place.
    pub async fn hire(&self, name: impl Into<String>, definition: JobDefinition) -> Result<()> {
        let name = name.into();
        let plan = Plan::resolve(&definition.trigger, self.config.tz.as_deref())?;
        let scheduler = self.scheduler()?;

        if definition.is_recurring() {
            scheduler.schedule_run(&name, Some(&plan)).await?;
        }

        let replaced = self
            .registry
            .insert(name.clone(), RegisteredJob { definition, plan })
            .is_some();
        info!(job = %name, replaced, "Hired job");
        Ok(())
    }

    /// Forget `name` and delete its timer. A run already in flight is not cancelled.
    pub async fn fire(&self, name: &str) -> Result<()> {
        let scheduler = self.scheduler()?;
        let removed = self.registry.remove(name).is_some();
        scheduler.disarm(name).await?;
        info!(job = %name, removed, "Fired job");
        Ok(())
    }

    /// Run `name` as soon as possible, outside its schedule. The regular timer is untouched.
    pub async fn demand(&self, name: &str) -> Result<()> {
        self.scheduler()?.schedule_run(name, None).await?;
        Ok(())
    }

    /// Append a QA layer. Layers wrap every job in registration order, first outermost.
    pub fn qa<F, Fut>(&self, qa: F)
    where
        F: Fn(String, JobDefinition, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkResult> + Send + 'static,
    {
        self.qas.push(qa);
    }

    /// Append a QA layer implemented as a type.
    pub fn use_middleware<M: Middleware>(&self, middleware: M) {
        self.qas.push(middleware);
    }

    /// Stop routing, release both store connections and clear the job table.
    ///
    /// Afterwards `hire`, `fire` and `demand` fail with [`BossbatError::Stopped`].
    /// Occurrences already running are not cancelled. Safe to call twice.
    pub async fn quit(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let Some(running) = running else {
            return;
        };
        running.abort();
        let Running {
            scheduler,
            router,
            forwarder,
        } = running;
        drop(scheduler);
        let _ = router.await;
        let _ = forwarder.await;

        self.registry.clear();
        info!(prefix = %self.config.prefix, "Worker quit");
    }

    pub fn prefix(&self) -> &str {
        &self.config.prefix
    }

    pub fn ttl(&self) -> Duration {
        self.config.lock_ttl()
    }

    pub fn tz(&self) -> Option<&str> {
        self.config.tz.as_deref()
    }

    pub fn job_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn is_hired(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn qa_count(&self) -> usize {
        self.qas.len()
    }
}

impl<S> Drop for Bossbat<S> {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().unwrap_or_else(|e| e.into_inner()) {
            running.abort();
        }
    }
}

fn validate_tz(config: &BossbatConfig) -> Result<()> {
    if let Some(tz) = &config.tz {
        parse_timezone(tz)?;
    }
    Ok(())
}
