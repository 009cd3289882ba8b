use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::{
    job::JobDefinition,
    keys::KeySpace,
    middleware::MiddlewareChain,
    registry::JobRegistry,
    traits::JobLock,
};

/// What happened to one occurrence on this worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// This worker held the lock and the chain finished successfully.
    Completed,
    /// The work or a middleware returned an error.
    Failed(String),
    /// The work or a middleware panicked.
    Panicked,
    /// Another worker holds the lock; the normal result for every worker but one.
    LockUnavailable,
    /// The job was fired between the notification and the lock.
    NotRegistered,
}

/// Races for the job lock and, on winning, runs the QA chain and the work.
#[derive(Clone)]
pub struct WorkCoordinator<L> {
    lock: L,
    keys: KeySpace,
    ttl: Duration,
    registry: JobRegistry,
    qas: MiddlewareChain,
}

impl<L: JobLock> WorkCoordinator<L> {
    pub fn new(lock: L, keys: KeySpace, ttl: Duration, registry: JobRegistry, qas: MiddlewareChain) -> Self {
        Self {
            lock,
            keys,
            ttl,
            registry,
            qas,
        }
    }

    /// Fire-and-forget [`do_work`](Self::do_work).
    pub fn dispatch(&self, name: String) -> JoinHandle<Outcome> {
        let coordinator = self.clone();
        tokio::spawn(async move { coordinator.do_work(name).await })
    }

    /// Attempt the lock once; on success run the chain and release the lock
    /// however the chain settles.
    pub async fn do_work(&self, name: String) -> Outcome {
        let token = match self.lock.try_acquire(self.keys.lock_key(&name), self.ttl).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                trace!(job = %name, "Occurrence claimed by another worker");
                return Outcome::LockUnavailable;
            }
            Err(e) => {
                warn!(job = %name, error = %e, "Failed to attempt job lock");
                return Outcome::LockUnavailable;
            }
        };

        debug!(job = %name, "Acquired job lock");
        let outcome = match self.registry.get(&name) {
            Some(job) => self.perform(name.clone(), job.definition).await,
            None => Outcome::NotRegistered,
        };

        if let Err(e) = self.lock.release(token).await {
            warn!(job = %name, error = %e, "Failed to release job lock, it will expire");
        }
        outcome
    }

    // `definition` is this occurrence's own copy; middleware may change it freely.
    async fn perform(&self, name: String, definition: JobDefinition) -> Outcome {
        let chain = self.qas.compose(name.clone(), definition);
        match AssertUnwindSafe(chain.run()).catch_unwind().await {
            Ok(Ok(())) => {
                debug!(job = %name, "Job completed");
                Outcome::Completed
            }
            Ok(Err(e)) => {
                warn!(job = %name, error = %e, "Job failed");
                Outcome::Failed(e.to_string())
            }
            Err(_) => {
                error!(job = %name, "Job panicked");
                Outcome::Panicked
            }
        }
    }
}
