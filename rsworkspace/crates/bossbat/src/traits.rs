use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Arm and disarm expiring timer keys.
pub trait TimerStore: Send + Sync + Clone + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// `SET key value PX ttl NX`. Returns `true` if this call created the key,
    /// `false` if a live key already existed.
    fn arm(
        &self,
        key: String,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Delete the key. No-op if it is absent.
    fn disarm(&self, key: String) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Proof of ownership of a job lock, needed to release it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub key: String,
    pub value: String,
}

/// Single-attempt, TTL-bounded exclusive lock.
///
/// Acquire and release are one lifecycle and live in one trait.
pub trait JobLock: Send + Sync + Clone + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// One attempt, no retries. `Ok(None)` when another worker holds the lock.
    fn try_acquire(
        &self,
        key: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<Option<LockToken>, Self::Error>> + Send;

    /// Delete the lock only if it still carries this token.
    fn release(&self, token: LockToken) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Source of expired-key notifications.
pub trait ExpiryFeed: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Turn on expired-key events on the server (`notify-keyspace-events Ex`).
    fn enable_expiry_events(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Subscribe to expirations in database `db` on a dedicated connection.
    fn subscribe(&self, db: i64) -> impl Future<Output = Result<ExpirySubscription, Self::Error>> + Send;
}

/// Expired key names, plus the task that forwards them from the store.
///
/// The forwarder owns the subscriber connection; aborting it releases the connection.
#[derive(Debug)]
pub struct ExpirySubscription {
    events: mpsc::Receiver<String>,
    forwarder: JoinHandle<()>,
}

impl ExpirySubscription {
    pub fn new(events: mpsc::Receiver<String>, forwarder: JoinHandle<()>) -> Self {
        Self { events, forwarder }
    }

    pub fn into_parts(self) -> (mpsc::Receiver<String>, JoinHandle<()>) {
        (self.events, self.forwarder)
    }
}
