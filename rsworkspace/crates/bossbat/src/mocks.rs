//! In-memory store for testing without a Redis server.
//!
//! Enabled with the `test-support` feature:
//!
//! ```toml
//! [dev-dependencies]
//! bossbat = { path = "...", features = ["test-support"] }
//! ```
//!
//! One [`MemoryStore`] plays the shared server: keys really expire on
//! `tokio::time`, and every expiration is broadcast to every subscription, so
//! several `Bossbat` workers built on clones of the same store race the way
//! separate processes race on one Redis.

use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::traits::{ExpiryFeed, ExpirySubscription, JobLock, LockToken, TimerStore};

const BROADCAST_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct MockStoreError(pub &'static str);

impl std::fmt::Display for MockStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MockStoreError {}

struct Entry {
    value: String,
    generation: u64,
}

struct Shared {
    entries: Mutex<HashMap<String, Entry>>,
    expired: broadcast::Sender<String>,
    generation: AtomicU64,
    commands: Mutex<Vec<String>>,
    subscriptions: Mutex<Vec<i64>>,
    config_calls: AtomicUsize,
    unavailable: AtomicBool,
}

/// Shared in-memory key space with expiring keys and expiry notifications.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        let (expired, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(HashMap::new()),
                expired,
                generation: AtomicU64::new(0),
                commands: Mutex::new(Vec::new()),
                subscriptions: Mutex::new(Vec::new()),
                config_calls: AtomicUsize::new(0),
                unavailable: AtomicBool::new(false),
            }),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `SET key value PX ttl NX` with real expiry. Also used to plant foreign keys.
    pub async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, MockStoreError> {
        self.round_trip().await?;
        self.record(format!("SET {key} {value} PX {} NX", ttl.as_millis()));

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut entries = self.shared.entries.lock().unwrap();
            if entries.contains_key(key) {
                return Ok(false);
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    generation,
                },
            );
        }

        let shared = Arc::clone(&self.shared);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let expired = {
                let mut entries = shared.entries.lock().unwrap();
                match entries.get(&key) {
                    Some(entry) if entry.generation == generation => {
                        entries.remove(&key);
                        true
                    }
                    _ => false,
                }
            };
            if expired {
                // No subscribers is fine.
                let _ = shared.expired.send(key);
            }
        });

        Ok(true)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.shared
            .entries
            .lock()
            .unwrap()
            .get(key)
            .map(|e| e.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.shared.entries.lock().unwrap().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.shared.entries.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Every command received, e.g. `SET bossbat:work:report report PX 200 NX`.
    pub fn commands(&self) -> Vec<String> {
        self.shared.commands.lock().unwrap().clone()
    }

    pub fn clear_commands(&self) {
        self.shared.commands.lock().unwrap().clear();
    }

    /// Databases subscribed to, one entry per subscription.
    pub fn subscriptions(&self) -> Vec<i64> {
        self.shared.subscriptions.lock().unwrap().clone()
    }

    /// Number of `CONFIG SET notify-keyspace-events` calls.
    pub fn config_calls(&self) -> usize {
        self.shared.config_calls.load(Ordering::SeqCst)
    }

    /// Simulate a lost connection: every command fails until [`go_online`](Self::go_online).
    pub fn go_offline(&self) {
        self.shared.unavailable.store(true, Ordering::SeqCst);
    }

    pub fn go_online(&self) {
        self.shared.unavailable.store(false, Ordering::SeqCst);
    }

    fn record(&self, command: String) {
        self.shared.commands.lock().unwrap().push(command);
    }

    // One suspension per command stands in for the network round trip.
    async fn round_trip(&self) -> Result<(), MockStoreError> {
        tokio::task::yield_now().await;
        if self.shared.unavailable.load(Ordering::SeqCst) {
            return Err(MockStoreError("store unavailable"));
        }
        Ok(())
    }
}

impl TimerStore for MemoryStore {
    type Error = MockStoreError;

    async fn arm(&self, key: String, value: String, ttl: Duration) -> Result<bool, MockStoreError> {
        self.set_nx_px(&key, &value, ttl).await
    }

    async fn disarm(&self, key: String) -> Result<(), MockStoreError> {
        self.round_trip().await?;
        self.record(format!("DEL {key}"));
        self.shared.entries.lock().unwrap().remove(&key);
        Ok(())
    }
}

impl JobLock for MemoryStore {
    type Error = MockStoreError;

    async fn try_acquire(&self, key: String, ttl: Duration) -> Result<Option<LockToken>, MockStoreError> {
        let value = Uuid::new_v4().to_string();
        if self.set_nx_px(&key, &value, ttl).await? {
            Ok(Some(LockToken { key, value }))
        } else {
            Ok(None)
        }
    }

    async fn release(&self, token: LockToken) -> Result<(), MockStoreError> {
        self.round_trip().await?;
        self.record(format!("UNLOCK {}", token.key));
        let mut entries = self.shared.entries.lock().unwrap();
        if entries.get(&token.key).is_some_and(|e| e.value == token.value) {
            entries.remove(&token.key);
        }
        Ok(())
    }
}

impl ExpiryFeed for MemoryStore {
    type Error = MockStoreError;

    async fn enable_expiry_events(&self) -> Result<(), MockStoreError> {
        self.round_trip().await?;
        self.shared.config_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, db: i64) -> Result<ExpirySubscription, MockStoreError> {
        self.round_trip().await?;
        self.shared.subscriptions.lock().unwrap().push(db);

        let mut expired = self.shared.expired.subscribe();
        let (tx, rx) = mpsc::channel(BROADCAST_CAPACITY);
        let forwarder = tokio::spawn(async move {
            loop {
                match expired.recv().await {
                    Ok(key) => {
                        if tx.send(key).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(ExpirySubscription::new(rx, forwarder))
    }
}
