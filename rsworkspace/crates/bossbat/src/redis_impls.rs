use std::time::Duration;

use futures::StreamExt;
use redis::aio::ConnectionManager;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::BossbatError,
    keys::expired_channel,
    traits::{ExpiryFeed, ExpirySubscription, JobLock, LockToken, TimerStore},
};

const EVENT_BUFFER: usize = 1024;

/// Deletes the lock only if it still holds our token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Command connection: timers and locks.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    release: redis::Script,
}

impl RedisStore {
    pub async fn connect(client: &redis::Client) -> Result<Self, BossbatError> {
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            conn,
            release: redis::Script::new(RELEASE_SCRIPT),
        })
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl: Duration) -> redis::RedisResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }
}

impl TimerStore for RedisStore {
    type Error = redis::RedisError;

    async fn arm(&self, key: String, value: String, ttl: Duration) -> Result<bool, Self::Error> {
        self.set_nx_px(&key, &value, ttl).await
    }

    async fn disarm(&self, key: String) -> Result<(), Self::Error> {
        let mut conn = self.conn.clone();
        let _removed: i64 = redis::cmd("DEL").arg(&key).query_async(&mut conn).await?;
        Ok(())
    }
}

impl JobLock for RedisStore {
    type Error = redis::RedisError;

    async fn try_acquire(&self, key: String, ttl: Duration) -> Result<Option<LockToken>, Self::Error> {
        let value = Uuid::new_v4().to_string();
        if self.set_nx_px(&key, &value, ttl).await? {
            Ok(Some(LockToken { key, value }))
        } else {
            Ok(None)
        }
    }

    async fn release(&self, token: LockToken) -> Result<(), Self::Error> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .release
            .key(&token.key)
            .arg(&token.value)
            .invoke_async(&mut conn)
            .await?;
        if removed == 0 {
            debug!(key = %token.key, "Lock expired before release");
        }
        Ok(())
    }
}

/// Subscriber side: owns the connection dedicated to expiry notifications.
#[derive(Clone)]
pub struct RedisExpiryFeed {
    client: redis::Client,
}

impl RedisExpiryFeed {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

impl ExpiryFeed for RedisExpiryFeed {
    type Error = redis::RedisError;

    async fn enable_expiry_events(&self) -> Result<(), Self::Error> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg("Ex")
            .query_async(&mut conn)
            .await?;
        debug!("Enabled expired-key notifications");
        Ok(())
    }

    async fn subscribe(&self, db: i64) -> Result<ExpirySubscription, Self::Error> {
        let channel = expired_channel(db);
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&channel).await?;
        info!(channel = %channel, "Subscribed to expired keys");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let forwarder = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                match msg.get_payload::<String>() {
                    Ok(key) => {
                        if tx.send(key).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Dropping undecodable expiry notification"),
                }
            }
            debug!(channel = %channel, "Expiry subscription closed");
        });

        Ok(ExpirySubscription::new(rx, forwarder))
    }
}
