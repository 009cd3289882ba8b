//! # bossbat
//!
//! Distributed job scheduler driven by Redis key expiry.
//!
//! ## Features
//!
//! - Every worker subscribes to expired-key events; a job's next run is a key with a TTL.
//! - Exactly one worker runs each occurrence: all of them race for a short-lived lock.
//! - Timers are armed with `SET ... NX`, so every worker can rearm without a leader.
//! - Interval (`"200 ms"` or `200`), cron (5 or 6 fields, with timezone) and on-demand jobs.
//! - QA middleware wraps every run, outermost first.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use bossbat::{Bossbat, BossbatConfig, JobDefinition, Trigger};
//!
//! #[tokio::main]
//! async fn main() -> bossbat::Result<()> {
//!     let boss = Bossbat::connect(BossbatConfig::default()).await?;
//!
//!     boss.hire(
//!         "cleanup",
//!         JobDefinition::new(Trigger::every("10 minutes"), |name| async move {
//!             tracing::info!(job = %name, "cleaning up");
//!             Ok(())
//!         }),
//!     )
//!     .await?;
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     boss.quit().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Keys (prefix `bossbat`)
//!
//! ```text
//! bossbat:work:cleanup          timer, TTL = delay to the next run
//! bossbat:work:demand:cleanup   demand, TTL = 1 ms
//! bossbat:lock:cleanup          lock, TTL = config.ttl
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod job;
pub mod keys;
pub mod middleware;
pub mod redis_impls;
pub mod registry;
pub mod router;
pub mod schedule;
pub mod scheduler;
pub mod traits;
pub mod worker;

#[cfg(any(test, feature = "test-support"))]
pub mod mocks;

pub use config::{BossbatConfig, ConnectionConfig};
pub use coordinator::Outcome;
pub use error::{BossbatError, JobError, Result};
pub use job::{Every, JobDefinition, Trigger, WorkResult};
pub use keys::KeySpace;
pub use middleware::{Middleware, Next};
pub use redis_impls::{RedisExpiryFeed, RedisStore};
pub use worker::Bossbat;
