use std::env;
use std::time::Instant;

use bossbat::{Bossbat, BossbatConfig, JobDefinition, Next, Trigger};

const ENV_HEARTBEAT: &str = "BOSSBAT_HEARTBEAT";
const DEFAULT_HEARTBEAT: &str = "30s";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = BossbatConfig::from_env();
    let heartbeat = env::var(ENV_HEARTBEAT).unwrap_or_else(|_| DEFAULT_HEARTBEAT.to_string());

    tracing::info!(url = %config.connection.url, prefix = %config.prefix, "Connecting to Redis");

    let boss = Bossbat::connect(config).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to start worker");
        std::process::exit(1);
    });

    boss.qa(|name, _definition, next: Next| async move {
        let started = Instant::now();
        let result = next.run().await;
        tracing::info!(
            job = %name,
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Occurrence finished"
        );
        result
    });

    let job = JobDefinition::new(Trigger::every(heartbeat.as_str()), |name| async move {
        tracing::info!(job = %name, "Heartbeat");
        Ok(())
    });
    if let Err(e) = boss.hire("heartbeat", job).await {
        tracing::error!(error = %e, heartbeat = %heartbeat, "Failed to hire heartbeat");
        boss.quit().await;
        std::process::exit(1);
    }

    shutdown_signal().await;
    tracing::info!("Shutdown signal received");
    boss.quit().await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = sigterm => {}
    }
}
