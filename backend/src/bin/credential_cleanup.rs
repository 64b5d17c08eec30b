//! One-shot purge of expired device requests, sessions and login states.
//! Intended for cron when the in-process sweeper is not enough.

use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meshrealm_backend::{config::Config, services::sweep::ExpirySweeper, state::Stores};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meshrealm_backend=info,credential_cleanup=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let stores = Stores::connect(&config).await?;
    let sweeper = ExpirySweeper::new(stores.device_requests, stores.sessions, stores.auth_states);

    let report = sweeper.run_once(Utc::now()).await;
    tracing::info!(
        device_requests = report.device_requests,
        sessions = report.sessions,
        auth_states = report.auth_states,
        "Credential cleanup finished"
    );

    if report.device_request_failures > 0 {
        anyhow::bail!(
            "{} expired device requests could not be deleted",
            report.device_request_failures
        );
    }
    Ok(())
}
