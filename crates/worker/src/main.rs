use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wq_db::PgStore;
use wq_lifecycle::{LifecycleConfig, LifecycleManager};
use wq_worker::{jobs, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wq_worker=debug,wq_lifecycle=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env().expect("Invalid worker configuration");
    let lifecycle_config = LifecycleConfig::from_env().expect("Invalid lifecycle configuration");
    tracing::info!(
        order_sweep_secs = config.order_sweep_interval.as_secs(),
        registration_sweep_secs = config.registration_sweep_interval.as_secs(),
        activity_sweep_hour_utc = config.activity_sweep_hour_utc,
        "Loaded worker configuration"
    );

    // --- Database ---
    let pool = wq_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    wq_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    wq_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let manager = Arc::new(LifecycleManager::new(
        Arc::new(PgStore::new(pool)),
        lifecycle_config,
    ));

    // --- Jobs ---
    let cancel = CancellationToken::new();
    let handles = vec![
        tokio::spawn(jobs::order_timeout::run(
            Arc::clone(&manager),
            config.order_sweep_interval,
            cancel.clone(),
        )),
        tokio::spawn(jobs::registration_timeout::run(
            Arc::clone(&manager),
            config.registration_sweep_interval,
            cancel.clone(),
        )),
        tokio::spawn(jobs::activity_deadline::run(
            Arc::clone(&manager),
            config.activity_sweep_hour_utc,
            cancel.clone(),
        )),
    ];
    tracing::info!("Worker started");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received, stopping jobs");
    cancel.cancel();

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Job task panicked");
        }
    }
    tracing::info!("Worker stopped");
}
