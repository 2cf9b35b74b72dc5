use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use mediascout_server::api::{build_app, AppState};
use mediascout_server::scheduler::build_scheduler;
use mediascout_server::Coordinator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(mediascout_core::load_app_config()?);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(&config.log_level)
        }))
        .init();

    tracing::info!(?config, "starting mediascout server");

    let metrics = PrometheusBuilder::new().install_recorder()?;

    let pool = mediascout_db::connect_pool(
        &config.database_url,
        mediascout_db::PoolConfig::from_app_config(&config),
    )
    .await?;
    mediascout_db::run_migrations(&pool).await?;

    let coordinator = Arc::new(Coordinator::new(pool.clone(), Arc::clone(&config))?);

    // The handle must stay alive for the lifetime of the process.
    let _scheduler = build_scheduler(pool.clone(), Arc::clone(&coordinator)).await?;

    let app = build_app(AppState {
        pool,
        coordinator,
        metrics,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
