//! One-shot scheduled scrape pass, intended for external cron.
//!
//! Exit codes: 0 on completion (even with partial brand failures),
//! 1 on configuration error, 2 on an unrecoverable store error.

use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use mediascout_server::scheduler::run_scheduled_pass;
use mediascout_server::Coordinator;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match mediascout_core::load_app_config() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(&config.log_level)
        }))
        .init();

    let pool = match mediascout_db::connect_pool(
        &config.database_url,
        mediascout_db::PoolConfig::from_app_config(&config),
    )
    .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to the store");
            return ExitCode::from(2);
        }
    };

    let coordinator = match Coordinator::new(pool.clone(), Arc::clone(&config)) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            tracing::error!(error = %e, "failed to build coordinator");
            return ExitCode::from(1);
        }
    };

    match run_scheduled_pass(&pool, &coordinator, false).await {
        Ok(summary) => {
            tracing::info!(
                due = summary.due,
                succeeded = summary.succeeded,
                failed = summary.failed,
                skipped_locked = summary.skipped_locked,
                "scheduled pass complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduled pass aborted on store error");
            ExitCode::from(2)
        }
    }
}
