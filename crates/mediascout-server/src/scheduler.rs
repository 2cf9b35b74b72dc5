//! Background scrape scheduler.
//!
//! An hourly job sweeps all active brands and scrapes the ones that are
//! due per their `scrape_frequency_hours`. Lock conflicts are skipped
//! silently (another process is already on it) and one brand's failure
//! never affects the rest of the pass.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::coordinator::{Coordinator, CoordinatorError, Trigger};
use mediascout_db::{BrandRow, DbError};

/// Half-width of the per-brand jitter window. The recurring job fires
/// this far ahead of the nominal sweep time and each brand's delay is
/// drawn from the full window, giving a symmetric ±10-minute smear
/// around the sweep time itself.
const JITTER_HALF_WINDOW_SECS: u64 = 600;

/// Outcome of one scheduler pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassSummary {
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped_locked: usize,
}

/// A brand is due when it has never been scraped or its frequency
/// window has elapsed.
fn is_due(brand: &BrandRow, now: DateTime<Utc>) -> bool {
    match brand.last_scraped_at {
        None => true,
        Some(last) => now - last >= Duration::hours(i64::from(brand.scrape_frequency_hours)),
    }
}

/// Run one pass over all active brands.
///
/// `jitter` enables the per-brand smear used by the recurring job (a
/// random delay across the 20-minute window the job fires at the start
/// of); the one-shot binary passes `false` and processes brands
/// immediately.
///
/// # Errors
///
/// Returns [`DbError`] only when the brand listing itself fails — an
/// unrecoverable store error. Per-brand failures are contained.
pub async fn run_scheduled_pass(
    pool: &PgPool,
    coordinator: &Coordinator,
    jitter: bool,
) -> Result<PassSummary, DbError> {
    let brands = mediascout_db::list_active_brands(pool).await?;
    let now = Utc::now();
    let mut summary = PassSummary::default();

    let due: Vec<&BrandRow> = brands.iter().filter(|b| is_due(b, now)).collect();
    summary.due = due.len();

    if due.is_empty() {
        tracing::info!(total = brands.len(), "scheduler: no brands due");
        return Ok(summary);
    }

    tracing::info!(
        due = due.len(),
        total = brands.len(),
        "scheduler: starting pass"
    );

    for brand in due {
        if jitter {
            let delay = rand::thread_rng().gen_range(0..=2 * JITTER_HALF_WINDOW_SECS);
            tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
        }

        match coordinator.run_scrape(brand.id, Trigger::Schedule).await {
            Ok(run) if run.status == "error" || run.status == "timeout" => {
                tracing::warn!(
                    brand = %brand.name,
                    run_id = %run.run_id,
                    status = %run.status,
                    "scheduler: brand run did not complete cleanly"
                );
                summary.failed += 1;
            }
            Ok(run) => {
                tracing::info!(
                    brand = %brand.name,
                    run_id = %run.run_id,
                    status = %run.status,
                    saved = run.mentions_saved,
                    "scheduler: brand run finished"
                );
                summary.succeeded += 1;
            }
            Err(CoordinatorError::Locked { .. }) => {
                // Another process is scraping this brand; not an error.
                tracing::debug!(brand = %brand.name, "scheduler: brand locked, skipping");
                summary.skipped_locked += 1;
            }
            Err(e) => {
                tracing::error!(brand = %brand.name, error = %e, "scheduler: brand run failed");
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        due = summary.due,
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped_locked = summary.skipped_locked,
        "scheduler: pass complete"
    );
    Ok(summary)
}

/// Builds and starts the recurring scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process — dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    coordinator: Arc<Coordinator>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    // Hourly at an off-minute, 10 minutes ahead of the :17 nominal
    // sweep so the 0–20-minute per-brand jitter lands at :17 ± 10 min.
    let job = Job::new_async("0 7 * * * *", move |_uuid, _lock| {
        let pool = pool.clone();
        let coordinator = Arc::clone(&coordinator);

        Box::pin(async move {
            if let Err(e) = run_scheduled_pass(&pool, &coordinator, true).await {
                tracing::error!(error = %e, "scheduler: pass aborted on store error");
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    Ok(scheduler)
}
