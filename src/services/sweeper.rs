//! Background expiry sweep. Read paths already treat overdue pending records
//! as expired, so this loop is reporting hygiene, not correctness.

use {
    crate::infra::postgres::payment_repo, chrono::Utc, sqlx::PgPool, std::time::Duration,
    tokio::sync::watch,
};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run_expiry_sweeper(pool: PgPool, mut shutdown: watch::Receiver<bool>) {
    tracing::info!("expiry sweeper started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("expiry sweeper shutting down");
                return;
            }
            _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
        }

        match payment_repo::sweep_expired(&pool, Utc::now()).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "swept expired pending payments"),
            Err(e) => tracing::error!(error = %e, "expiry sweep error"),
        }
    }
}
