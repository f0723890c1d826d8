use std::sync::Arc;

use promkeeper::config::Settings;
use promkeeper::database;
use promkeeper::logging::init_logging;
use promkeeper::services::ServiceContainer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Arc::new(Settings::load()?);

    // Keep the guard alive so buffered file logs are flushed on exit.
    let (logging, _guard) =
        init_logging(&settings.logging.dir, settings.logging.filter.as_deref())?;

    let pool = database::init_pool(&settings.database_url).await?;
    database::run_migrations(&pool).await?;

    let container = ServiceContainer::new(pool, settings.clone()).await?;
    logging.start_retention_cleanup(container.cancellation_token());
    container.initialize().await?;

    tracing::info!(
        queues = ?container.queue_names(),
        log_filter = %logging.get_filter(),
        "promkeeper started"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    container.shutdown().await?;
    Ok(())
}
