use calsync::startup;
use tracing::info;

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize logging
    startup::init_logging()?;

    info!("Starting calendar sync service");

    // Load configuration
    let config = startup::load_config().await?;

    // Run until a shutdown signal arrives
    startup::run(config).await?;

    Ok(())
}
