use calendar_filter::startup;
use tracing::info;

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize logging
    startup::init_logging()?;

    info!("Starting calendar filter host");

    // Load configuration
    let config = startup::load_config().await?;

    // Run until a termination signal arrives
    startup::start_host(config).await
}
