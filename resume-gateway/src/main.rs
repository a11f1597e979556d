//! Resume Gateway - Main entry point.

use anyhow::Result;
use resume_common::config::{load_dotenv, Config};
use resume_common::logging::init_logging_with_exclusions;

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = load_dotenv();

    // Load configuration
    let config = Config::load_and_validate()?;

    // Initialize logging
    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Resume Gateway v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    resume_gateway::start_server(&config).await
}
