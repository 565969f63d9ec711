//! `taskwright serve`: the long-lived line-protocol process.

use taskwright_config::AppConfig;
use taskwright_driver::SessionDriver;
use tokio::io::{self, BufReader};
use tracing::{info, warn};

use super::CliResult;

pub async fn run(config: &AppConfig) -> CliResult {
    let agent = super::build_agent(config).await?;
    let mut driver = SessionDriver::new(agent);

    let served = tokio::select! {
        result = driver.serve(BufReader::new(io::stdin()), io::stdout()) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match served {
        Some(Ok(stats)) => info!(requests = stats.requests, errors = stats.errors, "Serve loop finished"),
        Some(Err(e)) => warn!(error = %e, "Serve loop failed"),
        None => info!("Interrupted, shutting down"),
    }

    driver.agent().shutdown().await;
    Ok(())
}
