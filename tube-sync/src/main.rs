use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tube_sync::cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries the run summary.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = run(cli).await;
    match &result {
        Ok(_) => tracing::info!("tube-sync completed successfully"),
        Err(e) => tracing::error!(error = %e, "tube-sync exited with error"),
    }
    result
}
