//! wikiconf - settings loader for wiki deployments
//!
//! Command-line front end for loading, checking and inspecting the
//! settings of one wiki deployment.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wikiconf::cli::Cli;
use wikiconf::utils::DisplayUtils;

#[tokio::main]
async fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.debug);

    info!("Starting wikiconf");

    let display = DisplayUtils::new(cli.no_color);

    // Execute the command
    if let Err(e) = cli.execute().await {
        error!("Error: {:#}", e);
        display.print_error(&format!("Error: {e:#}"));
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "wikiconf=debug" } else { "wikiconf=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
