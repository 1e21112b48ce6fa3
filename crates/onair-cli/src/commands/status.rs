//! Status command.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use onair_core::{notifier::DEFAULT_RELAY_URL, TriggerClient};

#[derive(Args)]
pub struct StatusArgs {
    /// Relay base URL
    #[arg(long, env = "ONAIR_URL", default_value = DEFAULT_RELAY_URL)]
    pub url: String,
}

pub async fn execute(args: StatusArgs) -> Result<()> {
    let client = TriggerClient::with_url(&args.url);
    let report = client.status().await?;

    println!("{} {}", "Relay".cyan().bold(), client.base_url().dimmed());
    println!(
        "  {} total | {} ui | {} external",
        report.total_connections.to_string().bold(),
        report.ui_connections.to_string().green(),
        report.external_connections.to_string().yellow()
    );
    Ok(())
}
