//! Trigger command.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use onair_core::{notifier::DEFAULT_RELAY_URL, TriggerClient};

#[derive(Args)]
pub struct TriggerArgs {
    /// Text to broadcast
    pub text: String,

    /// Relay base URL
    #[arg(long, env = "ONAIR_URL", default_value = DEFAULT_RELAY_URL)]
    pub url: String,
}

pub async fn execute(args: TriggerArgs) -> Result<()> {
    let client = TriggerClient::with_url(&args.url);
    client.trigger(&args.text).await?;
    println!("{} {}", "Sent:".green().bold(), args.text.trim());
    Ok(())
}
