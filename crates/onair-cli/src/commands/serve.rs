//! Relay server command.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use onair_core::RegistryConfig;
use onair_web::ServerConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, env = "ONAIR_PORT", default_value = "9000")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, env = "ONAIR_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Directory served under /logo/
    #[arg(long, env = "ONAIR_LOGO_DIR", default_value = "logo")]
    pub logo_dir: PathBuf,

    /// Per-consumer send deadline in milliseconds (0 disables)
    #[arg(long, env = "ONAIR_SEND_TIMEOUT_MS", default_value = "5000")]
    pub send_timeout_ms: u64,

    /// Also write logs to a daily rolling file
    #[arg(long)]
    pub log: bool,

    /// Directory for log files (used with --log)
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,
}

impl ServeArgs {
    pub fn server_config(&self) -> ServerConfig {
        let send_timeout =
            (self.send_timeout_ms > 0).then(|| Duration::from_millis(self.send_timeout_ms));
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            logo_dir: self.logo_dir.clone(),
            registry: RegistryConfig { send_timeout },
        }
    }
}

pub async fn execute(args: ServeArgs) -> Result<()> {
    let config = args.server_config();
    let display_host = if config.host == "0.0.0.0" {
        "localhost"
    } else {
        config.host.as_str()
    };

    println!();
    println!("  {} {}", "OnAir".cyan().bold(), "Relay".bold());
    println!();
    println!(
        "  {}   http://{}:{}",
        "Display".green(),
        display_host,
        config.port
    );
    println!(
        "  {}   http://{}:{}/trigger",
        "Trigger".green(),
        display_host,
        config.port
    );
    println!(
        "  {}    http://{}:{}/status",
        "Status".green(),
        display_host,
        config.port
    );
    println!(
        "  {} ws://{}:{}/direct-speech",
        "WebSocket".green(),
        display_host,
        config.port
    );
    println!();
    println!("  {}", "Ctrl+C to stop".dimmed());
    println!();

    onair_web::run_server(config).await?;

    Ok(())
}
