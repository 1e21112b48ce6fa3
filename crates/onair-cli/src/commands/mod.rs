//! CLI command definitions and handlers.

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod serve;
pub mod status;
pub mod trigger;

/// OnAir Relay - fan out text triggers to connected displays
#[derive(Parser)]
#[command(name = "onair")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the relay server
    Serve(serve::ServeArgs),

    /// Send a line of text to every connected consumer
    Trigger(trigger::TriggerArgs),

    /// Show connection counts of a running relay
    Status(status::StatusArgs),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Serve(args) => serve::execute(args).await,
            Commands::Trigger(args) => trigger::execute(args).await,
            Commands::Status(args) => status::execute(args).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["onair", "serve"]).unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let config = args.server_config();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(
            config.registry.send_timeout,
            Some(std::time::Duration::from_millis(5000))
        );
    }

    #[test]
    fn test_zero_send_timeout_disables_deadline() {
        let cli = Cli::try_parse_from(["onair", "serve", "--send-timeout-ms", "0"]).unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.server_config().registry.send_timeout, None);
    }

    #[test]
    fn test_trigger_requires_text() {
        assert!(Cli::try_parse_from(["onair", "trigger"]).is_err());
        let cli =
            Cli::try_parse_from(["onair", "trigger", "hello", "--url", "http://relay:9000"])
                .unwrap();
        let Commands::Trigger(args) = cli.command else {
            panic!("expected trigger");
        };
        assert_eq!(args.text, "hello");
        assert_eq!(args.url, "http://relay:9000");
    }
}
