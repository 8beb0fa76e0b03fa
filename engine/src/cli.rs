//! CLI interface for PT
//!
//! Uses clap's derive API. Every command shares the global `--json`,
//! `--log` and `--config` flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// PT, a nutrition and fitness coaching assistant
///
/// Serves the chat API or talks to the coach directly from the terminal.
#[derive(Parser, Debug)]
#[command(name = "pt")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API
    Serve {
        /// Address to listen on, overriding `server.bind`
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Chat with the coach in the terminal
    Chat {
        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        /// Answer model as `backend:model`, e.g. `openai:gpt-4o`
        #[arg(long, value_name = "MODEL")]
        model: Option<String>,
    },

    /// Show a user's stored conversation
    History {
        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        /// Number of exchanges to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Run system diagnostics
    Doctor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chat_with_global_flags() {
        let cli = Cli::try_parse_from([
            "pt",
            "--json",
            "chat",
            "--first-name",
            "Ana",
            "--last-name",
            "Lee",
            "--model",
            "gemini:gemini-1.5-flash",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Command::Chat {
                first_name,
                last_name,
                model,
            } => {
                assert_eq!(first_name, "Ana");
                assert_eq!(last_name, "Lee");
                assert_eq!(model.as_deref(), Some("gemini:gemini-1.5-flash"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn history_limit_defaults_to_ten() {
        let cli =
            Cli::try_parse_from(["pt", "history", "--first-name", "A", "--last-name", "B"]).unwrap();
        assert!(matches!(cli.command, Command::History { limit: 10, .. }));
    }

    #[test]
    fn chat_requires_names() {
        assert!(Cli::try_parse_from(["pt", "chat", "--first-name", "A"]).is_err());
    }
}
