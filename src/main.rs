mod cli;
mod config;
mod error;
mod llm;
mod logging;
mod rag;
mod tools;

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser};
use dotenvy::dotenv;
use tracing::{debug, error};

use crate::cli::Command;
use crate::config::{AppConfig, ConfigOverrides, Provider};
use crate::logging::init_logging;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tdl",
    version,
    about = "Let a chat model call local tools, one round at a time"
)]
struct Cli {
    /// Completion API dialect
    #[arg(long, value_enum, global = true)]
    provider: Option<Provider>,

    /// OpenAI-compatible API base URL, or the Azure resource endpoint
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Model name (deployment name on Azure)
    #[arg(long, global = true)]
    model: Option<String>,

    /// API key (set via env OPENAI_API_KEY / AZURE_OPENAI_KEY recommended)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Log level or filter directive (error,warn,info,debug,trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        let max_tool_rounds = match &self.command {
            Command::Call(args) => args.max_tool_rounds,
            _ => None,
        };
        ConfigOverrides {
            provider: self.provider,
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            max_tool_rounds,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    init_logging(
        cli.log_level.as_deref(),
        cli.log_file.as_deref(),
        cli.log_json,
    )?;

    let cfg = AppConfig::load(&cli.overrides())?;
    debug!(
        provider = ?cfg.provider,
        base_url = %cfg.base_url,
        model = %cfg.model,
        "app config"
    );

    if let Err(e) = cli::run(cli.command, &cfg).await {
        error!("{e:#}");
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Toolset;

    #[test]
    fn call_flags_parse() {
        let cli = Cli::parse_from([
            "tdl",
            "--provider",
            "azure",
            "call",
            "find me azure courses",
            "--toolset",
            "all",
            "--max-tool-rounds",
            "2",
        ]);
        let overrides = cli.overrides();
        assert_eq!(overrides.provider, Some(Provider::Azure));
        assert_eq!(overrides.max_tool_rounds, Some(2));
        match cli.command {
            Command::Call(args) => {
                assert_eq!(args.query.as_deref(), Some("find me azure courses"));
                assert_eq!(args.toolset, Toolset::All);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["tdl", "tools", "--toolset", "travel", "--log-json"]);
        assert!(cli.log_json);
        assert!(matches!(
            cli.command,
            Command::Tools {
                toolset: Toolset::Travel
            }
        ));
    }

    #[test]
    fn rag_subcommands_parse() {
        let cli = Cli::parse_from(["tdl", "rag", "ask", "what?", "--top-k", "3"]);
        match cli.command {
            Command::Rag(cli::RagCommand::Ask { query, top_k }) => {
                assert_eq!(query, "what?");
                assert_eq!(top_k, 3);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
