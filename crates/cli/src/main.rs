//! Steward CLI: operator entry point.
//!
//! Commands:
//! - `config` : Validate, show or initialise the configuration
//! - `models` : List registered models and try out model selection
//! - `usage`  : Price a call from the configured model tables

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use steward_config::AppConfig;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::models::StrategyArg;

#[derive(Parser)]
#[command(
    name = "steward",
    about = "LLM agent execution core",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Use this config file instead of ~/.steward/config.toml
    #[arg(short, long, global = true, env = "STEWARD_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Model registry and selection
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },

    /// Cost estimation
    Usage {
        #[command(subcommand)]
        action: UsageAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Check the configuration for errors
    Validate,
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum ModelsAction {
    /// List registered models
    List {
        /// Only models whose credentials are present
        #[arg(long)]
        available: bool,
    },

    /// Show which model a selection would pick
    Select {
        #[arg(long, value_enum, default_value_t = StrategyArg::Capability)]
        strategy: StrategyArg,

        /// Model key for the `specified` strategy
        #[arg(short, long)]
        model: Option<String>,

        /// Require function calling
        #[arg(long)]
        tools: bool,

        /// Require image input
        #[arg(long)]
        image: bool,

        #[arg(long)]
        provider: Option<String>,

        #[arg(long)]
        tag: Option<String>,

        #[arg(long)]
        exclude_local: bool,

        /// Ceiling on input price, USD per million tokens
        #[arg(long, default_value_t = 0.0)]
        max_cost_input: f64,

        #[arg(long, default_value_t = 0)]
        min_context: usize,
    },
}

#[derive(Subcommand)]
enum UsageAction {
    /// List per-model pricing
    Pricing,

    /// Estimate the cost of one call
    Estimate {
        /// Model key
        model: String,

        #[arg(long, default_value_t = 1000)]
        input_tokens: u32,

        #[arg(long, default_value_t = 500)]
        output_tokens: u32,
    },
}

fn init_tracing(verbose: bool, json: bool, level: &str) {
    let default = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = commands::load_config(cli.config.as_deref());
    let (level, json) = match &config {
        Ok(c) => (c.logging.level.clone(), c.logging.json),
        Err(_) => ("info".to_string(), false),
    };
    init_tracing(cli.verbose, cli.json_logs || json, &level);

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::config_path);

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Validate => commands::config_cmd::validate(config)?,
            ConfigAction::Show => commands::config_cmd::show(&config?)?,
            ConfigAction::Path => commands::config_cmd::path(&config_path),
            ConfigAction::Init { force } => commands::config_cmd::init(&config_path, force)?,
        },
        Commands::Models { action } => match action {
            ModelsAction::List { available } => commands::models::list(&config?, available),
            ModelsAction::Select {
                strategy,
                model,
                tools,
                image,
                provider,
                tag,
                exclude_local,
                max_cost_input,
                min_context,
            } => {
                let criteria = commands::models::criteria(
                    tools,
                    image,
                    provider,
                    tag,
                    exclude_local,
                    max_cost_input,
                    min_context,
                );
                commands::models::select(&config?, strategy, model.as_deref(), &criteria)?
            }
        },
        Commands::Usage { action } => match action {
            UsageAction::Pricing => commands::usage::pricing(&config?),
            UsageAction::Estimate {
                model,
                input_tokens,
                output_tokens,
            } => commands::usage::estimate(&config?, &model, input_tokens, output_tokens)?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_select_flags() {
        let cli = Cli::try_parse_from([
            "steward",
            "models",
            "select",
            "--strategy",
            "cost-first",
            "--exclude-local",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Models {
                action:
                    ModelsAction::Select {
                        strategy,
                        exclude_local,
                        ..
                    },
            } => {
                assert_eq!(strategy, StrategyArg::CostFirst);
                assert!(exclude_local);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn estimate_defaults() {
        let cli = Cli::try_parse_from(["steward", "usage", "estimate", "gpt-4o"]).unwrap();
        match cli.command {
            Commands::Usage {
                action:
                    UsageAction::Estimate {
                        model,
                        input_tokens,
                        output_tokens,
                    },
            } => {
                assert_eq!(model, "gpt-4o");
                assert_eq!((input_tokens, output_tokens), (1000, 500));
            }
            _ => panic!("wrong command"),
        }
    }
}
