use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use promptgate_config::{AppConfig, ConfigLoader};
use promptgate_gateway::GatewayServer;
use promptgate_llm::PromptSelector;
use promptgate_security::RedactingWriter;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "promptgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML config file (defaults to ./promptgate.yml when present)
    #[arg(short, long, global = true, env = "PROMPTGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Skip loading a .env file from the working directory
    #[arg(long, global = true)]
    no_dotenv: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway (default)
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Load and validate configuration, then print a summary
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    let mut loader = ConfigLoader::new(cli.config.clone());
    if cli.no_dotenv {
        loader = loader.without_dotenv();
    }
    let mut config = loader.load().context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            info!(
                model = %config.azure_openai.model,
                history = config.chat_history.is_some(),
                "starting promptgate"
            );
            GatewayServer::new(config)
                .run()
                .await
                .context("gateway failed")?;
        }
        Commands::CheckConfig => print_summary(&config)?,
    }

    Ok(())
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(RedactingWriter::stderr());

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

fn print_summary(config: &AppConfig) -> Result<()> {
    let prompts = PromptSelector::from_config(config).context("invalid prompt table")?;
    let aoai = &config.azure_openai;

    println!("configuration OK");
    println!(
        "  endpoint:     {}",
        aoai.resolved_endpoint().unwrap_or_default()
    );
    println!("  deployment:   {}", aoai.model);
    println!("  api version:  {}", aoai.preview_api_version);
    println!("  api key:      {}", if aoai.key.is_some() { "set" } else { "not set" });
    println!("  contexts:     {}", prompts.contexts().join(", "));
    println!(
        "  fallback:     {}",
        if prompts.has_default() { "system message" } else { "none" }
    );
    match &config.chat_history {
        Some(history) => println!(
            "  history:      {} ({}, feedback {})",
            history.database_path().display(),
            history.conversations_container,
            if history.enable_feedback { "on" } else { "off" }
        ),
        None => println!("  history:      disabled"),
    }
    println!(
        "  listen:       {}:{}",
        config.gateway.host, config.gateway.port
    );
    Ok(())
}
