mod config_commands;
mod intent_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "switchyard", about = "Switchyard: intent routing and agent handoff")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to switchyard.{toml,yaml,yml,json} in ./ then
    /// the user config directory).
    #[arg(long, global = true, env = "SWITCHYARD_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and report errors and warnings.
    Validate,
    /// List intents in matching priority order.
    Intents {
        /// Also print each intent's utterances.
        #[arg(short, long)]
        verbose: bool,
    },
    /// Match a message against the configured intents.
    Match {
        message: String,
        /// Print the match as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "switchyard starting");

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Validate => config_commands::handle_validate(config),
        Commands::Intents { verbose } => intent_commands::handle_intents(config, verbose),
        Commands::Match { message, json } => {
            intent_commands::handle_match(config, &message, json).await
        },
    }
}
