mod agent;
mod cron_commands;

use std::path::PathBuf;

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "naia", about = "Naia, gateway client and local cron engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Only look for naia.{toml,yaml,yml,json} in this directory.
    #[arg(long, global = true, env = "NAIA_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the cron scheduler and the gateway connection until Ctrl-C.
    Agent,
    /// Manage jobs in the local cron store.
    Cron {
        #[command(subcommand)]
        action: cron_commands::CronAction,
    },
    /// Send one request to the gateway and print its payload.
    Call {
        method: String,
        /// JSON params (defaults to `{}`).
        params: Option<String>,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // stdout carries shell messages and command output.
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "naia starting");

    let config = naia_config::discover_and_load(cli.config_dir.as_deref());

    match cli.command {
        Commands::Agent => agent::run(config).await,
        Commands::Cron { action } => {
            cron_commands::handle_cron(action, &config.cron.resolved_store_path())
        },
        Commands::Call { method, params } => {
            let params = match params {
                Some(raw) => serde_json::from_str(&raw)
                    .with_context(|| format!("params are not valid JSON: {raw}"))?,
                None => serde_json::json!({}),
            };
            let payload = agent::call(&config, &method, params).await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        },
    }
}
