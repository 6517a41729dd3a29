mod client_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
    wabridge_config::{GatewayConfig, loader},
};

#[derive(Parser)]
#[command(name = "wabridge", about = "wabridge: multi-tenant WhatsApp Web gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory searched for wabridge.{toml,yaml,yml,json}.
    #[arg(long, global = true, env = "WABRIDGE_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server.
    Gateway {
        /// Overrides `server.bind`.
        #[arg(long)]
        bind: Option<String>,
        /// Overrides `server.port`.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create the client database and seed the default client.
    InitDb,
    /// Client management.
    Clients {
        #[command(subcommand)]
        action: client_commands::ClientAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> GatewayConfig {
    if let Some(dir) = &cli.config_dir {
        loader::set_config_dir(dir.clone());
    }
    loader::discover_and_load()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "wabridge starting");
    let mut config = load_config(&cli);

    match cli.command {
        Commands::Gateway { bind, port } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            wabridge_gateway::start_gateway(config).await
        },
        Commands::InitDb => client_commands::init_db(&config).await,
        Commands::Clients { action } => client_commands::handle_clients(action, &config).await,
    }
}
