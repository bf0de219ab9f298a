use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use svg_gateway::server::{AppState, serve};
use svg_gateway::{Env, GatewayConfig, ServiceManager};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::Layer as _;

/// SVG image generation gateway.
#[derive(Debug, Parser)]
#[command(name = "svg-gateway", version, about, long_about = None)]
struct Cli {
    /// YAML or TOML config file; defaults plus environment when omitted.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Dotenv file consulted before the process environment.
    #[arg(long, value_name = "FILE", default_value = ".env")]
    dotenv: PathBuf,

    /// Overrides the configured `host:port`.
    #[arg(long, value_name = "HOST:PORT")]
    listen: Option<String>,

    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    let env = Env::load_dotenv(&cli.dotenv).await?;
    let config = match &cli.config {
        Some(path) => GatewayConfig::load(path, &env).await?,
        None => GatewayConfig::from_env(&env)?,
    };
    let manager = Arc::new(ServiceManager::from_config(&config, &env)?);
    let state = AppState::from_config(manager, &config);

    let listen = cli.listen.unwrap_or_else(|| config.server.listen_addr());
    let listener = tokio::net::TcpListener::bind(&listen).await?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for ctrl-c");
            return;
        }
        tracing::info!("shutdown requested");
        signal.cancel();
    });

    serve(listener, state, shutdown).await?;
    Ok(())
}

fn init_tracing(json_logs: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = if json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(false).boxed()
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}
