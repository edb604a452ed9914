use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use taskflow_mcp::{build_state, config::Config, server};

#[derive(Parser)]
#[command(name = "taskflow-mcp")]
#[command(about = "TaskFlow tool-calling server for agent clients")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CONFIG_FILE")]
    config: Option<String>,

    /// Port override
    #[arg(long)]
    port: Option<u16>,

    /// REST API backend override
    #[arg(long, env = "API_URL")]
    api_url: Option<String>,

    /// Log level override
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref api_url) = cli.api_url {
        config.api.url = api_url.clone();
    }
    if let Some(ref log_level) = cli.log_level {
        config.logging.level = log_level.clone();
    }

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!(
        api_url = %config.api.url,
        sso_url = %config.idp.sso_url,
        dev_mode = config.idp.dev_mode,
        tools = taskflow_mcp::registry::TOOLS.len(),
        "TaskFlow tool server starting"
    );

    let state = build_state(&config);
    state.verifier.warm_up().await;

    let router = server::app(state);
    let addr = config.server_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(address = %addr, "Tool server listening on /mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for ctrl+c");
            info!("Received Ctrl+C, shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
