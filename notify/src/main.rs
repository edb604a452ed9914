use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use taskflow_notify::{app, routes::NotifyState, store::NotifyStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let database_url =
        std::env::var("NOTIFY_DATABASE_URL").unwrap_or_else(|_| "./notifications.sqlite".to_string());
    let pubsub_name =
        std::env::var("PUBSUB_NAME").unwrap_or_else(|_| "taskflow-pubsub".to_string());
    let listen_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:8002".to_string());

    let store = NotifyStore::connect(&database_url)
        .await
        .context("Failed to connect to notification store")?;
    store.migrate().await.context("Failed to run migrations")?;

    let router = app(NotifyState { store, pubsub_name });

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind {listen_addr}"))?;
    info!(address = %listen_addr, "TaskFlow notification service listening");

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
