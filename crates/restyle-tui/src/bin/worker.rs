//! Headless generation worker speaking newline-delimited JSON.
//!
//! Reads commands from stdin and writes events to stdout. All tracing output
//! goes to stderr so that stdout stays a clean protocol channel.

use std::sync::Arc;

use restyle_core::stdio::run_stdio_bridge;
use restyle_core::{Config, ModelRuntime, OllamaClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::load_or_create()?;
    tracing::info!(model = %config.model_name, "restyle-worker starting");

    let runtime: Arc<dyn ModelRuntime> =
        Arc::new(OllamaClient::new(&config.ollama_url, &config.model_name));

    run_stdio_bridge(runtime, config.chat_template)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "restyle-worker exited with error");
            anyhow::anyhow!("restyle-worker failed: {e}")
        })?;

    tracing::info!("restyle-worker shut down cleanly");
    Ok(())
}
