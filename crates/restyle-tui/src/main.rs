use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use restyle_core::{spawn_worker, Config, ModelRuntime, OllamaClient};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod theme;
mod transcript;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

const TICK_RATE: Duration = Duration::from_millis(300);

fn log_path() -> Result<PathBuf> {
    let dir = dirs::data_local_dir()
        .context("Could not determine data directory")?
        .join("restyle");
    fs::create_dir_all(&dir)?;
    Ok(dir.join("restyle.log"))
}

/// Log to a file: the screen belongs to the TUI.
fn init_logging() -> Result<PathBuf> {
    let path = log_path()?;
    let file = File::options().create(true).append(true).open(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();

    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_path = init_logging()?;
    let config = Config::load_or_create()?;
    info!(model = %config.model_name, url = %config.ollama_url, log = %log_path.display(), "starting");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run(&mut terminal, &config).await;

    tui::restore()?;

    if let Err(e) = &result {
        error!(error = %e, "exited with error");
    }
    result
}

async fn run(terminal: &mut tui::Tui, config: &Config) -> Result<()> {
    let runtime: Arc<dyn ModelRuntime> =
        Arc::new(OllamaClient::new(&config.ollama_url, &config.model_name));
    let (worker, mut worker_events) = spawn_worker(runtime, config.chat_template);

    let mut app = App::new(config, worker.commands());
    let mut events = EventHandler::new(TICK_RATE);

    app.controller.start();

    loop {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        tokio::select! {
            Some(event) = events.next() => handler::handle_event(&mut app, event),
            Some(event) = worker_events.recv() => app.controller.handle_event(event),
            else => break,
        }

        if app.should_quit {
            break;
        }
    }

    info!("shutting down");
    // The controller holds a command sender; the worker exits once all are gone.
    drop(app);
    worker.shutdown().await;
    Ok(())
}
