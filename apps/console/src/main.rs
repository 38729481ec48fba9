use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use clap::Parser;
use engine_integration::LoopbackEngine;
use rustyline::DefaultEditor;
use session_core::{ChannelNotifier, CommandDispatcher, ControllerOptions, SessionController};
use tokio::runtime::Handle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod shell;

use config::{load_settings, Settings};
use shell::{ConsoleTerminal, NotificationSink};

#[derive(Parser, Debug)]
#[command(name = "jami-console", version, about = "Interactive console for a communications engine")]
struct Args {
    /// Settings file (defaults to ./console.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Tracing filter directive, e.g. `debug` or `session_core=trace`.
    #[arg(long)]
    log_filter: Option<String>,
}

fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!("failed to create log directory '{}'", parent.display())
        })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file '{}'", path.display()))
}

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));

    let file = match &settings.log_file {
        Some(path) => match open_log_file(path) {
            Ok(file) => Some(file),
            Err(err) => {
                eprintln!("warning: {err:#}; logging to stderr");
                None
            }
        },
        None => None,
    };

    match file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(log_file) = args.log_file {
        settings.log_file = Some(log_file);
    }
    if let Some(log_filter) = args.log_filter {
        settings.log_filter = log_filter;
    }
    init_logging(&settings);
    info!(log_file = ?settings.log_file, "console starting");

    let engine = Arc::new(LoopbackEngine::new());
    let (notifier, notifications) = ChannelNotifier::new();
    let controller = SessionController::new(
        engine,
        Arc::new(notifier),
        ControllerOptions {
            engine_timeout: settings.engine_timeout(),
        },
    );
    controller.start().await;

    let mut editor = DefaultEditor::new().context("failed to initialise line editor")?;
    let sink = match editor.create_external_printer() {
        Ok(printer) => NotificationSink::External(Box::new(printer)),
        Err(err) => {
            warn!(error = %err, "no external printer; notifications reprint the prompt");
            NotificationSink::Plain {
                prompt: settings.prompt.clone(),
            }
        }
    };
    shell::spawn_printer(notifications, sink).context("failed to start console printer")?;

    let dispatcher = CommandDispatcher::new(Arc::clone(&controller));
    let runtime = Handle::current();
    let prompt = settings.prompt.clone();
    tokio::task::spawn_blocking(move || {
        shell::run(ConsoleTerminal::new(editor), dispatcher, runtime, &prompt)
    })
    .await
    .context("console loop panicked")?;

    println!("Stopping console...");
    controller.shutdown().await;
    info!("console stopped");
    Ok(())
}
