mod commands;
mod config;
mod console;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use client_core::{ControllerOptions, HttpExamApi, Renderer, SessionController, SessionEvent};
use commands::{parse_command, resolve_confirm, status_lines, Command, HELP};
use config::{load_settings, load_settings_with, normalize_database_url, Settings};
use console::ConsoleRenderer;
use storage::PreferenceStore;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "exam-client", about = "Console client for the exam simulator")]
struct Args {
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    no_terminal: bool,
    #[arg(long)]
    terminal_port: Option<u16>,
    /// Launch options in query-string form, e.g. `no_terminal=1&terminal_port=7682`.
    #[arg(long)]
    query: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
}

fn resolve_settings(args: &Args) -> Settings {
    let mut settings = match &args.config {
        Some(path) => load_settings_with(path, |key| std::env::var(key).ok()),
        None => load_settings(),
    };
    if let Some(server_url) = &args.server_url {
        settings.server_url = server_url.clone();
    }
    if args.no_terminal {
        settings.no_terminal = true;
    }
    if args.terminal_port.is_some() {
        settings.terminal_port = args.terminal_port;
    }
    if let Some(query) = &args.query {
        settings.apply_query(query);
    }
    settings
}

async fn open_preferences(settings: &Settings, renderer: &dyn Renderer) -> Option<PreferenceStore> {
    let database_url = normalize_database_url(&settings.preferences_database_url);
    let store = match PreferenceStore::new(&database_url).await {
        Ok(store) => store,
        Err(err) => {
            warn!(%database_url, error = %err, "preferences: store unavailable, using defaults");
            return None;
        }
    };
    if let Err(err) = store.health_check().await {
        warn!(%database_url, error = %err, "preferences: store unhealthy, using defaults");
        return None;
    }
    match store.load().await {
        Ok(preferences) => {
            renderer.apply_theme(preferences.theme);
            renderer.apply_split_ratio(preferences.split_ratio);
        }
        Err(err) => warn!(error = %err, "preferences: failed to load"),
    }
    Some(store)
}

fn spawn_event_log(controller: &Arc<SessionController>) {
    let mut events = controller.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::TimerUpdated { .. }) => {}
                Ok(event) => debug!(?event, "session event"),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "session events lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();
    let settings = resolve_settings(&args);
    info!(server_url = %settings.server_url, "exam-client: starting");

    let renderer = Arc::new(ConsoleRenderer::new());
    let preferences = open_preferences(&settings, renderer.as_ref()).await;

    let controller = SessionController::with_options(
        Arc::new(HttpExamApi::new(settings.server_url.clone())),
        renderer.clone(),
        ControllerOptions {
            poll_interval: settings.poll_interval(),
            launch: settings.launch_options(),
        },
    );
    spawn_event_log(&controller);

    if let Err(err) = controller.bootstrap().await {
        warn!(error = %err, "exam-client: bootstrap incomplete");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("{err}");
                continue;
            }
        };

        match command {
            Command::Intent(intent) => {
                // Failures are already logged and surfaced by the controller.
                let _ = controller.dispatch(intent).await;
            }
            Command::Confirm => {
                let overlay = controller.snapshot().await.overlay;
                match resolve_confirm(overlay) {
                    Some(intent) => {
                        let _ = controller.dispatch(intent).await;
                    }
                    None => eprintln!("nothing to confirm"),
                }
            }
            Command::ListExams => {
                let _ = controller.load_exam_list().await;
            }
            Command::ToggleTheme => match &preferences {
                Some(store) => match store.toggle_theme().await {
                    Ok(theme) => renderer.apply_theme(theme),
                    Err(err) => warn!(error = %err, "preferences: failed to save theme"),
                },
                None => eprintln!("preferences are unavailable"),
            },
            Command::SetSplit(ratio) => match &preferences {
                Some(store) => match store.set_split_ratio(ratio).await {
                    Ok(clamped) => renderer.apply_split_ratio(clamped),
                    Err(err) => warn!(error = %err, "preferences: failed to save split ratio"),
                },
                None => eprintln!("preferences are unavailable"),
            },
            Command::Status => {
                for line in status_lines(&controller.snapshot().await) {
                    println!("{line}");
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }

    info!("exam-client: exiting");
    Ok(())
}
