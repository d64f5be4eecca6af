use std::{
    io::{self, BufRead},
    path::PathBuf,
    thread,
};

mod backend_bridge;
mod config;
mod controller;
mod ui;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, select, Receiver};
use shared::{domain::Capability, protocol::WorkerMessage};
use tracing_subscriber::EnvFilter;
use worker_core::{probe_all, ModelHost, ProgressMonitor, SimulatedHost};

use crate::{
    backend_bridge::runtime::{self, BackendBridge},
    config::{load_settings, Settings},
    controller::{
        events::{UiError, UiEvent},
        orchestration::Controller,
    },
    ui::render::ConsoleRenderer,
};

#[derive(Parser, Debug)]
#[command(
    name = "prompt-console",
    about = "Drive an on-device language model worker from the terminal"
)]
struct Cli {
    /// Settings file (defaults to ./prompt_console.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read prompts from stdin, one per line.
    Run,
    /// Wait for the model, send one prompt and print the response.
    Ask { prompt: String },
    /// Print the availability of every host capability.
    Probe,
    /// Print how many input tokens the model would use for a text.
    Tokens { text: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_interactive(&settings),
        Command::Ask { prompt } => ask_once(&settings, &prompt),
        Command::Probe => probe(&settings),
        Command::Tokens { text } => count_tokens(&settings, &text),
    }
}

/// Applies one worker envelope and renders the transition. A protocol
/// violation ends the controller.
fn apply_envelope(
    controller: &mut Controller,
    renderer: &mut ConsoleRenderer<io::Stdout>,
    raw: &str,
) -> Result<WorkerMessage> {
    let previous = controller.view().clone();
    let message = controller
        .handle_envelope(raw)
        .context("fatal protocol violation from inference worker")?;
    renderer.render_transition(&previous, controller.view(), &message)?;
    Ok(message)
}

fn spawn_input_reader(capacity: usize) -> Result<Receiver<UiEvent>> {
    let (input_tx, input_rx) = bounded::<UiEvent>(capacity.max(1));
    thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if input_tx.send(UiEvent::Prompt(line)).is_err() {
                    return;
                }
            }
            let _ = input_tx.send(UiEvent::InputClosed);
        })
        .context("failed to spawn stdin reader thread")?;
    Ok(input_rx)
}

fn run_interactive(settings: &Settings) -> Result<()> {
    let bridge = runtime::launch(settings)?;
    let input_rx = spawn_input_reader(settings.request_queue_capacity)?;
    let mut controller = Controller::new(bridge.request_sender());
    let mut renderer = ConsoleRenderer::new(io::stdout());
    tracing::info!("console started; type a prompt once the model is ready");

    loop {
        select! {
            recv(bridge.status_receiver()) -> raw => {
                let raw = raw.map_err(|_| anyhow!("inference worker exited unexpectedly"))?;
                let message = apply_envelope(&mut controller, &mut renderer, &raw)?;
                if UiError::for_worker_message(&message).is_some_and(|notice| notice.requires_restart()) {
                    tracing::warn!("language model is unusable until the console restarts");
                }
            }
            recv(input_rx) -> event => match event {
                Ok(UiEvent::Prompt(line)) => {
                    renderer.input_received();
                    if let Err(err) = controller.submit(&line) {
                        let notice = UiError::from_dispatch(&err);
                        tracing::debug!(category = ?notice.category(), "prompt rejected: {err}");
                        renderer.notice(&notice)?;
                    }
                }
                Ok(UiEvent::InputClosed) | Err(_) => break,
            },
        }
    }

    tracing::info!("input closed; stopping inference worker");
    shutdown(bridge);
    Ok(())
}

fn ask_once(settings: &Settings, prompt: &str) -> Result<()> {
    let bridge = runtime::launch(settings)?;
    let mut controller = Controller::new(bridge.request_sender());
    let mut renderer = ConsoleRenderer::new(io::stdout());
    let mut sent = false;

    let outcome = loop {
        let Ok(raw) = bridge.status_receiver().recv() else {
            break Err(anyhow!("inference worker exited unexpectedly"));
        };
        match apply_envelope(&mut controller, &mut renderer, &raw)? {
            WorkerMessage::ModelReady if !sent => {
                controller.submit(prompt)?;
                sent = true;
            }
            WorkerMessage::ResponseReady(_) => break Ok(()),
            WorkerMessage::ModelError => break Err(anyhow!("model preparation failed")),
            WorkerMessage::InferenceError => break Err(anyhow!("inference failed")),
            _ => {}
        }
    };

    shutdown(bridge);
    outcome
}

fn current_thread_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")
}

fn probe(settings: &Settings) -> Result<()> {
    let host = SimulatedHost::new(settings.host_profile());
    let results = current_thread_runtime()?.block_on(probe_all(&host));

    let mut renderer = ConsoleRenderer::new(io::stdout());
    renderer.render_probe(&results)?;
    if results.iter().all(|(_, outcome)| outcome.is_err()) {
        bail!("every availability probe failed");
    }
    Ok(())
}

fn count_tokens(settings: &Settings, text: &str) -> Result<()> {
    let host = SimulatedHost::new(settings.host_profile());
    let session_options = settings.worker_settings().session;
    let tokens = current_thread_runtime()?.block_on(async {
        let session = host
            .create(
                Capability::LanguageModel,
                &session_options,
                ProgressMonitor::noop(),
            )
            .await?;
        session.measure_input_usage(text).await
    })?;

    ConsoleRenderer::new(io::stdout()).render_token_count(tokens)?;
    Ok(())
}

fn shutdown(bridge: BackendBridge) {
    drop(bridge);
    tracing::debug!("inference worker joined");
}
