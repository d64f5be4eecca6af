//! Background model lifecycle: prepare -> ready -> generate -> respond.
//!
//! Every transition is reported to the controller as an encoded
//! [`WorkerMessage`]; error detail stays in the worker's logs.

use std::{
    sync::{
        atomic::{AtomicU16, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use shared::{
    domain::Capability,
    protocol::{decode_request, WorkerMessage},
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{
    host::{HostError, ModelHost, ModelSession, ProgressMonitor, SessionOptions},
    streaming::CancelHandle,
};

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub stream_responses: bool,
    pub session: SessionOptions,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            stream_responses: true,
            session: SessionOptions::default(),
        }
    }
}

enum SessionState {
    Unprepared,
    Ready(Box<dyn ModelSession>),
    Failed,
}

/// Stops the worker after its current request, abandons a model download
/// in progress and cancels any in-flight generation.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    requested: Arc<watch::Sender<bool>>,
    in_flight: Arc<Mutex<Option<CancelHandle>>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        let (requested, _) = watch::channel(false);
        Self {
            requested: Arc::new(requested),
            in_flight: Arc::new(Mutex::new(None)),
        }
    }
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        // flag and slot change under one lock so `track` cannot miss it
        let slot = self.in_flight.lock();
        self.requested.send_replace(true);
        if let Ok(mut slot) = slot {
            if let Some(cancel) = slot.take() {
                cancel.cancel();
            }
        }
    }

    pub fn is_requested(&self) -> bool {
        *self.requested.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub async fn requested(&self) {
        let mut rx = self.requested.subscribe();
        // the sender lives in `self`, so this only returns on a request
        let _ = rx.wait_for(|requested| *requested).await;
    }

    fn track(&self, cancel: CancelHandle) {
        let Ok(mut slot) = self.in_flight.lock() else {
            cancel.cancel();
            return;
        };
        if self.is_requested() {
            cancel.cancel();
            return;
        }
        *slot = Some(cancel);
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.in_flight.lock() {
            slot.take();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub struct InferenceWorker<H> {
    host: H,
    settings: WorkerSettings,
    session: SessionState,
    status_tx: Sender<String>,
    shutdown: ShutdownHandle,
}

impl<H: ModelHost> InferenceWorker<H> {
    pub fn new(host: H, settings: WorkerSettings, status_tx: Sender<String>) -> Self {
        Self {
            host,
            settings,
            session: SessionState::Unprepared,
            status_tx,
            shutdown: ShutdownHandle::default(),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.session, SessionState::Ready(_))
    }

    /// Prepares the model, then serves requests until the request channel
    /// closes or shutdown is requested. Requests are read with a blocking
    /// receive, so this must not run on a runtime worker thread that other
    /// tasks depend on.
    pub async fn run(mut self, request_rx: Receiver<String>) -> Result<()> {
        self.prepare().await?;

        while !self.shutdown.is_requested() {
            let raw = match request_rx.recv_timeout(SHUTDOWN_POLL_INTERVAL) {
                Ok(raw) => raw,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            if self.shutdown.is_requested() {
                break;
            }
            if self.handle_request(&raw).await? == Flow::Stop {
                break;
            }
        }

        info!("inference worker stopped");
        Ok(())
    }

    pub async fn prepare(&mut self) -> Result<()> {
        self.emit(WorkerMessage::PreparingModel)?;
        info!("preparing language model");

        let outcome = tokio::select! {
            biased;
            outcome = self.create_session() => outcome,
            _ = self.shutdown.requested() => Err(HostError::Cancelled),
        };

        match outcome {
            Err(HostError::Cancelled) if self.shutdown.is_requested() => {
                self.session = SessionState::Failed;
                info!("model preparation abandoned by shutdown");
            }
            Ok(session) => {
                self.session = SessionState::Ready(session);
                info!("language model ready");
                self.emit(WorkerMessage::ModelReady)?;
            }
            Err(err) => {
                self.session = SessionState::Failed;
                error!("language model preparation failed: {err}");
                self.emit(WorkerMessage::ModelError)?;
            }
        }
        Ok(())
    }

    async fn create_session(&self) -> Result<Box<dyn ModelSession>, HostError> {
        let capability = Capability::LanguageModel;
        let availability = self.host.availability(capability).await?;
        info!(%availability, "language model availability");
        if !availability.is_usable() {
            return Err(HostError::Unavailable(capability));
        }

        self.host
            .create(capability, &self.settings.session, self.progress_monitor())
            .await
    }

    /// Emits `MODEL_PROGRESS` only when the rounded percent changes.
    fn progress_monitor(&self) -> ProgressMonitor {
        let status_tx = self.status_tx.clone();
        let last_percent = Arc::new(AtomicU16::new(u16::MAX));
        ProgressMonitor::new(move |progress| {
            let percent = progress.percent();
            if last_percent.swap(u16::from(percent), Ordering::SeqCst) == u16::from(percent) {
                return;
            }
            debug!(percent, "model download progress");
            match WorkerMessage::ModelProgress(percent).encode() {
                Ok(raw) => {
                    if status_tx.send(raw).is_err() {
                        warn!("controller disconnected while reporting progress");
                    }
                }
                Err(err) => error!("failed to encode progress message: {err}"),
            }
        })
    }

    async fn handle_request(&self, raw: &str) -> Result<Flow> {
        let prompt = match decode_request(raw) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!("rejecting malformed request: {err}");
                self.emit(WorkerMessage::InferenceError)?;
                return Ok(Flow::Continue);
            }
        };

        let session = match &self.session {
            SessionState::Ready(session) => session,
            SessionState::Unprepared | SessionState::Failed => {
                warn!("request received but the model is not ready");
                self.emit(WorkerMessage::ModelError)?;
                return Ok(Flow::Continue);
            }
        };

        self.emit(WorkerMessage::GeneratingResponse)?;
        debug!(prompt_chars = prompt.chars().count(), "generating response");

        let outcome = if self.settings.stream_responses {
            self.generate_streaming(session.as_ref(), &prompt).await
        } else {
            tokio::select! {
                biased;
                outcome = session.prompt(&prompt) => outcome,
                _ = self.shutdown.requested() => Err(HostError::Cancelled),
            }
        };

        match outcome {
            Ok(text) => {
                info!(response_chars = text.chars().count(), "response ready");
                self.emit(WorkerMessage::ResponseReady(text))?;
                Ok(Flow::Continue)
            }
            Err(HostError::Cancelled) if self.shutdown.is_requested() => {
                info!("generation cancelled by shutdown");
                Ok(Flow::Stop)
            }
            Err(err) => {
                warn!("inference failed: {err}");
                self.emit(WorkerMessage::InferenceError)?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn generate_streaming(
        &self,
        session: &dyn ModelSession,
        prompt: &str,
    ) -> Result<String, HostError> {
        let stream = session.prompt_streaming(prompt);
        self.shutdown.track(stream.cancel_handle());
        let outcome = stream.collect_text().await;
        self.shutdown.clear();
        outcome
    }

    fn emit(&self, message: WorkerMessage) -> Result<()> {
        let code = message.code();
        let raw = message.encode()?;
        self.status_tx
            .send(raw)
            .map_err(|_| anyhow!("controller disconnected before receiving {code}"))?;
        debug!(%code, "posted worker message");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/worker_tests.rs"]
mod tests;
