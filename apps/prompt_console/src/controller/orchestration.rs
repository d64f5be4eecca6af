//! Controller state and dispatch of prompts to the worker request queue.

use crossbeam_channel::{Sender, TrySendError};
use shared::{
    error::ProtocolError,
    protocol::{encode_request, WorkerMessage},
};
use thiserror::Error;

use crate::controller::reducer::{reduce, ModelStatus, ViewState};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("inference trigger is disabled while the model is {status}")]
    Busy { status: ModelStatus },
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("request queue is full")]
    QueueFull,
    #[error("inference worker disconnected")]
    WorkerDisconnected,
    #[error(transparent)]
    Encode(#[from] ProtocolError),
}

/// Owns the view state and the request side of the worker channel. One
/// request may be in flight at a time.
pub struct Controller {
    view: ViewState,
    request_tx: Sender<String>,
}

impl Controller {
    pub fn new(request_tx: Sender<String>) -> Self {
        Self {
            view: ViewState::default(),
            request_tx,
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// Decodes and applies one worker envelope. Protocol errors are fatal to
    /// the caller; the view is left untouched.
    pub fn handle_envelope(&mut self, raw: &str) -> Result<WorkerMessage, ProtocolError> {
        let message = WorkerMessage::decode(raw)?;
        tracing::debug!(code = %message.code(), "message from worker");
        self.view = reduce(&self.view, &message);
        Ok(message)
    }

    pub fn submit(&mut self, prompt: &str) -> Result<(), DispatchError> {
        if prompt.trim().is_empty() {
            return Err(DispatchError::EmptyPrompt);
        }
        if !self.view.trigger_enabled {
            return Err(DispatchError::Busy {
                status: self.view.status,
            });
        }

        let raw = encode_request(prompt)?;
        match self.request_tx.try_send(raw) {
            Ok(()) => {
                // stays disabled until the worker's terminal message
                self.view.trigger_enabled = false;
                tracing::debug!(prompt_chars = prompt.chars().count(), "queued prompt for worker");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(DispatchError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(DispatchError::WorkerDisconnected),
        }
    }
}

#[cfg(test)]
#[path = "../tests/orchestration_tests.rs"]
mod tests;
