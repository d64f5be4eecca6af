//! Console input events and user-facing error modeling for the controller.

use shared::protocol::WorkerMessage;

use crate::controller::orchestration::DispatchError;

pub enum UiEvent {
    Prompt(String),
    InputClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Preparation,
    Inference,
    Dispatch,
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    message: String,
}

impl UiError {
    /// Notice for a worker error message, if it is one.
    pub fn for_worker_message(message: &WorkerMessage) -> Option<Self> {
        match message {
            WorkerMessage::ModelError => Some(Self {
                category: UiErrorCategory::Preparation,
                message: "Model preparation failed; restart the console to try again.".into(),
            }),
            WorkerMessage::InferenceError => Some(Self {
                category: UiErrorCategory::Inference,
                message: "Generation failed; you can retry the same or a new prompt.".into(),
            }),
            _ => None,
        }
    }

    pub fn from_dispatch(err: &DispatchError) -> Self {
        let message = match err {
            DispatchError::Busy { status } => {
                format!("Model is {status}; wait for it to be ready before sending a prompt.")
            }
            DispatchError::EmptyPrompt => "Prompt is empty; type something first.".to_string(),
            DispatchError::QueueFull => "Request queue is full; please retry.".to_string(),
            DispatchError::WorkerDisconnected => {
                "Inference worker disconnected (possible startup/runtime failure); restart the console."
                    .to_string()
            }
            DispatchError::Encode(err) => format!("Could not encode prompt: {err}"),
        };
        Self {
            category: UiErrorCategory::Dispatch,
            message,
        }
    }

    pub fn requires_restart(&self) -> bool {
        self.category == UiErrorCategory::Preparation
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
