//! Pure status reduction from worker messages to view state.

use std::fmt;

use shared::protocol::WorkerMessage;

/// Display-only model status, derived from the latest worker message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    NotStarted,
    Preparing { percent: Option<u8> },
    Ready,
    Generating,
    Error,
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => f.write_str("not-started"),
            Self::Preparing { percent: None } => f.write_str("preparing"),
            Self::Preparing {
                percent: Some(percent),
            } => write!(f, "preparing ({percent}%)"),
            Self::Ready => f.write_str("ready"),
            Self::Generating => f.write_str("generating"),
            Self::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub status: ModelStatus,
    /// Whether the single inference trigger accepts a prompt.
    pub trigger_enabled: bool,
    pub progress_visible: bool,
    pub progress_percent: u8,
    pub output: Option<String>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            status: ModelStatus::NotStarted,
            trigger_enabled: false,
            progress_visible: false,
            progress_percent: 0,
            output: None,
        }
    }
}

pub fn status_for(message: &WorkerMessage) -> ModelStatus {
    match message {
        WorkerMessage::PreparingModel => ModelStatus::Preparing { percent: None },
        WorkerMessage::ModelProgress(percent) => ModelStatus::Preparing {
            percent: Some(*percent),
        },
        WorkerMessage::ModelReady | WorkerMessage::ResponseReady(_) => ModelStatus::Ready,
        WorkerMessage::GeneratingResponse => ModelStatus::Generating,
        WorkerMessage::ModelError | WorkerMessage::InferenceError => ModelStatus::Error,
    }
}

pub fn reduce(previous: &ViewState, message: &WorkerMessage) -> ViewState {
    let mut next = previous.clone();
    next.status = status_for(message);

    match message {
        WorkerMessage::PreparingModel => {
            next.trigger_enabled = false;
            next.progress_visible = true;
            next.progress_percent = 0;
        }
        WorkerMessage::ModelProgress(percent) => {
            next.progress_percent = *percent;
        }
        WorkerMessage::ModelReady => {
            next.trigger_enabled = true;
            next.progress_visible = false;
        }
        WorkerMessage::GeneratingResponse => {
            next.trigger_enabled = false;
        }
        WorkerMessage::ResponseReady(text) => {
            next.trigger_enabled = true;
            next.output = Some(text.clone());
        }
        WorkerMessage::ModelError => {
            next.trigger_enabled = false;
        }
        WorkerMessage::InferenceError => {
            next.trigger_enabled = true;
        }
    }
    next
}

#[cfg(test)]
#[path = "../tests/reducer_tests.rs"]
mod tests;
