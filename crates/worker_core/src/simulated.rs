//! Deterministic stand-in for the host model API, driven by a [`HostProfile`].

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use shared::domain::{Availability, Capability, DownloadProgress};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::{
    host::{HostError, ModelHost, ModelSession, ProgressMonitor, SessionOptions},
    streaming::ChunkStream,
};

const DOWNLOAD_STEP_BYTES: u64 = 4 * 1024 * 1024;
const STREAM_BUFFER: usize = 8;

#[derive(Debug, Clone)]
pub struct HostProfile {
    /// Capabilities missing from the map report `unavailable`.
    pub availability: HashMap<Capability, Availability>,
    pub download_steps: u32,
    pub step_delay: Duration,
    pub chunk_delay: Duration,
    pub preparation_failure: Option<String>,
    /// Prompts containing this marker fail with an inference error.
    pub inference_failure_marker: Option<String>,
}

impl Default for HostProfile {
    fn default() -> Self {
        let availability = HashMap::from([
            (Capability::LanguageModel, Availability::Downloadable),
            (Capability::Summarizer, Availability::Available),
            (Capability::Writer, Availability::Downloadable),
            (Capability::Rewriter, Availability::Downloadable),
            (Capability::LanguageDetector, Availability::Available),
        ]);
        Self {
            availability,
            download_steps: 10,
            step_delay: Duration::from_millis(40),
            chunk_delay: Duration::from_millis(20),
            preparation_failure: None,
            inference_failure_marker: None,
        }
    }
}

impl HostProfile {
    /// Default availability with every delay removed.
    pub fn instant() -> Self {
        Self {
            step_delay: Duration::ZERO,
            chunk_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_availability(mut self, capability: Capability, availability: Availability) -> Self {
        self.availability.insert(capability, availability);
        self
    }

    pub fn with_download_steps(mut self, steps: u32) -> Self {
        self.download_steps = steps;
        self
    }

    pub fn with_preparation_failure(mut self, reason: impl Into<String>) -> Self {
        self.preparation_failure = Some(reason.into());
        self
    }

    pub fn with_inference_failure_marker(mut self, marker: impl Into<String>) -> Self {
        self.inference_failure_marker = Some(marker.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedHost {
    profile: HostProfile,
}

impl SimulatedHost {
    pub fn new(profile: HostProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &HostProfile {
        &self.profile
    }

    async fn download(&self, capability: Capability, monitor: &ProgressMonitor) {
        let steps = u64::from(self.profile.download_steps);
        if steps == 0 {
            return;
        }
        let total = steps * DOWNLOAD_STEP_BYTES;
        info!(%capability, total_bytes = total, "downloading model");
        for step in 1..=steps {
            if !self.profile.step_delay.is_zero() {
                tokio::time::sleep(self.profile.step_delay).await;
            }
            monitor.report(DownloadProgress::new(step * DOWNLOAD_STEP_BYTES, total));
        }
    }
}

#[async_trait]
impl ModelHost for SimulatedHost {
    async fn availability(&self, capability: Capability) -> Result<Availability, HostError> {
        Ok(self
            .profile
            .availability
            .get(&capability)
            .copied()
            .unwrap_or(Availability::Unavailable))
    }

    async fn create(
        &self,
        capability: Capability,
        options: &SessionOptions,
        monitor: ProgressMonitor,
    ) -> Result<Box<dyn ModelSession>, HostError> {
        let availability = self.availability(capability).await?;
        if !availability.is_usable() {
            return Err(HostError::Unavailable(capability));
        }
        if availability.needs_download() {
            self.download(capability, &monitor).await;
        }
        if let Some(reason) = &self.profile.preparation_failure {
            return Err(HostError::Preparation(reason.clone()));
        }

        debug!(
            %capability,
            system_prompt = options.system_prompt.as_deref().unwrap_or_default(),
            language = options.expected_language.as_deref().unwrap_or_default(),
            "simulated session created"
        );
        Ok(Box::new(SimulatedSession {
            chunk_delay: self.profile.chunk_delay,
            failure_marker: self.profile.inference_failure_marker.clone(),
        }))
    }
}

struct SimulatedSession {
    chunk_delay: Duration,
    failure_marker: Option<String>,
}

impl SimulatedSession {
    fn reply(&self, prompt: &str) -> Result<String, HostError> {
        if let Some(marker) = &self.failure_marker {
            if !marker.is_empty() && prompt.contains(marker.as_str()) {
                return Err(HostError::Inference(format!(
                    "prompt rejected by host: contains '{marker}'"
                )));
            }
        }
        Ok(format!("You said: {}", prompt.trim()))
    }
}

/// Words and standalone punctuation marks each count as one token.
fn count_tokens(text: &str) -> u64 {
    text.split_whitespace()
        .map(|word| {
            let marks = word.chars().filter(|c| c.is_ascii_punctuation()).count();
            let letters = word.chars().any(|c| !c.is_ascii_punctuation());
            u64::from(letters) + marks as u64
        })
        .sum()
}

/// Cumulative chunks, one more word each: "You ", "You said: ", ...
fn cumulative_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::with_capacity(text.len());
    for word in text.split_inclusive(' ') {
        current.push_str(word);
        chunks.push(current.clone());
    }
    chunks
}

#[async_trait]
impl ModelSession for SimulatedSession {
    async fn prompt(&self, prompt: &str) -> Result<String, HostError> {
        if !self.chunk_delay.is_zero() {
            tokio::time::sleep(self.chunk_delay).await;
        }
        self.reply(prompt)
    }

    fn prompt_streaming(&self, prompt: &str) -> ChunkStream {
        let text = match self.reply(prompt) {
            Ok(text) => text,
            Err(err) => return ChunkStream::failed(err),
        };

        let chunks = cumulative_chunks(&text);
        let delay = self.chunk_delay;
        let (tx, rx) = mpsc::channel::<Result<String, HostError>>(STREAM_BUFFER);
        tokio::spawn(async move {
            for chunk in chunks {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(Ok(chunk)).await.is_err() {
                    debug!("stream consumer went away; stopping producer");
                    return;
                }
            }
        });
        ChunkStream::new(ReceiverStream::new(rx))
    }

    async fn measure_input_usage(&self, text: &str) -> Result<u64, HostError> {
        Ok(count_tokens(text))
    }
}
