//! Seam between the worker and the host-provided on-device model API.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use shared::domain::{Availability, Capability, DownloadProgress};
use thiserror::Error;

use crate::streaming::ChunkStream;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("{0} is unavailable on this device")]
    Unavailable(Capability),
    #[error("model preparation failed: {0}")]
    Preparation(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("generation was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub system_prompt: Option<String>,
    pub expected_language: Option<String>,
}

/// Download progress callback handed to [`ModelHost::create`].
#[derive(Clone)]
pub struct ProgressMonitor {
    callback: Arc<dyn Fn(DownloadProgress) + Send + Sync>,
}

impl ProgressMonitor {
    pub fn new(callback: impl Fn(DownloadProgress) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, progress: DownloadProgress) {
        (self.callback)(progress);
    }
}

impl fmt::Debug for ProgressMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressMonitor").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ModelHost: Send + Sync {
    async fn availability(&self, capability: Capability) -> Result<Availability, HostError>;

    /// Creates a session, downloading the model first when needed. Download
    /// progress is reported through `monitor`.
    async fn create(
        &self,
        capability: Capability,
        options: &SessionOptions,
        monitor: ProgressMonitor,
    ) -> Result<Box<dyn ModelSession>, HostError>;
}

#[async_trait]
pub trait ModelSession: Send + Sync {
    async fn prompt(&self, prompt: &str) -> Result<String, HostError>;

    fn prompt_streaming(&self, prompt: &str) -> ChunkStream;

    /// Tokens `text` would take from the session's input quota.
    async fn measure_input_usage(&self, text: &str) -> Result<u64, HostError>;
}

#[async_trait]
impl<H: ModelHost + ?Sized> ModelHost for Arc<H> {
    async fn availability(&self, capability: Capability) -> Result<Availability, HostError> {
        (**self).availability(capability).await
    }

    async fn create(
        &self,
        capability: Capability,
        options: &SessionOptions,
        monitor: ProgressMonitor,
    ) -> Result<Box<dyn ModelSession>, HostError> {
        (**self).create(capability, options, monitor).await
    }
}

/// Queries every capability the host may expose, in a stable order.
pub async fn probe_all(
    host: &dyn ModelHost,
) -> Vec<(Capability, Result<Availability, HostError>)> {
    let mut results = Vec::with_capacity(Capability::ALL.len());
    for capability in Capability::ALL {
        let outcome = host.availability(capability).await;
        match &outcome {
            Ok(availability) => {
                tracing::debug!(%capability, %availability, "probed capability")
            }
            Err(err) => tracing::warn!(%capability, "availability probe failed: {err}"),
        }
        results.push((capability, outcome));
    }
    results
}
