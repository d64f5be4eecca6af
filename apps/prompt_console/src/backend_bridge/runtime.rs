//! Runtime bridge: spawns the inference worker on its own thread and hands
//! the controller both ends of the message channels.

use std::{
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::Context;
use crossbeam_channel::{bounded, Receiver, Sender};
use worker_core::{InferenceWorker, ModelHost, ShutdownHandle, SimulatedHost};

use crate::config::Settings;

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct BackendBridge {
    request_tx: Sender<String>,
    status_rx: Receiver<String>,
    shutdown: ShutdownHandle,
    worker: Option<JoinHandle<()>>,
}

impl BackendBridge {
    pub fn request_sender(&self) -> Sender<String> {
        self.request_tx.clone()
    }

    pub fn status_receiver(&self) -> &Receiver<String> {
        &self.status_rx
    }
}

impl Drop for BackendBridge {
    fn drop(&mut self) {
        self.shutdown.shutdown();
        let Some(worker) = self.worker.take() else {
            return;
        };
        // keep draining so a worker blocked on a full status queue can exit
        while !worker.is_finished() {
            while self.status_rx.try_recv().is_ok() {}
            thread::sleep(JOIN_POLL_INTERVAL);
        }
        if worker.join().is_err() {
            tracing::error!("inference worker thread panicked");
        }
    }
}

pub fn launch(settings: &Settings) -> anyhow::Result<BackendBridge> {
    launch_with_host(settings, SimulatedHost::new(settings.host_profile()))
}

pub fn launch_with_host<H>(settings: &Settings, host: H) -> anyhow::Result<BackendBridge>
where
    H: ModelHost + 'static,
{
    let (request_tx, request_rx) = bounded::<String>(settings.request_queue_capacity.max(1));
    let (status_tx, status_rx) = bounded::<String>(settings.status_queue_capacity.max(1));

    let worker = InferenceWorker::new(host, settings.worker_settings(), status_tx);
    let shutdown = worker.shutdown_handle();

    let handle = thread::Builder::new()
        .name("inference-worker".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    // dropping the worker closes the status channel, which the
                    // controller treats as a startup failure
                    tracing::error!("failed to build worker runtime: {err}");
                    return;
                }
            };
            tracing::info!("inference worker starting");
            if let Err(err) = runtime.block_on(worker.run(request_rx)) {
                tracing::error!("inference worker failed: {err:#}");
            }
        })
        .context("failed to spawn inference worker thread")?;

    Ok(BackendBridge {
        request_tx,
        status_rx,
        shutdown,
        worker: Some(handle),
    })
}

#[cfg(test)]
#[path = "../tests/runtime_tests.rs"]
mod tests;
