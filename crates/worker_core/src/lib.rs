//! Worker side of the on-device model protocol: host seam, simulated host,
//! chunk streaming and the status-emitting inference worker.

pub mod host;
pub mod simulated;
pub mod streaming;
pub mod worker;

pub use host::{probe_all, HostError, ModelHost, ModelSession, ProgressMonitor, SessionOptions};
pub use simulated::{HostProfile, SimulatedHost};
pub use streaming::{CancelHandle, ChunkStream, DeltaNormalizer, StreamEvent};
pub use worker::{InferenceWorker, ShutdownHandle, WorkerSettings};
