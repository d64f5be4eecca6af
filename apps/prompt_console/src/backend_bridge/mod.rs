//! Bridge between the controller's channels and the inference worker thread.

pub mod runtime;
