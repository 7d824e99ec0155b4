//! Resumable downloads with retries and progress reporting.

pub mod engine;
pub mod progress;
pub mod retry;

pub use engine::{DownloadEngine, DownloadOutcome, CHUNK_SIZE};
pub use progress::{NoopReporter, ProgressHandle, ProgressRegistry, ProgressReporter};
pub use retry::RetryPolicy;
