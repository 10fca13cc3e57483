//! Background synchronization workers

pub mod retry_worker;

pub use retry_worker::{RetryWorker, RetryWorkerConfig};
