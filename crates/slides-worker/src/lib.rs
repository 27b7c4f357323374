//! Post-processing worker.
//!
//! This crate provides:
//! - Duplicate and exclusion matching over perceptual hashes
//! - Batched AI classification with retry and payload bisection
//! - The orchestrator that runs those phases over a session's slides
//! - An in-memory FIFO job queue and its executor

pub mod classify;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod matching;
pub mod orchestrator;
pub mod queue;
pub mod retry;

pub use classify::{BatchOutcome, ClassificationPhase};
pub use config::{load_exclusion_list, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use matching::{find_duplicates, find_exclusions, DuplicateMatch, ExclusionMatch};
pub use orchestrator::Orchestrator;
pub use queue::{JobCounts, JobQueue};
pub use retry::RetryConfig;
