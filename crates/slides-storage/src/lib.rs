//! Local slide storage.
//!
//! This crate provides:
//! - Slide writes into per-session folders
//! - Base64 reads for the classification client
//! - A recoverable trash under `<root>/.trash` with a JSONL manifest

pub mod error;
pub mod store;
pub mod trash;

pub use error::{StorageError, StorageResult};
pub use store::{SessionWriter, SlideStore, StoreConfig, MANIFEST_FILE, TRASH_DIR};
pub use trash::RestoreReport;
