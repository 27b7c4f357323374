//! Shared data models for the slide extraction core.
//!
//! This crate provides Serde-serializable types for:
//! - Frames and committed slides
//! - Perceptual hashes and exclusion list entries
//! - Trash manifest entries
//! - Post-processing jobs and their progress
//! - Intranet host mappings used by the streaming proxy

pub mod classification;
pub mod error;
pub mod exclusion;
pub mod frame;
pub mod hash;
pub mod intranet;
pub mod job;
pub mod slide;
pub mod trash;

// Re-export common types
pub use classification::{PromptKind, Verdict};
pub use error::{ModelError, ModelResult};
pub use exclusion::ExclusionEntry;
pub use frame::Frame;
pub use hash::{PerceptualHash, SlideHash, PHASH_HEX_LEN};
pub use intranet::{default_intranet_mappings, IntranetMapping, IntranetMappings, LoadBalanceStrategy};
pub use job::{
    JobError, JobErrorType, JobId, JobProgress, JobStatus, PostProcessJob, ProcessingPhase,
};
pub use slide::{slide_title, Slide, SlideId};
pub use trash::{TrashEntry, TrashReason};
