//! Frame similarity, perceptual hashing and slide-change detection.
//!
//! This crate provides:
//! - Global-window SSIM with optional downsampling
//! - 256-bit DCT perceptual hashes and Hamming distance
//! - A worker pool that keeps similarity work off the async runtime
//! - The frame-change detector and its playback-speed aware ticker

pub mod detector;
pub mod encode;
pub mod error;
pub mod pool;
pub mod similarity;
pub mod threshold;
pub mod ticker;

pub use detector::{
    is_valid_frame, DetectorConfig, DetectorCore, DetectorEvent, DetectorState, FrameSource,
    SlideDetector, SlideSink, TickAction,
};
pub use encode::{decode_image, encode_png, image_to_frame, resize_encoded};
pub use error::{MediaError, MediaResult};
pub use pool::{FrameComparator, InlineComparator, SimilarityPool, SimilarityRequest};
pub use similarity::{
    hamming, perceptual_hash, perceptual_hash_encoded, perceptual_hash_frame, ssim, ssim_changed,
    SsimConfig,
};
pub use threshold::{validate_threshold, SsimPreset};
pub use ticker::{AdaptiveTicker, IntervalTable, MIN_INTERVAL};
