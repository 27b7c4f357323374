//! Similarity worker pool.
//!
//! SSIM and hashing are CPU bound, so callers on the async runtime hand
//! work to this pool over a bounded channel and await the answer on a
//! oneshot. The dispatcher task runs each request on the rayon pool.

use std::sync::Arc;

use async_trait::async_trait;
use slides_models::{Frame, PerceptualHash};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::similarity::{perceptual_hash_encoded, perceptual_hash_frame, ssim_changed, SsimConfig};

/// Pending requests before `send` waits.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// A unit of work for the pool.
pub enum SimilarityRequest {
    /// Is `b` different content from `a`?
    Compare {
        a: Arc<Frame>,
        b: Arc<Frame>,
        config: SsimConfig,
        reply: oneshot::Sender<MediaResult<bool>>,
    },
    /// Hash a decoded frame
    HashFrame {
        frame: Arc<Frame>,
        reply: oneshot::Sender<MediaResult<PerceptualHash>>,
    },
    /// Hash PNG/JPEG bytes
    HashEncoded {
        bytes: Vec<u8>,
        reply: oneshot::Sender<MediaResult<PerceptualHash>>,
    },
}

impl SimilarityRequest {
    fn kind(&self) -> &'static str {
        match self {
            SimilarityRequest::Compare { .. } => "compare",
            SimilarityRequest::HashFrame { .. } => "hash_frame",
            SimilarityRequest::HashEncoded { .. } => "hash_encoded",
        }
    }

    fn run(self) {
        // A dropped receiver means the caller gave up; nothing to report.
        match self {
            SimilarityRequest::Compare { a, b, config, reply } => {
                let _ = reply.send(ssim_changed(&a, &b, &config));
            }
            SimilarityRequest::HashFrame { frame, reply } => {
                let _ = reply.send(perceptual_hash_frame(&frame));
            }
            SimilarityRequest::HashEncoded { bytes, reply } => {
                let _ = reply.send(perceptual_hash_encoded(&bytes));
            }
        }
    }
}

/// Handle to the similarity workers. Cheap to clone.
#[derive(Clone)]
pub struct SimilarityPool {
    tx: mpsc::Sender<SimilarityRequest>,
}

impl SimilarityPool {
    /// Start the dispatcher. Must be called inside a tokio runtime.
    pub fn new(queue_depth: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<SimilarityRequest>(queue_depth.max(1));

        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                debug!(kind = request.kind(), "Dispatching similarity request");
                rayon::spawn(move || request.run());
            }
            debug!("Similarity pool dispatcher stopped");
        });

        Self { tx }
    }

    async fn submit<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<MediaResult<T>>) -> SimilarityRequest,
    ) -> MediaResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| MediaError::PoolClosed)?;
        rx.await.map_err(|_| {
            warn!("Similarity worker dropped its reply");
            MediaError::PoolClosed
        })?
    }

    /// SSIM change test between two frames.
    pub async fn compare(&self, a: Arc<Frame>, b: Arc<Frame>, config: SsimConfig) -> MediaResult<bool> {
        self.submit(|reply| SimilarityRequest::Compare { a, b, config, reply })
            .await
    }

    pub async fn hash_frame(&self, frame: Arc<Frame>) -> MediaResult<PerceptualHash> {
        self.submit(|reply| SimilarityRequest::HashFrame { frame, reply })
            .await
    }

    pub async fn hash_encoded(&self, bytes: Vec<u8>) -> MediaResult<PerceptualHash> {
        self.submit(|reply| SimilarityRequest::HashEncoded { bytes, reply })
            .await
    }
}

impl Default for SimilarityPool {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_DEPTH)
    }
}

/// Decides whether two frames show different content.
#[async_trait]
pub trait FrameComparator: Send + Sync {
    async fn changed(&self, a: &Arc<Frame>, b: &Arc<Frame>, config: &SsimConfig) -> MediaResult<bool>;
}

#[async_trait]
impl FrameComparator for SimilarityPool {
    async fn changed(&self, a: &Arc<Frame>, b: &Arc<Frame>, config: &SsimConfig) -> MediaResult<bool> {
        self.compare(Arc::clone(a), Arc::clone(b), config.clone()).await
    }
}

/// Scores on the calling task. Suitable for small frames and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineComparator;

#[async_trait]
impl FrameComparator for InlineComparator {
    async fn changed(&self, a: &Arc<Frame>, b: &Arc<Frame>, config: &SsimConfig) -> MediaResult<bool> {
        ssim_changed(a, b, config)
    }
}
