//! Classification phase: batching, retries and payload-size bisection.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::{BoxFuture, FutureExt};
use slides_ml_client::{BatchClassifier, ErrorKind, MlError};
use slides_models::{JobError, JobErrorType, PostProcessJob, Verdict};
use slides_storage::SlideStore;
use tokio::sync::watch;

use crate::logging::JobLogger;
use crate::retry::RetryConfig;

const SINGLE_IMAGE_TOO_LARGE: &str = "Payload too large even for single image";

/// Where each file of a batch ended up.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub kept: Vec<String>,
    pub not_slide: Vec<String>,
    pub failed: Vec<String>,
}

impl BatchOutcome {
    fn merge(&mut self, other: BatchOutcome) {
        self.kept.extend(other.kept);
        self.not_slide.extend(other.not_slide);
        self.failed.extend(other.failed);
    }

    /// Files that received a verdict.
    pub fn classified(&self) -> usize {
        self.kept.len() + self.not_slide.len()
    }
}

/// Runs classification for one job's directory.
pub struct ClassificationPhase<'a> {
    pub classifier: &'a dyn BatchClassifier,
    pub store: &'a SlideStore,
    pub dir: &'a Path,
    pub retry: &'a RetryConfig,
    pub resize: Option<(u32, u32)>,
    pub progress: &'a watch::Sender<PostProcessJob>,
    pub logger: &'a JobLogger,
}

impl ClassificationPhase<'_> {
    /// Read, prepare and classify one batch of files.
    pub async fn run_batch(&self, files: &[String]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut names = Vec::with_capacity(files.len());
        let mut images = Vec::with_capacity(files.len());

        for file in files {
            match self.store.read_slide_base64(&self.dir.join(file)).await {
                Ok(image) => {
                    names.push(file.clone());
                    images.push(self.prepare(file, image).await);
                }
                Err(e) => {
                    self.logger.log_warning(&format!("cannot read {}: {}", file, e));
                    self.record_error(file, JobErrorType::Unknown, e.to_string(), 0);
                    outcome.failed.push(file.clone());
                }
            }
        }

        if !names.is_empty() {
            outcome.merge(self.classify(names, images).await);
        }
        outcome
    }

    /// Shrink an image for upload. Falls back to the stored image on failure.
    async fn prepare(&self, file: &str, image: String) -> String {
        let Some((width, height)) = self.resize else {
            return image;
        };

        let original = image.clone();
        let resized = tokio::task::spawn_blocking(move || -> Result<String, String> {
            let bytes = STANDARD.decode(image.as_bytes()).map_err(|e| e.to_string())?;
            let out = slides_media::resize_encoded(&bytes, width, height).map_err(|e| e.to_string())?;
            Ok(STANDARD.encode(out))
        })
        .await;

        match resized {
            Ok(Ok(image)) => image,
            Ok(Err(e)) => {
                self.logger
                    .log_warning(&format!("resize failed for {}, sending original: {}", file, e));
                original
            }
            Err(e) => {
                self.logger
                    .log_warning(&format!("resize task failed for {}, sending original: {}", file, e));
                original
            }
        }
    }

    /// Classify readable images, retrying and bisecting as the error requires.
    fn classify(&self, names: Vec<String>, images: Vec<String>) -> BoxFuture<'_, BatchOutcome> {
        async move {
            let mut outcome = BatchOutcome::default();
            let mut attempt = 0u32;

            loop {
                self.set_retrying(names.len());
                let result = self.classifier.classify_batch(&images).await;
                self.set_retrying(0);

                let err = match result {
                    Ok(verdicts) => {
                        for (i, name) in names.into_iter().enumerate() {
                            // A missing key keeps the file.
                            match verdicts.get(&format!("image_{}", i)).copied().unwrap_or(Verdict::Slide) {
                                Verdict::Slide => outcome.kept.push(name),
                                Verdict::NotSlide => outcome.not_slide.push(name),
                            }
                        }
                        return outcome;
                    }
                    Err(e) => e,
                };

                let kind = err.kind();
                if kind == ErrorKind::PayloadTooLarge {
                    return self.bisect(names, images).await;
                }

                attempt += 1;
                if let Some(delay) = self.retry.delay_for(kind, attempt) {
                    self.logger.log_warning(&format!(
                        "batch of {} failed ({}), retry {}/{} in {:?}",
                        names.len(),
                        err,
                        attempt,
                        self.retry.max_retries,
                        delay
                    ));
                    self.set_retrying(names.len());
                    tokio::time::sleep(delay).await;
                    continue;
                }

                self.fail_all(&names, &err, attempt - 1);
                outcome.failed = names;
                return outcome;
            }
        }
        .boxed()
    }

    async fn bisect(&self, mut names: Vec<String>, mut images: Vec<String>) -> BatchOutcome {
        if names.len() <= 1 {
            let mut outcome = BatchOutcome::default();
            for name in names {
                self.logger.log_warning(&format!("{}: {}", name, SINGLE_IMAGE_TOO_LARGE));
                self.record_error(&name, JobErrorType::PayloadTooLarge, SINGLE_IMAGE_TOO_LARGE.to_string(), 0);
                outcome.failed.push(name);
            }
            return outcome;
        }

        let mid = names.len().div_ceil(2);
        let tail_names = names.split_off(mid);
        let tail_images = images.split_off(mid);
        self.logger.log_progress(&format!(
            "payload too large, splitting batch into {} + {}",
            names.len(),
            tail_names.len()
        ));

        let mut outcome = self.classify(names, images).await;
        outcome.merge(self.classify(tail_names, tail_images).await);
        outcome
    }

    fn fail_all(&self, names: &[String], err: &MlError, retry_count: u32) {
        self.logger
            .log_error(&format!("batch of {} failed: {}", names.len(), err));
        let error_type = err.kind().as_job_error_type();
        for name in names {
            self.record_error(name, error_type, err.to_string(), retry_count);
        }
    }

    fn record_error(&self, filename: &str, error_type: JobErrorType, message: String, retry_count: u32) {
        self.progress.send_modify(|job| {
            job.errors.push(JobError {
                filename: filename.to_string(),
                error_type,
                message,
                retry_count,
            })
        });
    }

    fn set_retrying(&self, count: usize) {
        self.progress.send_if_modified(|job| {
            let changed = job.progress.retrying != count;
            job.progress.retrying = count;
            changed
        });
    }
}
