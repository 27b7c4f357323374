//! Post-processing orchestrator.
//!
//! Runs the hash step and the three phases over one job's files:
//! 1. Duplicates: near-identical to an earlier kept slide
//! 2. Exclusion list: matches a configured reference image
//! 3. AI classification: remote verdict on whether a file is a slide
//!
//! Discarded files go to the trash with the matching reason. Job state lives
//! in a `watch` channel so observers see every progress step.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use slides_media::SimilarityPool;
use slides_ml_client::BatchClassifier;
use slides_models::{
    JobError, JobErrorType, JobStatus, PostProcessJob, ProcessingPhase, SlideHash, TrashReason,
};
use slides_storage::SlideStore;
use tokio::sync::watch;
use tracing::Instrument;

use crate::classify::{BatchOutcome, ClassificationPhase};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::matching::{find_duplicates, find_exclusions};

/// Files hashed concurrently during the hash step.
const HASH_CONCURRENCY: usize = 4;

/// Owns the collaborators a job needs.
pub struct Orchestrator {
    store: SlideStore,
    pool: SimilarityPool,
    classifier: Arc<dyn BatchClassifier>,
    config: WorkerConfig,
}

impl Orchestrator {
    pub fn new(
        store: SlideStore,
        pool: SimilarityPool,
        classifier: Arc<dyn BatchClassifier>,
        config: WorkerConfig,
    ) -> WorkerResult<Self> {
        config.validate().map_err(WorkerError::config_error)?;
        Ok(Self {
            store,
            pool,
            classifier,
            config,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn store(&self) -> &SlideStore {
        &self.store
    }

    /// Run the job held by `progress` to a terminal status.
    pub async fn process(&self, progress: &watch::Sender<PostProcessJob>) {
        let (id, task_id) = {
            let job = progress.borrow();
            (job.id.clone(), job.task_id.clone())
        };
        let logger = JobLogger::new(&id, &task_id);
        let span = logger.create_span();

        async {
            progress.send_modify(|job| job.start());
            logger.log_start(progress.borrow().image_files.len());

            match self.run_phases(progress, &logger).await {
                Ok(outcome) => {
                    let status = if outcome.classified() == 0 && !outcome.failed.is_empty() {
                        JobStatus::Failed
                    } else {
                        JobStatus::Completed
                    };
                    progress.send_modify(|job| job.finish(status));

                    let p = progress.borrow().progress.clone();
                    logger.log_completion(&format!(
                        "status={} duplicates={} excluded={} ai_filtered={} kept={} failed={}",
                        status,
                        p.duplicates_removed,
                        p.excluded_removed,
                        p.ai_filtered,
                        outcome.kept.len(),
                        outcome.failed.len()
                    ));
                }
                Err(e) => {
                    logger.log_error(&e.to_string());
                    progress.send_modify(|job| {
                        job.errors.push(JobError {
                            filename: "*".to_string(),
                            error_type: JobErrorType::Unknown,
                            message: e.to_string(),
                            retry_count: 0,
                        });
                        job.finish(JobStatus::Failed);
                    });
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_phases(
        &self,
        progress: &watch::Sender<PostProcessJob>,
        logger: &JobLogger,
    ) -> WorkerResult<BatchOutcome> {
        let (dir, mut remaining) = {
            let job = progress.borrow();
            (PathBuf::from(&job.output_path), job.image_files.clone())
        };
        if !tokio::fs::try_exists(&dir).await? {
            return Err(WorkerError::job_failed(format!(
                "output directory {} does not exist",
                dir.display()
            )));
        }

        let needs_hashes = self.config.enable_duplicate_removal || self.config.enable_exclusion_list;
        let hashes = if needs_hashes && !remaining.is_empty() {
            self.hash_files(&dir, &remaining, progress, logger).await
        } else {
            Vec::new()
        };

        // Phase 1
        if self.config.enable_duplicate_removal {
            enter_phase(progress, logger, ProcessingPhase::Duplicates, hashes.len());
            let duplicates = find_duplicates(&hashes, self.config.phash_threshold);
            for (i, dup) in duplicates.iter().enumerate() {
                let details = Some(dup.duplicate_of.clone());
                if self
                    .trash(&dir, &dup.filename, TrashReason::Duplicate, details, progress, logger)
                    .await
                {
                    remaining.retain(|f| f != &dup.filename);
                    progress.send_modify(|job| job.progress.duplicates_removed += 1);
                }
                set_index(progress, i + 1);
            }
        } else {
            skip_phase(progress, logger, ProcessingPhase::Duplicates);
        }

        // Phase 2
        let exclusions: Vec<_> = self.config.active_exclusions().collect();
        if self.config.enable_exclusion_list && !exclusions.is_empty() {
            let survivors: Vec<&SlideHash> = hashes
                .iter()
                .filter(|h| remaining.contains(&h.filename))
                .collect();
            enter_phase(progress, logger, ProcessingPhase::Exclusion, survivors.len());

            let matches = find_exclusions(survivors, &exclusions, self.config.phash_threshold);
            for (i, hit) in matches.iter().enumerate() {
                let details = Some(hit.entry_name.clone());
                if self
                    .trash(&dir, &hit.filename, TrashReason::Exclusion, details, progress, logger)
                    .await
                {
                    remaining.retain(|f| f != &hit.filename);
                    progress.send_modify(|job| job.progress.excluded_removed += 1);
                }
                set_index(progress, i + 1);
            }
        } else {
            skip_phase(progress, logger, ProcessingPhase::Exclusion);
        }

        // Phase 3
        let mut outcome = BatchOutcome::default();
        if !self.config.enable_ai_filtering {
            skip_phase(progress, logger, ProcessingPhase::Classification);
            return Ok(outcome);
        }

        enter_phase(progress, logger, ProcessingPhase::Classification, remaining.len());
        let phase = ClassificationPhase {
            classifier: self.classifier.as_ref(),
            store: &self.store,
            dir: &dir,
            retry: &self.config.retry,
            resize: self.config.ai_resize_target(),
            progress,
            logger,
        };

        let mut done = 0;
        for batch in remaining.chunks(self.config.batch_size) {
            let result = phase.run_batch(batch).await;

            for file in &result.not_slide {
                if self
                    .trash(&dir, file, TrashReason::AiFiltered, None, progress, logger)
                    .await
                {
                    progress.send_modify(|job| job.progress.ai_filtered += 1);
                }
            }

            done += batch.len();
            outcome.kept.extend(result.kept);
            outcome.not_slide.extend(result.not_slide);
            outcome.failed.extend(result.failed);

            let (completed, failed) = (outcome.classified(), outcome.failed.len());
            progress.send_modify(|job| {
                job.progress.current_index = done;
                job.progress.completed = completed;
                job.progress.failed = failed;
            });
        }

        Ok(outcome)
    }

    /// Compute a hash for every file, in file order. Failures are recorded, not raised.
    pub async fn hash_files(
        &self,
        dir: &Path,
        files: &[String],
        progress: &watch::Sender<PostProcessJob>,
        logger: &JobLogger,
    ) -> Vec<SlideHash> {
        enter_phase(progress, logger, ProcessingPhase::Hashing, files.len());

        let mut results = stream::iter(files.iter().cloned())
            .map(|file| async move {
                let path = dir.join(&file);
                let bytes = match tokio::fs::read(&path).await {
                    Ok(bytes) => bytes,
                    Err(e) => return SlideHash::failed(file, e.to_string()),
                };
                match self.pool.hash_encoded(bytes).await {
                    Ok(hash) => SlideHash::ok(file, hash),
                    Err(e) => SlideHash::failed(file, e.to_string()),
                }
            })
            .buffered(HASH_CONCURRENCY);

        let mut hashes = Vec::with_capacity(files.len());
        while let Some(hash) = results.next().await {
            if let Some(err) = &hash.error {
                logger.log_warning(&format!("cannot hash {}: {}", hash.filename, err));
            }
            hashes.push(hash);
            set_index(progress, hashes.len());
        }
        hashes
    }

    /// Move `file` to the trash. A file that cannot be moved stays in the
    /// working set and the failure is recorded on the job.
    async fn trash(
        &self,
        dir: &Path,
        file: &str,
        reason: TrashReason,
        details: Option<String>,
        progress: &watch::Sender<PostProcessJob>,
        logger: &JobLogger,
    ) -> bool {
        match self.store.move_to_trash(&dir.join(file), reason, details).await {
            Ok(_) => true,
            Err(e) => {
                let message = format!("cannot trash ({}): {}", reason.as_str(), e);
                logger.log_warning(&format!("{}: {}", file, message));
                progress.send_modify(|job| {
                    job.errors.push(JobError {
                        filename: file.to_string(),
                        error_type: JobErrorType::Unknown,
                        message,
                        retry_count: 0,
                    })
                });
                false
            }
        }
    }
}

fn enter_phase(
    progress: &watch::Sender<PostProcessJob>,
    logger: &JobLogger,
    phase: ProcessingPhase,
    total: usize,
) {
    logger.log_phase(phase, total);
    progress.send_modify(|job| {
        job.progress.phase = phase;
        job.progress.current_index = 0;
        job.progress.total_count = total;
    });
}

fn skip_phase(progress: &watch::Sender<PostProcessJob>, logger: &JobLogger, phase: ProcessingPhase) {
    logger.log_phase_skipped(phase);
    progress.send_modify(|job| match phase {
        ProcessingPhase::Duplicates => job.progress.duplicates_skipped = true,
        ProcessingPhase::Exclusion => job.progress.exclusion_skipped = true,
        ProcessingPhase::Classification => job.progress.classification_skipped = true,
        _ => {}
    });
}

fn set_index(progress: &watch::Sender<PostProcessJob>, index: usize) {
    progress.send_modify(|job| job.progress.current_index = index);
}
