//! End-to-end post-processing over a real session folder.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use slides_media::SimilarityPool;
use slides_ml_client::{BatchClassifier, MlResult};
use slides_models::{JobStatus, TrashReason, Verdict};
use slides_storage::SlideStore;
use slides_worker::{JobExecutor, JobQueue, Orchestrator, WorkerConfig};

/// Marks a fixed set of batch positions as not slides.
struct RejectPositions(Vec<usize>);

#[async_trait]
impl BatchClassifier for RejectPositions {
    async fn classify_batch(&self, images: &[String]) -> MlResult<HashMap<String, Verdict>> {
        Ok((0..images.len())
            .map(|i| {
                let verdict = if self.0.contains(&i) {
                    Verdict::NotSlide
                } else {
                    Verdict::Slide
                };
                (format!("image_{}", i), verdict)
            })
            .collect())
    }
}

fn write_pattern(path: &Path, seed: u32) {
    let img = RgbaImage::from_fn(64, 48, |x, y| {
        let mut v = seed
            .wrapping_mul(0x9E37_79B1)
            ^ (x / 8).wrapping_mul(0x85EB_CA6B)
            ^ (y / 8).wrapping_mul(0xC2B2_AE35);
        v ^= v >> 15;
        v = v.wrapping_mul(0x2C1B_3C6D);
        v ^= v >> 12;
        let v = (v & 0xff) as u8;
        Rgba([v, v, v, 255])
    });
    img.save(path).unwrap();
}

#[tokio::test]
async fn test_session_is_deduplicated_filtered_and_restorable() {
    let root = tempfile::tempdir().unwrap();
    let store = SlideStore::new(root.path());
    let dir = root.path().join("lecture-1");
    std::fs::create_dir_all(&dir).unwrap();

    write_pattern(&dir.join("Slide 1.png"), 11);
    std::fs::copy(dir.join("Slide 1.png"), dir.join("Slide 2.png")).unwrap();
    write_pattern(&dir.join("Slide 3.png"), 33);

    let config = WorkerConfig {
        enable_exclusion_list: false,
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(
        store.clone(),
        SimilarityPool::new(4),
        Arc::new(RejectPositions(vec![1])),
        config,
    )
    .unwrap();
    let executor = JobExecutor::new(Arc::new(JobQueue::new()), Arc::new(orchestrator));

    let files = store.list_slide_files(&dir).await.unwrap();
    assert_eq!(files.len(), 3);
    let id = executor
        .queue()
        .add_job("lecture-1", &dir.display().to_string(), files);
    executor.run_until_idle().await;

    let job = executor.queue().job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress.duplicates_removed, 1);
    assert_eq!(job.progress.ai_filtered, 1);
    assert!(job.progress.exclusion_skipped);

    assert!(dir.join("Slide 1.png").exists());
    assert!(!dir.join("Slide 2.png").exists());
    assert!(!dir.join("Slide 3.png").exists());

    let entries = store.list_trash_manifest().await.unwrap();
    let reasons: HashMap<&str, TrashReason> = entries
        .iter()
        .map(|e| (e.filename.as_str(), e.reason))
        .collect();
    assert_eq!(reasons["Slide 2.png"], TrashReason::Duplicate);
    assert_eq!(reasons["Slide 3.png"], TrashReason::AiFiltered);

    let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
    let report = store.restore_from_trash(&ids).await.unwrap();
    assert_eq!(report.restored.len(), 2);
    assert!(dir.join("Slide 2.png").exists());
    assert!(dir.join("Slide 3.png").exists());
    assert!(store.list_trash_manifest().await.unwrap().is_empty());
}
