//! In-memory FIFO queue of post-processing jobs.

use std::sync::RwLock;

use serde::Serialize;
use slides_models::{JobId, JobStatus, PostProcessJob};
use tokio::sync::{watch, Notify};
use tracing::info;

/// Job totals by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    /// Currently processing
    pub active: usize,
    pub queued: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Holds every known job in submission order.
///
/// Observers subscribe to receive each snapshot of the job that changed.
pub struct JobQueue {
    jobs: RwLock<Vec<PostProcessJob>>,
    notify: Notify,
    updates: watch::Sender<Option<PostProcessJob>>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        let (updates, _) = watch::channel(None);
        Self {
            jobs: RwLock::new(Vec::new()),
            notify: Notify::new(),
            updates,
        }
    }

    /// Queue a job for a session.
    ///
    /// If the session already has a queued or processing job, that job's ID
    /// is returned and nothing is added.
    pub fn add_job(&self, task_id: &str, output_path: &str, image_files: Vec<String>) -> JobId {
        let job = {
            let mut jobs = self.jobs.write().unwrap();
            if let Some(existing) = jobs
                .iter()
                .find(|j| j.task_id == task_id && j.status.is_active())
            {
                info!(task_id, job_id = %existing.id, "Job already pending for task, skipping");
                return existing.id.clone();
            }

            let job = PostProcessJob::new(task_id, output_path, image_files);
            jobs.push(job.clone());
            job
        };

        info!(
            task_id,
            job_id = %job.id,
            files = job.image_files.len(),
            "Queued post-processing job"
        );
        let id = job.id.clone();
        self.updates.send_replace(Some(job));
        self.notify.notify_one();
        id
    }

    /// Forget a job. Returns whether it existed.
    pub fn remove_job(&self, id: &JobId) -> bool {
        let mut jobs = self.jobs.write().unwrap();
        let before = jobs.len();
        jobs.retain(|j| &j.id != id);
        jobs.len() != before
    }

    /// Drop every terminal job. Returns how many were removed.
    pub fn clear_completed(&self) -> usize {
        let mut jobs = self.jobs.write().unwrap();
        let before = jobs.len();
        jobs.retain(|j| !j.status.is_terminal());
        before - jobs.len()
    }

    pub fn job(&self, id: &JobId) -> Option<PostProcessJob> {
        self.jobs.read().unwrap().iter().find(|j| &j.id == id).cloned()
    }

    /// First job submitted for a session.
    pub fn job_by_task(&self, task_id: &str) -> Option<PostProcessJob> {
        self.jobs
            .read()
            .unwrap()
            .iter()
            .find(|j| j.task_id == task_id)
            .cloned()
    }

    /// Snapshot of all jobs in submission order.
    pub fn jobs(&self) -> Vec<PostProcessJob> {
        self.jobs.read().unwrap().clone()
    }

    pub fn counts(&self) -> JobCounts {
        self.jobs
            .read()
            .unwrap()
            .iter()
            .fold(JobCounts::default(), |mut counts, job| {
                match job.status {
                    JobStatus::Processing => counts.active += 1,
                    JobStatus::Queued => counts.queued += 1,
                    JobStatus::Completed => counts.completed += 1,
                    JobStatus::Failed => counts.failed += 1,
                }
                counts
            })
    }

    /// Receive every job snapshot as it changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<PostProcessJob>> {
        self.updates.subscribe()
    }

    /// Oldest queued job.
    pub(crate) fn next_queued(&self) -> Option<PostProcessJob> {
        self.jobs
            .read()
            .unwrap()
            .iter()
            .find(|j| j.status == JobStatus::Queued)
            .cloned()
    }

    /// Store a new snapshot of a job. Removed jobs stay removed.
    pub(crate) fn update(&self, job: PostProcessJob) {
        {
            let mut jobs = self.jobs.write().unwrap();
            match jobs.iter_mut().find(|j| j.id == job.id) {
                // terminal jobs are immutable
                Some(slot) if !slot.status.is_terminal() => *slot = job.clone(),
                _ => return,
            }
        }
        self.updates.send_replace(Some(job));
    }

    /// Resolves once a job has been added since the last wake-up.
    pub(crate) async fn job_added(&self) {
        self.notify.notified().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("Slide {}.png", i)).collect()
    }

    #[test]
    fn test_add_job_dedupes_pending_task() {
        let queue = JobQueue::new();
        let first = queue.add_job("task-1", "/out/a", files(3));
        let again = queue.add_job("task-1", "/out/a", files(5));

        assert_eq!(first, again);
        assert_eq!(queue.jobs().len(), 1);
        assert_eq!(queue.job(&first).unwrap().image_files.len(), 3);
    }

    #[test]
    fn test_finished_task_can_be_queued_again() {
        let queue = JobQueue::new();
        let first = queue.add_job("task-1", "/out/a", files(1));

        let mut job = queue.job(&first).unwrap();
        job.start();
        job.finish(JobStatus::Completed);
        queue.update(job);

        let second = queue.add_job("task-1", "/out/a", files(1));
        assert_ne!(first, second);
        assert_eq!(queue.job_by_task("task-1").unwrap().id, first);
    }

    #[test]
    fn test_fifo_order_and_counts() {
        let queue = JobQueue::new();
        let a = queue.add_job("a", "/out/a", files(1));
        let b = queue.add_job("b", "/out/b", files(1));

        assert_eq!(queue.next_queued().unwrap().id, a);

        let mut job = queue.job(&a).unwrap();
        job.start();
        queue.update(job);
        assert_eq!(queue.next_queued().unwrap().id, b);

        let counts = queue.counts();
        assert_eq!(counts.active, 1);
        assert_eq!(counts.queued, 1);
    }

    #[test]
    fn test_terminal_snapshot_is_not_overwritten() {
        let queue = JobQueue::new();
        let id = queue.add_job("a", "/out/a", files(1));

        let mut job = queue.job(&id).unwrap();
        job.start();
        job.finish(JobStatus::Failed);
        queue.update(job.clone());

        job.status = JobStatus::Processing;
        queue.update(job);
        assert_eq!(queue.job(&id).unwrap().status, JobStatus::Failed);
    }

    #[test]
    fn test_clear_completed_keeps_pending() {
        let queue = JobQueue::new();
        let done = queue.add_job("a", "/out/a", files(1));
        queue.add_job("b", "/out/b", files(1));

        let mut job = queue.job(&done).unwrap();
        job.start();
        job.finish(JobStatus::Completed);
        queue.update(job);

        assert_eq!(queue.clear_completed(), 1);
        assert!(queue.job(&done).is_none());
        assert_eq!(queue.counts().queued, 1);
    }

    #[test]
    fn test_remove_job() {
        let queue = JobQueue::new();
        let id = queue.add_job("a", "/out/a", files(1));
        assert!(queue.remove_job(&id));
        assert!(!queue.remove_job(&id));
        assert!(queue.next_queued().is_none());
    }

    #[test]
    fn test_subscribers_see_new_jobs() {
        let queue = JobQueue::new();
        let mut rx = queue.subscribe();
        let id = queue.add_job("a", "/out/a", files(2));

        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone().unwrap();
        assert_eq!(seen.id, id);
    }
}
