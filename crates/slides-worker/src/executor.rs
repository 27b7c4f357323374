//! Job executor.

use std::sync::Arc;

use slides_models::PostProcessJob;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::orchestrator::Orchestrator;
use crate::queue::JobQueue;

/// Runs queued jobs one at a time, oldest first.
///
/// Shutdown is checked between jobs; a job that has started always runs to
/// a terminal status.
pub struct JobExecutor {
    queue: Arc<JobQueue>,
    orchestrator: Arc<Orchestrator>,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    pub fn new(queue: Arc<JobQueue>, orchestrator: Arc<Orchestrator>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            queue,
            orchestrator,
            shutdown,
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Process jobs until shutdown is signalled.
    pub async fn run(&self) {
        info!("Starting post-processing executor");
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                info!("Shutdown signal received, stopping executor");
                break;
            }

            if let Some(job) = self.queue.next_queued() {
                self.execute(job).await;
                continue;
            }

            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = self.queue.job_added() => {
                    debug!("Job added, waking executor");
                }
            }
        }

        info!("Job executor stopped");
    }

    /// Process every queued job, then return.
    pub async fn run_until_idle(&self) {
        while !self.is_shutting_down() {
            let Some(job) = self.queue.next_queued() else {
                break;
            };
            self.execute(job).await;
        }
    }

    /// Signal shutdown. The flag is stored even when no `run` loop is
    /// subscribed yet.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn execute(&self, job: PostProcessJob) {
        let id = job.id.clone();
        info!(job_id = %id, task_id = %job.task_id, "Executing job");

        let (tx, mut rx) = watch::channel(job);

        // Mirror progress into the queue while the job runs.
        let queue = Arc::clone(&self.queue);
        let mirror = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                queue.update(snapshot);
            }
        });

        self.orchestrator.process(&tx).await;

        let finished = tx.borrow().clone();
        drop(tx);
        let _ = mirror.await;
        self.queue.update(finished);

        info!(job_id = %id, "Job finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::orchestrator::tests::{fixture, ScriptedClassifier};
    use slides_media::SimilarityPool;
    use slides_models::JobStatus;
    use std::time::Duration;

    fn executor(fx: &crate::orchestrator::tests::Fixture, classifier: Arc<ScriptedClassifier>) -> Arc<JobExecutor> {
        let config = WorkerConfig {
            enable_duplicate_removal: false,
            ..Default::default()
        };
        let orchestrator =
            Orchestrator::new(fx.store.clone(), SimilarityPool::new(8), classifier, config).unwrap();
        Arc::new(JobExecutor::new(Arc::new(JobQueue::new()), Arc::new(orchestrator)))
    }

    #[tokio::test]
    async fn test_run_until_idle_processes_in_order() {
        let fx = fixture(&[("a.png", 1), ("b.png", 2)]);
        let classifier = Arc::new(ScriptedClassifier::new(vec![]));
        let executor = executor(&fx, classifier.clone());
        let dir = fx.dir.display().to_string();

        let first = executor.queue().add_job("t1", &dir, vec!["a.png".into(), "b.png".into()]);
        let second = executor.queue().add_job("t2", &dir, vec!["a.png".into()]);

        executor.run_until_idle().await;

        let queue = executor.queue();
        let first = queue.job(&first).unwrap();
        let second = queue.job(&second).unwrap();
        assert_eq!(first.status, JobStatus::Completed);
        assert_eq!(second.status, JobStatus::Completed);
        assert!(first.completed_at <= second.started_at);
        assert_eq!(*classifier.calls.lock().unwrap(), vec![2, 1]);
        assert_eq!(queue.counts().completed, 2);
    }

    #[tokio::test]
    async fn test_run_wakes_on_new_job_and_stops_on_shutdown() {
        let fx = fixture(&[("a.png", 1)]);
        let executor = executor(&fx, Arc::new(ScriptedClassifier::new(vec![])));
        let mut updates = executor.queue().subscribe();

        let runner = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move { executor.run().await })
        };

        let id = executor
            .queue()
            .add_job("t1", &fx.dir.display().to_string(), vec!["a.png".into()]);

        let finished = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                updates.changed().await.unwrap();
                let done = updates
                    .borrow_and_update()
                    .as_ref()
                    .is_some_and(|j| j.id == id && j.status.is_terminal());
                if done {
                    break;
                }
            }
        })
        .await;
        assert!(finished.is_ok());

        executor.shutdown();
        tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_prevents_next_job() {
        let fx = fixture(&[("a.png", 1)]);
        let executor = executor(&fx, Arc::new(ScriptedClassifier::new(vec![])));
        let id = executor
            .queue()
            .add_job("t1", &fx.dir.display().to_string(), vec!["a.png".into()]);

        executor.shutdown();
        assert!(executor.is_shutting_down());
        tokio::time::timeout(Duration::from_secs(5), executor.run())
            .await
            .expect("run returns once shut down");

        assert_eq!(executor.queue().job(&id).unwrap().status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_shutdown_before_run_until_idle_leaves_jobs_queued() {
        let fx = fixture(&[("a.png", 1)]);
        let classifier = Arc::new(ScriptedClassifier::new(vec![]));
        let executor = executor(&fx, classifier.clone());
        let id = executor
            .queue()
            .add_job("t1", &fx.dir.display().to_string(), vec!["a.png".into()]);

        executor.shutdown();
        tokio::time::timeout(Duration::from_secs(5), executor.run_until_idle())
            .await
            .expect("run_until_idle returns once shut down");

        assert_eq!(executor.queue().job(&id).unwrap().status, JobStatus::Queued);
        assert!(classifier.calls.lock().unwrap().is_empty());
    }
}
