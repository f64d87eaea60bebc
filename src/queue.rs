// src/queue.rs
//
// Job queue / worker pool (spec §4.10): a bounded channel of pending
// `WebhookJob`s drained by a fixed pool of workers, each invocation
// wrapped in a 5-minute timeout. Store + channel mirror the teacher's
// StateStore-plus-mpsc pattern from main.rs's event ingestion loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::data::{JobStatus, WebhookJob};
use crate::error::CadenceError;

const PER_JOB_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &WebhookJob) -> Result<crate::data::AnalysisReport, CadenceError>;
}

pub struct JobQueue {
    jobs: Arc<DashMap<String, WebhookJob>>,
    sender: Mutex<Option<mpsc::Sender<String>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: std::sync::atomic::AtomicBool,
}

impl JobQueue {
    /// Spawns `worker_count` workers draining the channel, each invoking `processor`.
    pub fn start(worker_count: usize, processor: Arc<dyn JobProcessor>) -> Self {
        let (sender, receiver) = mpsc::channel::<String>(256);
        let jobs: Arc<DashMap<String, WebhookJob>> = Arc::new(DashMap::new());

        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::with_capacity(worker_count.max(1));
        for worker_id in 0..worker_count.max(1) {
            let jobs = jobs.clone();
            let processor = processor.clone();
            let receiver = receiver.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    // The channel only ever closes once `stop()` drops the
                    // sender, so every worker sharing this receiver observes
                    // `None` and exits in turn rather than racing for it.
                    let next = receiver.lock().await.recv().await;
                    let Some(job_id) = next else {
                        break;
                    };
                    run_job(&jobs, &job_id, processor.as_ref(), worker_id).await;
                }
            }));
        }

        Self {
            jobs,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Enqueues a job: assigns an id if empty, sets pending status, inserts
    /// into the store, then pushes onto the worker channel.
    pub async fn enqueue(&self, mut job: WebhookJob) -> Result<String, CadenceError> {
        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(CadenceError::Cancelled("job queue is shut down".to_string()));
        }
        if job.id.is_empty() {
            job.id = uuid::Uuid::new_v4().to_string();
        }
        job.status = JobStatus::Pending;
        job.timestamp = Utc::now();
        let id = job.id.clone();
        self.jobs.insert(id.clone(), job);

        let sender = self.sender.lock().await.clone();
        let sender = sender.ok_or_else(|| CadenceError::Cancelled("job queue is shut down".to_string()))?;
        sender
            .send(id.clone())
            .await
            .map_err(|_| CadenceError::Cancelled("job queue is shut down".to_string()))?;
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<WebhookJob> {
        self.jobs.get(id).map(|e| e.value().clone())
    }

    /// Jobs sorted by timestamp descending, truncated to `limit` when > 0.
    pub fn list_jobs(&self, limit: usize) -> Vec<WebhookJob> {
        let mut all: Vec<WebhookJob> = self.jobs.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|j| std::cmp::Reverse(j.timestamp));
        if limit > 0 {
            all.truncate(limit);
        }
        all
    }

    /// Cancels intake and waits for every worker to drain its in-flight job
    /// and exit. Drops the sender so `recv()` resolves to `None` for all
    /// workers sharing the receiver, rather than relying on a notify that
    /// only ever wakes once.
    pub async fn stop(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        self.sender.lock().await.take();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("job queue worker task panicked during shutdown: {e}");
            }
        }
    }
}

async fn run_job(jobs: &DashMap<String, WebhookJob>, job_id: &str, processor: &dyn JobProcessor, worker_id: usize) {
    let Some(mut job) = jobs.get(job_id).map(|e| e.value().clone()) else {
        warn!("worker {worker_id}: job {job_id} vanished before processing");
        return;
    };

    job.transition(JobStatus::Processing);
    jobs.insert(job_id.to_string(), job.clone());
    info!("worker {worker_id}: processing job {job_id}");

    let result = tokio::time::timeout(PER_JOB_TIMEOUT, processor.process(&job)).await;

    match result {
        Ok(Ok(report)) => {
            job.transition(JobStatus::Completed);
            job.result = Some(report);
            job.progress = "done".to_string();
        }
        Ok(Err(e)) => {
            job.transition(JobStatus::Failed);
            job.error = Some(e.to_string());
            error!("worker {worker_id}: job {job_id} failed: {e}");
        }
        Err(_) => {
            job.transition(JobStatus::Failed);
            job.error = Some("job exceeded 5-minute timeout".to_string());
            error!("worker {worker_id}: job {job_id} timed out");
        }
    }
    jobs.insert(job_id.to_string(), job);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProcessor;

    #[async_trait]
    impl JobProcessor for EchoProcessor {
        async fn process(&self, job: &WebhookJob) -> Result<crate::data::AnalysisReport, CadenceError> {
            Ok(crate::data::AnalysisReport::new("git", job.repo_name.clone(), Utc::now()))
        }
    }

    fn job() -> WebhookJob {
        WebhookJob {
            id: String::new(),
            event_type: "push".to_string(),
            repo_url: "https://example.com/repo.git".to_string(),
            repo_name: "repo".to_string(),
            branch: "main".to_string(),
            author: "someone".to_string(),
            commits: vec!["abc123".to_string()],
            timestamp: Utc::now(),
            status: JobStatus::Pending,
            progress: String::new(),
            error: None,
            result: None,
        }
    }

    #[tokio::test]
    async fn enqueue_assigns_id_and_completes() {
        let queue = JobQueue::start(2, Arc::new(EchoProcessor));
        let id = queue.enqueue(job()).await.unwrap();
        assert!(!id.is_empty());

        for _ in 0..50 {
            if let Some(j) = queue.get(&id) {
                if j.status == JobStatus::Completed {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job never completed");
    }

    #[tokio::test]
    async fn stop_returns_after_workers_drain_and_rejects_further_enqueues() {
        let queue = JobQueue::start(3, Arc::new(EchoProcessor));
        queue.enqueue(job()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), queue.stop())
            .await
            .expect("stop() hung instead of closing the channel and draining workers");

        assert!(queue.enqueue(job()).await.is_err());
    }

    #[tokio::test]
    async fn list_jobs_orders_by_timestamp_descending() {
        let queue = JobQueue::start(1, Arc::new(EchoProcessor));
        let first = queue.enqueue(job()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = queue.enqueue(job()).await.unwrap();

        let listed = queue.list_jobs(0);
        let first_pos = listed.iter().position(|j| j.id == first).unwrap();
        let second_pos = listed.iter().position(|j| j.id == second).unwrap();
        assert!(second_pos < first_pos);
    }
}
