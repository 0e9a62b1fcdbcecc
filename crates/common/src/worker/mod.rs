//! Bounded worker pool with per-job response rendezvous
//!
//! Provides:
//! - A fixed set of worker tasks draining one bounded FIFO queue
//! - Backpressure: `submit` waits for a free slot instead of failing
//! - A one-shot response channel per job, answered by exactly one worker
//! - Shutdown that closes intake, drains queued jobs and joins every worker
//!
//! Neither the queue wait nor the response wait has a timeout, and a job
//! already queued runs to completion even if its submitter went away.

use crate::config::WorkerPoolConfig;
use async_trait::async_trait;
use axum::body::Bytes;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Worker pool failures
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool intake is closed")]
    Closed,

    #[error("response for job {job_id} was dropped before delivery")]
    ResponseDropped { job_id: Uuid },
}

/// One unit of work plus the slot its single result goes to
#[derive(Debug)]
pub struct Job {
    pub id: Uuid,
    pub payload: Bytes,
    respond_to: oneshot::Sender<Bytes>,
}

impl Job {
    /// Create a job and the receiver its result will arrive on
    pub fn new(payload: Bytes) -> (Self, oneshot::Receiver<Bytes>) {
        let (respond_to, response) = oneshot::channel();
        let job = Self {
            id: Uuid::new_v4(),
            payload,
            respond_to,
        };
        (job, response)
    }
}

/// The work a pool performs for each job
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job_id: Uuid, payload: Bytes) -> Bytes;
}

/// Placeholder work: wait a fixed latency, then reply with a fixed message
#[derive(Debug, Clone)]
pub struct SimulatedWork {
    latency: Duration,
}

impl SimulatedWork {
    pub const REPLY: &'static [u8] = b"Processed by worker\n";

    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl JobHandler for SimulatedWork {
    async fn handle(&self, _job_id: Uuid, _payload: Bytes) -> Bytes {
        tokio::time::sleep(self.latency).await;
        Bytes::from_static(Self::REPLY)
    }
}

/// Fixed-size pool of workers consuming a bounded job queue
pub struct WorkerPool {
    intake: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    queue_capacity: usize,
}

impl WorkerPool {
    /// Start `worker_count` workers over a queue of `queue_capacity` slots
    pub fn new(
        worker_count: usize,
        queue_capacity: usize,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let receiver = Arc::new(AsyncMutex::new(receiver));

        let workers = (0..worker_count)
            .map(|id| tokio::spawn(run_worker(id, receiver.clone(), handler.clone())))
            .collect();

        info!(worker_count, queue_capacity, "Worker pool started");

        Self {
            intake: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            queue_capacity,
        }
    }

    /// Build a pool running [`SimulatedWork`] from configuration
    pub fn from_config(config: &WorkerPoolConfig) -> Self {
        let handler = SimulatedWork::new(Duration::from_millis(config.process_latency_ms));
        Self::new(config.workers, config.queue_capacity, Arc::new(handler))
    }

    /// Enqueue a job, waiting while the queue is full.
    ///
    /// Fails with [`PoolError::Closed`] once shutdown has begun. A submit that
    /// obtained the intake before shutdown still lands in the queue and is
    /// drained.
    pub async fn submit(&self, job: Job) -> Result<(), PoolError> {
        let sender = self.intake.lock().clone().ok_or(PoolError::Closed)?;

        debug!(job_id = %job.id, "Submitting job");
        sender.send(job).await.map_err(|_| PoolError::Closed)?;
        crate::metrics::record_queue_depth(self.queue_depth());

        Ok(())
    }

    /// Submit `payload` and wait for the worker's reply
    #[instrument(skip(self, payload), fields(job_id = tracing::field::Empty))]
    pub async fn dispatch(&self, payload: Bytes) -> Result<Bytes, PoolError> {
        let (job, response) = Job::new(payload);
        let job_id = job.id;
        tracing::Span::current().record("job_id", tracing::field::display(job_id));

        self.submit(job).await?;
        response.await.map_err(|_| PoolError::ResponseDropped { job_id })
    }

    /// Jobs waiting in the queue
    pub fn queue_depth(&self) -> usize {
        match self.intake.lock().as_ref() {
            Some(sender) => sender.max_capacity() - sender.capacity(),
            None => 0,
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn is_closed(&self) -> bool {
        self.intake.lock().is_none()
    }

    /// Close intake, let workers drain what is queued and wait for all of
    /// them to exit. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let sender = self.intake.lock().take();
        drop(sender);

        let workers = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return;
        }

        info!(workers = workers.len(), "Worker pool draining");
        for result in join_all(workers).await {
            if let Err(e) = result {
                warn!(error = %e, "Worker exited abnormally");
            }
        }
        info!("Worker pool stopped");
    }
}

async fn run_worker(
    id: usize,
    queue: Arc<AsyncMutex<mpsc::Receiver<Job>>>,
    handler: Arc<dyn JobHandler>,
) {
    debug!(worker_id = id, "Worker started");

    loop {
        // Hold the receiver only while dequeuing
        let job = {
            let mut queue = queue.lock().await;
            let job = queue.recv().await;
            crate::metrics::record_queue_depth(queue.len());
            job
        };
        let Some(job) = job else { break };

        let Job { id: job_id, payload, respond_to } = job;
        let result = handler.handle(job_id, payload).await;
        crate::metrics::record_job_processed();

        if respond_to.send(result).is_err() {
            warn!(worker_id = id, job_id = %job_id, "Submitter went away before the response was delivered");
        } else {
            debug!(worker_id = id, job_id = %job_id, "Job processed");
        }
    }

    debug!(worker_id = id, "Worker exited");
}
