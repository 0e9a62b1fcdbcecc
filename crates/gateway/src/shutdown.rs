//! Graceful shutdown sequencing
//!
//! Shutdown runs as an explicit state machine:
//! `Running → DrainingListener → ClosingPool → Stopped`.
//! The pool intake is only closed after the listener has fully drained, so
//! no request can reach a closed pool through the front door.

use gateway_common::{errors::AppError, WorkerPool};
use std::future::Future;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    DrainingListener,
    ClosingPool,
    Stopped,
}

pub struct ShutdownCoordinator {
    phase: watch::Sender<ShutdownPhase>,
    grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new(grace: Duration) -> Self {
        let (phase, _) = watch::channel(ShutdownPhase::Running);
        Self { phase, grace }
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase.subscribe()
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Resolves once the listener should stop accepting connections.
    /// Hand this to `axum::serve(..).with_graceful_shutdown`.
    pub fn listener_stop(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut phase = self.phase.subscribe();
        async move {
            let _ = phase.wait_for(|p| *p != ShutdownPhase::Running).await;
        }
    }

    fn transition(&self, next: ShutdownPhase) {
        let previous = self.phase.send_replace(next);
        info!(from = ?previous, to = ?next, "Shutdown phase changed");
    }

    /// Drive the listener until `signal` fires, then shut everything down in
    /// order.
    ///
    /// If the listener does not drain within the grace period this returns
    /// [`AppError::ShutdownTimeout`] and leaves the pool untouched.
    pub async fn run<L, S>(&self, listener: L, signal: S, pool: &WorkerPool) -> Result<(), AppError>
    where
        L: Future<Output = std::io::Result<()>>,
        S: Future<Output = ()>,
    {
        tokio::pin!(listener);

        let early_exit = tokio::select! {
            result = &mut listener => Some(result),
            _ = signal => None,
        };

        if let Some(result) = early_exit {
            // Listener died on its own, nothing left to drain in front of the pool
            self.close_pool(pool).await;
            return result.map_err(|e| AppError::Internal {
                message: format!("listener failed: {}", e),
            });
        }

        self.transition(ShutdownPhase::DrainingListener);
        info!(grace_secs = self.grace.as_secs_f64(), "Draining in-flight requests");

        match tokio::time::timeout(self.grace, &mut listener).await {
            Err(_) => {
                error!(grace_secs = self.grace.as_secs(), "Listener did not drain within grace period");
                return Err(AppError::ShutdownTimeout {
                    grace_secs: self.grace.as_secs(),
                });
            }
            Ok(Err(e)) => warn!(error = %e, "Listener exited with error during drain"),
            Ok(Ok(())) => info!("Listener drained"),
        }

        self.close_pool(pool).await;
        Ok(())
    }

    async fn close_pool(&self, pool: &WorkerPool) {
        self.transition(ShutdownPhase::ClosingPool);
        pool.shutdown().await;
        self.transition(ShutdownPhase::Stopped);
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_common::worker::{Job, SimulatedWork};
    use std::sync::Arc;
    use tokio::sync::oneshot;
    use tokio_test::{assert_err, assert_ok};

    fn pool(workers: usize, queue: usize) -> Arc<WorkerPool> {
        let handler = SimulatedWork::new(Duration::from_millis(20));
        Arc::new(WorkerPool::new(workers, queue, Arc::new(handler)))
    }

    #[tokio::test]
    async fn test_pool_closes_only_after_listener_drains() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let pool = pool(1, 1);
        let phases = coordinator.subscribe();
        let stop = coordinator.listener_stop();

        let listener = {
            let pool = pool.clone();
            async move {
                stop.await;
                assert_eq!(*phases.borrow(), ShutdownPhase::DrainingListener);
                assert!(!pool.is_closed());
                Ok(())
            }
        };

        assert_ok!(coordinator.run(listener, async {}, &pool).await);
        assert_eq!(coordinator.phase(), ShutdownPhase::Stopped);
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn test_grace_expiry_reports_timeout() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(50));
        let pool = pool(1, 1);

        let listener = std::future::pending::<std::io::Result<()>>();
        let result = coordinator.run(listener, async {}, &pool).await;

        assert!(matches!(result, Err(AppError::ShutdownTimeout { .. })));
        assert_eq!(coordinator.phase(), ShutdownPhase::DrainingListener);
        assert!(!pool.is_closed());
    }

    #[tokio::test]
    async fn test_listener_stop_waits_for_signal() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        let stop = tokio::spawn(coordinator.listener_stop());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!stop.is_finished());

        let pool = pool(1, 1);
        let (fire, fired) = oneshot::channel::<()>();
        let signal = async move {
            let _ = fired.await;
        };
        let listener = async move {
            assert_ok!(stop.await);
            Ok(())
        };

        let _ = fire.send(());
        assert_ok!(coordinator.run(listener, signal, &pool).await);
    }

    #[tokio::test]
    async fn test_queued_jobs_drain_before_stop() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let pool = pool(1, 4);

        let mut replies = Vec::new();
        for i in 0..3u8 {
            let (job, reply) = Job::new(vec![i].into());
            assert_ok!(pool.submit(job).await);
            replies.push(reply);
        }

        assert_ok!(coordinator.run(async { Ok(()) }, async {}, &pool).await);
        assert_eq!(pool.queue_depth(), 0);

        for reply in replies {
            assert_eq!(&assert_ok!(reply.await)[..], SimulatedWork::REPLY);
        }
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_rejected() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        let pool = pool(1, 1);

        assert_ok!(coordinator.run(async { Ok(()) }, async {}, &pool).await);
        let (job, _reply) = Job::new("late".into());
        assert_err!(pool.submit(job).await);
    }
}
