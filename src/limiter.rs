use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// One request per second across all providers.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(1000);

type Job = BoxFuture<'static, ()>;

#[derive(Debug, Error)]
pub enum LimiterError {
    #[error("rate limiter is shut down")]
    Closed,
    #[error("scheduled request was dropped before completing")]
    Dropped,
}

/// FIFO request pacer shared by every provider call.
///
/// A single background task drains the queue, dispatching one request at a
/// time and never starting two requests less than `min_interval` apart. Each
/// caller gets its own result back, so one failing request does not affect
/// the ones queued behind it.
///
/// The queue keeps draining even if a caller stops waiting on its result.
pub struct RateLimiter {
    tx: mpsc::UnboundedSender<Job>,
    pending: Arc<AtomicUsize>,
    min_interval: Duration,
}

impl RateLimiter {
    /// Start the limiter. Must be called from within a tokio runtime.
    pub fn new(min_interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        tokio::spawn(drain(rx, Arc::clone(&pending), min_interval));
        Self {
            tx,
            pending,
            min_interval,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Requests waiting for their turn (not counting the one in flight).
    pub fn queue_length(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Queue `request` and wait for its output. The closure is not invoked
    /// until the limiter dispatches it.
    pub async fn schedule<T, F, Fut>(&self, request: F) -> Result<T, LimiterError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            // Receiver may be gone if the caller lost interest.
            let _ = done_tx.send(request().await);
        });

        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(LimiterError::Closed);
        }
        done_rx.await.map_err(|_| LimiterError::Dropped)
    }
}

async fn drain(mut rx: mpsc::UnboundedReceiver<Job>, pending: Arc<AtomicUsize>, min_interval: Duration) {
    let mut last_dispatch: Option<Instant> = None;
    while let Some(job) = rx.recv().await {
        if let Some(last) = last_dispatch {
            let ready_at = last + min_interval;
            let now = Instant::now();
            if ready_at > now {
                tracing::debug!(wait_ms = (ready_at - now).as_millis() as u64, "pacing next request");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        pending.fetch_sub(1, Ordering::SeqCst);
        last_dispatch = Some(Instant::now());

        // Run on its own task so a panicking request can't take the queue down.
        if let Err(e) = tokio::spawn(job).await {
            tracing::warn!("scheduled request aborted: {}", e);
        }
    }
    tracing::debug!("rate limiter queue closed");
}
