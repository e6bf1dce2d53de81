//! Serial job lanes
//!
//! Listeners run synchronously and cannot await; each interception hands
//! its async substitution to a lane. A lane runs its jobs one at a time
//! in submission order, so substitutions for one target never overtake
//! each other. Lanes share an in-flight tracker that callers can await.

use crate::error::{MetaSafeError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

/// Counts jobs submitted but not yet finished across lanes
#[derive(Debug, Default)]
pub struct InFlight {
    count: AtomicUsize,
    notify: Notify,
}

impl InFlight {
    /// Create a new tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs submitted and not yet finished
    pub fn pending(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait until no job is queued or running
    pub async fn idle(&self) {
        loop {
            let notified = self.notify.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn start(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }
}

type Job = BoxFuture<'static, ()>;

/// FIFO executor for substitution jobs of one target
pub struct SerialLane {
    name: String,
    tx: mpsc::UnboundedSender<Job>,
    in_flight: Arc<InFlight>,
}

impl SerialLane {
    /// Start a lane worker on `runtime`
    ///
    /// The worker exits once the lane is dropped and its queue is drained.
    pub fn spawn(name: impl Into<String>, runtime: &Handle, in_flight: Arc<InFlight>) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let worker_name = name.clone();
        let worker_in_flight = in_flight.clone();

        runtime.spawn(async move {
            let mut jobs = UnboundedReceiverStream::new(rx);
            while let Some(job) = jobs.next().await {
                if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                    tracing::error!(lane = %worker_name, "Substitution job panicked");
                }
                worker_in_flight.finish();
            }
            tracing::trace!(lane = %worker_name, "Lane closed");
        });

        Self { name, tx, in_flight }
    }

    /// Lane name for logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a job behind all previously submitted ones
    pub fn submit(&self, job: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        self.in_flight.start();
        if self.tx.send(Box::pin(job)).is_err() {
            self.in_flight.finish();
            return Err(MetaSafeError::Runtime(format!(
                "Lane '{}' is no longer running",
                self.name
            )));
        }
        Ok(())
    }
}
