//! Serial callback execution
//!
//! Every application-visible notification runs on a [`CallbackQueue`]: one
//! tokio task that awaits each posted job to completion before taking the
//! next. Notifications for a client are therefore never concurrent with each
//! other, and jobs run in the order they were posted.
//!
//! Native threads can hand a job over synchronously with
//! [`CallbackQueue::post_and_wait`], which blocks the caller until the job
//! has finished.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::error::{ClientError, ClientResult};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Serial execution context for application callbacks
///
/// Cloning yields another handle to the same queue. The worker task stops
/// once every handle has been dropped.
#[derive(Clone)]
pub struct CallbackQueue {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Job>,
}

impl CallbackQueue {
    /// Create a queue on the current tokio runtime
    ///
    /// Fails with [`ClientError::NoCallbackContext`] outside a runtime.
    pub fn new(name: impl Into<String>) -> ClientResult<Self> {
        let handle = Handle::try_current().map_err(|e| ClientError::NoCallbackContext {
            message: format!("a tokio runtime is required to deliver callbacks: {}", e),
        })?;
        Ok(Self::with_handle(&handle, name))
    }

    /// Create a queue whose worker runs on `handle`
    pub fn with_handle(handle: &Handle, name: impl Into<String>) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let worker = name.clone();
        handle.spawn(async move {
            while let Some(job) = rx.recv().await {
                if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                    tracing::error!("Callback panicked on queue {}", worker);
                }
            }
            tracing::debug!("Callback queue {} stopped", worker);
        });

        Self { name, tx }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the worker has stopped accepting jobs
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Enqueue a job without waiting for it
    ///
    /// Returns `false` if the queue has shut down.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tx.send(Box::pin(job)).is_ok()
    }

    /// Enqueue a job and get a handle to wait for it
    ///
    /// Lets a caller fix the job's place in the queue while holding a lock
    /// and wait for it after releasing the lock. Returns `None` if the queue
    /// has shut down.
    pub fn post_tracked<F>(&self, job: F) -> Option<Delivery>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let posted = self.post(async move {
            job.await;
            let _ = done_tx.send(());
        });
        posted.then(|| Delivery {
            queue: self.name.clone(),
            done: done_rx,
        })
    }

    /// Enqueue a job and block the calling thread until it has run
    ///
    /// Must not be called from inside an async task; native callback threads
    /// and `spawn_blocking` threads are fine. If the job panics or the queue
    /// shuts down while waiting, the wait ends with a warning and the job
    /// counts as delivered. Returns `false` only if the job could not be
    /// posted at all.
    pub fn post_and_wait<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.post_tracked(job) {
            Some(delivery) => {
                delivery.wait();
                true
            }
            None => {
                tracing::warn!("Callback queue {} is closed; dropping synchronous job", self.name);
                false
            }
        }
    }
}

/// Completion of a job posted with [`CallbackQueue::post_tracked`]
#[derive(Debug)]
#[must_use = "dropping a Delivery does not wait for the job"]
pub struct Delivery {
    queue: Arc<str>,
    done: oneshot::Receiver<()>,
}

impl Delivery {
    /// Block the calling thread until the job has run
    ///
    /// Same threading rules as [`CallbackQueue::post_and_wait`].
    pub fn wait(self) {
        if self.done.blocking_recv().is_err() {
            tracing::warn!(
                "Interrupted while waiting for a synchronous callback on queue {}",
                self.queue
            );
        }
    }
}

impl fmt::Debug for CallbackQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackQueue")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}
