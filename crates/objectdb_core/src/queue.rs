//! Single-writer execution queue.
//!
//! One worker thread owns the [`Store`]. Callers submit closures over a
//! channel and block on a reply channel until the worker has run them.
//! Jobs run one at a time in submission order, so no operation ever
//! observes another half-applied.
//!
//! ```text
//! caller A ──┐
//! caller B ──┼──> mpsc<Job> ──> worker: job(&mut Store) ──> reply
//! caller C ──┘
//! ```

use crate::error::{CoreError, CoreResult};
use crate::store::Store;
use parking_lot::Mutex;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle, ThreadId};

type Job = Box<dyn FnOnce(&mut Store) + Send>;

/// Handle on the worker thread.
pub struct Queue {
    sender: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl Queue {
    /// Spawns the worker and runs `init` on it as the first job.
    ///
    /// # Errors
    ///
    /// Returns the error of `init`, or an I/O error if the thread cannot be
    /// spawned.
    pub fn start<F>(name: String, init: F) -> CoreResult<Self>
    where
        F: FnOnce() -> CoreResult<Store> + Send + 'static,
    {
        let (sender, jobs) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<CoreResult<()>>(1);

        let worker = thread::Builder::new().name(name).spawn(move || {
            let mut store = match init() {
                Ok(store) => {
                    let _ = ready_tx.send(Ok(()));
                    store
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            while let Ok(job) = jobs.recv() {
                job(&mut store);
            }

            if let Err(e) = store.close() {
                tracing::warn!(error = %e, "failed to sync log on shutdown");
            }
            tracing::debug!("worker stopped");
        })?;

        let worker_id = worker.thread().id();
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                sender: Mutex::new(Some(sender)),
                worker: Mutex::new(Some(worker)),
                worker_id,
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(CoreError::DatabaseClosed)
            }
        }
    }

    /// Runs `f` on the worker after every job submitted before it.
    ///
    /// # Errors
    ///
    /// - `ReentrantCall` when called from the worker itself
    /// - `DatabaseClosed` after [`Queue::shutdown`], or if the job panicked
    pub fn run<R, F>(&self, f: F) -> CoreResult<R>
    where
        F: FnOnce(&mut Store) -> R + Send + 'static,
        R: Send + 'static,
    {
        if thread::current().id() == self.worker_id {
            return Err(CoreError::ReentrantCall);
        }
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or(CoreError::DatabaseClosed)?;

        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let job: Job = Box::new(move |store| {
            let _ = reply_tx.send(f(store));
        });
        sender.send(job).map_err(|_| CoreError::DatabaseClosed)?;
        drop(sender);
        reply_rx.recv().map_err(|_| CoreError::DatabaseClosed)
    }

    /// Stops accepting jobs, lets the queued ones finish and joins the
    /// worker. Later calls do nothing.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if thread::current().id() == self.worker_id {
            // Dropped from inside a listener; the loop ends on its own.
            return;
        }
        if worker.join().is_err() {
            tracing::error!("database worker panicked");
        }
    }

    /// Returns true once [`Queue::shutdown`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("worker", &self.worker_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
