//! Explicitly owned worker threads for background cursor work.
//!
//! A [`WorkerPool`] runs boxed jobs on a fixed set of named threads fed by a
//! shared job queue. The store owns one by default; callers that want to
//! control its lifetime build their own and hand it to
//! [`Store::with_pool`](crate::Store::with_pool).
//!
//! Long-running jobs reserve a worker with [`WorkerPool::try_execute`], which
//! refuses instead of queueing when every worker is taken, and watch
//! [`WorkerPool::stop_signal`] so shutdown never waits on them forever.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::error::StoreError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size pool of worker threads.
///
/// ## Example
///
/// ```
/// use std::sync::mpsc::channel;
/// use feature_store::WorkerPool;
///
/// let pool = WorkerPool::new(2).unwrap();
/// let (tx, rx) = channel();
/// pool.execute(move || tx.send(21 * 2).unwrap()).unwrap();
/// assert_eq!(rx.recv().unwrap(), 42);
///
/// pool.shutdown();
/// assert!(pool.execute(|| {}).is_err());
/// ```
pub struct WorkerPool {
    jobs: Mutex<Option<Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
    /// Workers not held by a reservation.
    idle: Arc<AtomicUsize>,
    /// Never sent on; dropped by shutdown to disconnect `stopped`.
    stop: Mutex<Option<Sender<()>>>,
    stopped: Receiver<()>,
}

/// Hands a reserved worker back when its job ends, panicked or not.
struct Reservation(Arc<AtomicUsize>);

impl Drop for Reservation {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl WorkerPool {
    /// Spawn `threads` workers. Zero threads is a configuration error.
    pub fn new(threads: usize) -> Result<Self, StoreError> {
        if threads == 0 {
            return Err(StoreError::Config(
                "worker pool needs at least one thread".into(),
            ));
        }
        let (tx, rx) = unbounded::<Job>();
        let mut handles = Vec::with_capacity(threads);
        for index in 0..threads {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("feature-store-worker-{}", index))
                .spawn(move || {
                    // Queued jobs still run after shutdown; recv fails once
                    // the queue is both closed and empty.
                    while let Ok(job) = rx.recv() {
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            warn!(worker = index, "worker job panicked");
                        }
                    }
                    debug!(worker = index, "worker stopped");
                })
                .map_err(|err| StoreError::Worker(err.to_string()))?;
            handles.push(handle);
        }
        let (stop, stopped) = bounded(0);
        info!(threads, "worker pool started");
        Ok(Self {
            jobs: Mutex::new(Some(tx)),
            handles: Mutex::new(handles),
            size: threads,
            idle: Arc::new(AtomicUsize::new(threads)),
            stop: Mutex::new(Some(stop)),
            stopped,
        })
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers not held by a [`try_execute`](WorkerPool::try_execute) job.
    pub fn idle(&self) -> usize {
        self.idle.load(Ordering::SeqCst)
    }

    /// Queue `job` for execution on a worker. Jobs queued this way do not
    /// reserve a worker and should be short.
    pub fn execute<F>(&self, job: F) -> Result<(), StoreError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.send(Box::new(job))
    }

    /// Run `job` on a worker reserved for it until it returns. Returns
    /// `Ok(false)`, dropping `job` unrun, when every worker is already
    /// reserved.
    pub fn try_execute<F>(&self, job: F) -> Result<bool, StoreError>
    where
        F: FnOnce() + Send + 'static,
    {
        let reserved = self
            .idle
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |idle| idle.checked_sub(1))
            .is_ok();
        if !reserved {
            return Ok(false);
        }
        let reservation = Reservation(Arc::clone(&self.idle));
        // On failure the job, and the reservation with it, is dropped.
        self.send(Box::new(move || {
            let _reservation = reservation;
            job();
        }))?;
        Ok(true)
    }

    /// Disconnects when the pool shuts down. Jobs that can run for a long
    /// time should return once it does.
    pub fn stop_signal(&self) -> Receiver<()> {
        self.stopped.clone()
    }

    fn send(&self, job: Job) -> Result<(), StoreError> {
        let jobs = self
            .jobs
            .lock()
            .map_err(|_| StoreError::LockPoisoned("worker execute"))?;
        let sender = jobs
            .as_ref()
            .ok_or_else(|| StoreError::Worker("worker pool is shut down".into()))?;
        sender
            .send(job)
            .map_err(|_| StoreError::Worker("worker pool is shut down".into()))
    }

    pub fn is_shut_down(&self) -> bool {
        self.jobs.lock().map(|jobs| jobs.is_none()).unwrap_or(true)
    }

    /// Stop accepting jobs, disconnect the stop signal, let queued jobs
    /// finish, and join every worker. Idempotent.
    pub fn shutdown(&self) {
        let sender = match self.jobs.lock() {
            Ok(mut jobs) => jobs.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if sender.is_none() {
            return;
        }
        drop(sender);
        match self.stop.lock() {
            Ok(mut stop) => drop(stop.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }

        let handles = match self.handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        let current = thread::current().id();
        for handle in handles {
            // A job that drops the last handle to the pool must not join
            // its own thread.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("worker thread panicked during shutdown");
            }
        }
        info!("worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
