//! Prefetching cursor backed by a worker thread.
//!
//! ```text
//!            batches (bounded, 2)
//!  producer ─────────────────────▶ consumer (CacheCursor)
//!     ▲  ◀──── cancel (disconnect) ────┘
//!     └──────── done: upstream handed back ───▶ closed once by consumer
//! ```
//!
//! The upstream waits in a shared slot until the producer claims it. Closing
//! the consumer disconnects the cancel channel, then closes the upstream
//! itself if the producer never started, or waits for the producer to hand
//! it back. The producer also stops when the pool shuts down.
//!
//! A producer reserves its worker. When every worker is reserved the cursor
//! pulls from the upstream directly instead of queueing behind other
//! producers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};
use tracing::{debug, warn};

use super::{BoxedCursor, FeatureCursor};
use crate::error::StoreError;
use crate::feature::{Feature, FeatureType};
use crate::worker::WorkerPool;

const HANDOFF_CAPACITY: usize = 2;

enum Batch {
    Full(Vec<Feature>),
    /// Shorter than the cache size; nothing follows.
    Last(Vec<Feature>),
    /// Records pulled before the upstream failed, then the failure.
    Failed(Vec<Feature>, StoreError),
}

type Slot = Arc<Mutex<Option<BoxedCursor>>>;

enum Source {
    Prefetching {
        batches: Receiver<Batch>,
        cancel: Option<Sender<()>>,
        done: Receiver<BoxedCursor>,
        slot: Slot,
    },
    Direct(BoxedCursor),
}

/// Pulls upstream records in batches of `size` on a pool worker, keeping up
/// to two batches ready ahead of the consumer.
pub struct CacheCursor {
    feature_type: Arc<FeatureType>,
    size: usize,
    source: Source,
    current: VecDeque<Feature>,
    pending_error: Option<StoreError>,
    finished: bool,
    closed: bool,
    // Held so the pool outlives the producer running on it.
    _pool: Arc<WorkerPool>,
}

/// Take the upstream out of its slot, if still there.
fn claim(slot: &Mutex<Option<BoxedCursor>>) -> Option<BoxedCursor> {
    match slot.lock() {
        Ok(mut upstream) => upstream.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
}

impl CacheCursor {
    /// Start prefetching from `upstream` on `pool`.
    pub fn new<C>(mut upstream: C, size: usize, pool: &Arc<WorkerPool>) -> Result<Self, StoreError>
    where
        C: FeatureCursor + Send + 'static,
    {
        if size == 0 {
            upstream.close()?;
            return Err(StoreError::Config("cache size must be at least 1".into()));
        }
        if pool.is_shut_down() {
            upstream.close()?;
            return Err(StoreError::Worker("worker pool is shut down".into()));
        }
        let feature_type = Arc::clone(upstream.feature_type());
        let (batch_tx, batches) = bounded(HANDOFF_CAPACITY);
        let (cancel, cancel_rx) = bounded::<()>(0);
        let (done_tx, done) = bounded(1);
        let slot: Slot = Arc::new(Mutex::new(Some(Box::new(upstream))));

        let job_slot = Arc::clone(&slot);
        let stop = pool.stop_signal();
        let type_name = feature_type.name().to_string();
        let started = pool.try_execute(move || {
            let Some(upstream) = claim(&job_slot) else {
                debug!(feature_type = %type_name, "cache closed before its producer started");
                return;
            };
            let upstream = produce(upstream, size, &batch_tx, &cancel_rx, &stop);
            debug!(feature_type = %type_name, "cache producer stopped");
            let _ = done_tx.send(upstream);
        });

        let source = match started {
            Ok(true) => {
                debug!(feature_type = %feature_type.name(), size, "cache producer started");
                Source::Prefetching {
                    batches,
                    cancel: Some(cancel),
                    done,
                    slot,
                }
            }
            Ok(false) => {
                let upstream = claim(&slot).ok_or_else(|| {
                    StoreError::Worker("cache upstream claimed by a refused producer".into())
                })?;
                debug!(feature_type = %feature_type.name(), "every worker is reserved; cache pulls directly");
                Source::Direct(upstream)
            }
            Err(err) => {
                if let Some(mut upstream) = claim(&slot) {
                    upstream.close()?;
                }
                return Err(err);
            }
        };

        Ok(Self {
            feature_type,
            size,
            source,
            current: VecDeque::with_capacity(size),
            pending_error: None,
            finished: false,
            closed: false,
            _pool: Arc::clone(pool),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether records come from a producer on the pool rather than straight
    /// from the upstream.
    pub fn is_prefetching(&self) -> bool {
        matches!(self.source, Source::Prefetching { .. })
    }

    fn fill(&mut self) -> Result<bool, StoreError> {
        let batches = match &mut self.source {
            Source::Prefetching { batches, .. } => batches,
            Source::Direct(upstream) => return upstream.has_next(),
        };
        loop {
            if !self.current.is_empty() {
                return Ok(true);
            }
            if let Some(err) = self.pending_error.take() {
                return Err(err);
            }
            if self.finished {
                return Ok(false);
            }
            match batches.recv() {
                Ok(Batch::Full(features)) => self.current.extend(features),
                Ok(Batch::Last(features)) => {
                    self.finished = true;
                    self.current.extend(features);
                }
                Ok(Batch::Failed(features, err)) => {
                    self.finished = true;
                    self.pending_error = Some(err);
                    self.current.extend(features);
                }
                Err(_) => {
                    self.finished = true;
                    return Err(StoreError::Worker(
                        "cache producer stopped without ending the stream".into(),
                    ));
                }
            }
        }
    }
}

/// Sent on or disconnected.
fn signalled(signal: &Receiver<()>) -> bool {
    !matches!(signal.try_recv(), Err(TryRecvError::Empty))
}

/// Producer loop. Returns the upstream once it is safe to close.
fn produce(
    mut upstream: BoxedCursor,
    size: usize,
    batches: &Sender<Batch>,
    cancel: &Receiver<()>,
    stop: &Receiver<()>,
) -> BoxedCursor {
    loop {
        let mut features = Vec::with_capacity(size);
        let mut failure = None;
        while features.len() < size {
            if signalled(cancel) || signalled(stop) {
                return upstream;
            }
            match upstream.has_next() {
                Ok(true) => match upstream.next() {
                    Ok(feature) => features.push(feature),
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                },
                Ok(false) => break,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let batch = match failure {
            Some(err) => {
                warn!(error = %err, "cache producer failed pulling upstream");
                Batch::Failed(features, err)
            }
            None if features.len() < size => Batch::Last(features),
            None => Batch::Full(features),
        };
        let terminal = !matches!(batch, Batch::Full(_));

        select! {
            send(batches, batch) -> sent => {
                if sent.is_err() {
                    return upstream;
                }
            }
            recv(cancel) -> _ => return upstream,
            recv(stop) -> _ => {
                debug!("worker pool shutting down; cache producer stopping");
                return upstream;
            }
        }
        if terminal {
            return upstream;
        }
    }
}

impl FeatureCursor for CacheCursor {
    fn feature_type(&self) -> &Arc<FeatureType> {
        &self.feature_type
    }

    fn has_next(&mut self) -> Result<bool, StoreError> {
        if self.closed {
            return Ok(false);
        }
        self.fill()
    }

    fn next(&mut self) -> Result<Feature, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        if let Source::Direct(upstream) = &mut self.source {
            return upstream.next();
        }
        if !self.fill()? {
            return Err(StoreError::Exhausted);
        }
        self.current.pop_front().ok_or(StoreError::Exhausted)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.current.clear();
        self.pending_error = None;
        match &mut self.source {
            Source::Direct(upstream) => upstream.close(),
            Source::Prefetching {
                cancel, done, slot, ..
            } => {
                drop(cancel.take());
                if let Some(mut upstream) = claim(slot) {
                    return upstream.close();
                }
                match done.recv() {
                    Ok(mut upstream) => upstream.close(),
                    Err(_) => Err(StoreError::Worker(
                        "cache producer exited without releasing its upstream".into(),
                    )),
                }
            }
        }
    }
}

impl Drop for CacheCursor {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "closing cache cursor on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::test_support::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn preserves_order_for_every_size() {
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        for size in 1..=8 {
            let mut cursor = CacheCursor::new(numbered_cursor(6), size, &pool).unwrap();
            assert_eq!(
                ids(&cursor.drain().unwrap()),
                vec![1, 2, 3, 4, 5, 6],
                "size {}",
                size
            );
        }
    }

    #[test]
    fn empty_upstream() {
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        let mut cursor = CacheCursor::new(numbered_cursor(0), 3, &pool).unwrap();
        assert!(!cursor.has_next().unwrap());
        assert_eq!(cursor.next().unwrap_err(), StoreError::Exhausted);
    }

    #[test]
    fn error_surfaces_once_after_prefix() {
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        let mut cursor = CacheCursor::new(Failing::after(3), 2, &pool).unwrap();
        for expected in 1..=3 {
            assert_eq!(cursor.next().unwrap().id(), Some(expected));
        }
        assert_eq!(
            cursor.has_next().unwrap_err(),
            StoreError::Transform("upstream failure".into())
        );
        assert!(!cursor.has_next().unwrap());
        cursor.close().unwrap();
    }

    #[test]
    fn close_mid_stream_closes_upstream_once() {
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        let counting = Counting::new(numbered_cursor(100));
        let (_, closes) = counting.counters();
        let mut cursor = CacheCursor::new(counting, 3, &pool).unwrap();
        assert_eq!(cursor.next().unwrap().id(), Some(1));
        cursor.close().unwrap();
        cursor.close().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(!cursor.has_next().unwrap());
        assert_eq!(cursor.next().unwrap_err(), StoreError::Closed);
    }

    #[test]
    fn drop_releases_producer_and_upstream() {
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        let counting = Counting::new(numbered_cursor(50));
        let (_, closes) = counting.counters();
        drop(CacheCursor::new(counting, 2, &pool).unwrap());
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        // The single worker is free again.
        let mut next = CacheCursor::new(numbered_cursor(3), 2, &pool).unwrap();
        assert_eq!(next.drain().unwrap().len(), 3);
    }

    #[test]
    fn shut_down_pool_is_rejected() {
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        pool.shutdown();
        let counting = Counting::new(numbered_cursor(1));
        let (_, closes) = counting.counters();
        assert!(matches!(
            CacheCursor::new(counting, 2, &pool),
            Err(StoreError::Worker(_))
        ));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pulls_directly_when_every_worker_is_reserved() {
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        let mut first = CacheCursor::new(numbered_cursor(20), 2, &pool).unwrap();
        let mut second = CacheCursor::new(numbered_cursor(20), 2, &pool).unwrap();
        assert!(first.is_prefetching());
        assert!(!second.is_prefetching());
        assert_eq!(first.next().unwrap().id(), Some(1));
        assert_eq!(second.next().unwrap().id(), Some(1));

        let expected: Vec<i64> = (2..=20).collect();
        assert_eq!(ids(&second.drain().unwrap()), expected);
        assert_eq!(ids(&first.drain().unwrap()), expected);
        drop(second);
        drop(first);
    }

    #[test]
    fn close_before_producer_starts_closes_upstream_directly() {
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        let (release, blocked) = bounded::<()>(0);
        pool.execute(move || {
            let _ = blocked.recv();
        })
        .unwrap();

        let counting = Counting::new(numbered_cursor(5));
        let (pulls, closes) = counting.counters();
        let mut cursor = CacheCursor::new(counting, 2, &pool).unwrap();
        assert!(cursor.is_prefetching());
        cursor.close().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        drop(release);
        pool.shutdown();
        assert_eq!(pulls.load(Ordering::SeqCst), 0);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pool_shutdown_stops_a_parked_producer() {
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        let counting = Counting::new(numbered_cursor(50));
        let (_, closes) = counting.counters();
        let mut cursor = CacheCursor::new(counting, 2, &pool).unwrap();
        assert_eq!(cursor.next().unwrap().id(), Some(1));

        pool.shutdown();
        assert!(pool.is_shut_down());

        let mut pulled = 1;
        let err = loop {
            match cursor.next() {
                Ok(_) => pulled += 1,
                Err(err) => break err,
            }
        };
        assert!(matches!(err, StoreError::Worker(_)));
        assert!(pulled < 50);
        cursor.close().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
