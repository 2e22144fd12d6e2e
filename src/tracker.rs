use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
};

use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, error};
use parking_lot::Mutex;

use crate::{
    Options,
    manager::{OnSegmentCreated, SegmentManager},
    paths::CdcRawDir,
    ratelimit::RateLimiter,
    segment::{CdcState, Segment, SegmentWriter},
    sizer::DirectorySizer,
};

/// Handler for I/O errors escaping the recalculation walk.
///
/// The host may translate these into its configured disk-failure policy;
/// the default handler only logs.
pub type ErrorHandlerFn = dyn Fn(&io::Error) + Send + Sync + 'static;

/// The tracked CDC size, decomposed into the two components whose sum is
/// what admission compares against the budget.
struct Accounting {
    budget_bytes: u64,
    default_segment_bytes: u64,
    /// On-disk component: bytes of discarded `CONTAINS` segments awaiting
    /// the consumer. Incremented on discard, replaced wholesale by each
    /// completed directory walk.
    flushed_bytes: AtomicU64,
    /// Reserved component: one nominal segment size per live non-`FORBIDDEN`
    /// segment. Only updated under the affected segment's state lock.
    unflushed_bytes: AtomicU64,
}

impl Accounting {
    fn total_on_disk(&self) -> u64 {
        self.flushed_bytes.load(Ordering::Acquire) + self.unflushed_bytes.load(Ordering::Acquire)
    }

    /// Decide a segment's CDC state from the current accounting, taking the
    /// budget reservation if permitted.
    ///
    /// Runs for every fresh segment before it is published, and again for
    /// the active segment when a walk finds it `FORBIDDEN`.
    fn process_new_segment<W: SegmentWriter>(&self, segment: &Segment<W>) {
        let guard = segment.cdc_state().lock();
        if self.default_segment_bytes + self.total_on_disk() > self.budget_bytes {
            guard.set(CdcState::Forbidden);
        } else {
            guard.set(CdcState::Permitted);
            self.unflushed_bytes
                .fetch_add(self.default_segment_bytes, Ordering::AcqRel);
        }
    }

    fn process_discarded_segment<W: SegmentWriter>(&self, segment: &Segment<W>) {
        let guard = segment.cdc_state().lock();
        let state = guard.get();
        // Count the flushed bytes before releasing the reservation, so no
        // window exists in which a concurrently created segment observes an
        // undercount.
        if state == CdcState::Contains {
            self.flushed_bytes
                .fetch_add(segment.writer().on_disk_size(), Ordering::AcqRel);
        }
        if state != CdcState::Forbidden {
            self.unflushed_bytes
                .fetch_sub(self.default_segment_bytes, Ordering::AcqRel);
        }
    }
}

/// Tracks CDC bytes against the configured budget and keeps the tracked
/// value converging toward the truth on disk.
///
/// Small accounting deltas are applied inline, under the affected segment's
/// state lock. The ground truth (the CDC-raw directory) changes underneath
/// the process as the consumer archives files away, so a worker thread
/// re-walks the directory on demand: at most one walk runs at a time, at
/// most one more may be queued, and further submissions are dropped.
pub struct CdcSizeTracker {
    accounting: Arc<Accounting>,
    cdc_dir: CdcRawDir,
    limiter: Arc<RateLimiter>,
    tx: Sender<()>,
    /// Handed to the worker at [`Self::start`].
    rx: Mutex<Option<Receiver<()>>>,
    completed: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    on_error: Arc<ErrorHandlerFn>,
}

impl CdcSizeTracker {
    pub fn new(opts: &Options, cdc_dir: CdcRawDir, on_error: Option<Arc<ErrorHandlerFn>>) -> Self {
        let (tx, rx) = bounded(1);
        let permits_per_second = 1000.0 / opts.cdc_disk_check_interval.as_millis() as f64;

        Self {
            accounting: Arc::new(Accounting {
                budget_bytes: opts.cdc_total_space,
                default_segment_bytes: opts.segment_size,
                flushed_bytes: AtomicU64::new(0),
                unflushed_bytes: AtomicU64::new(0),
            }),
            cdc_dir,
            limiter: Arc::new(RateLimiter::new(permits_per_second)),
            tx,
            rx: Mutex::new(Some(rx)),
            completed: Arc::new(AtomicU64::new(0)),
            stop: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            on_error: on_error
                .unwrap_or_else(|| Arc::new(|e| error!("CDC size recalculation failed: {e}"))),
        }
    }

    /// The hook to install on the segment manager: decides each fresh
    /// segment's CDC state and opportunistically schedules a recalculation
    /// to pick up consumer deletions.
    pub fn on_segment_created<W: SegmentWriter>(&self) -> Arc<OnSegmentCreated<W>> {
        let accounting = self.accounting.clone();
        let tx = self.tx.clone();
        Arc::new(move |segment: &Segment<W>| {
            accounting.process_new_segment(segment);
            submit(&tx);
        })
    }

    /// Start the recalculation worker.
    ///
    /// Submissions made before this point queue up and run once the worker
    /// is live.
    ///
    /// # Panics
    ///
    /// If called twice.
    pub fn start<M: SegmentManager>(&self, manager: Arc<M>) -> io::Result<()> {
        let worker = RecalcWorker {
            rx: self
                .rx
                .lock()
                .take()
                .expect("recalculation worker already started"),
            accounting: self.accounting.clone(),
            sizer: DirectorySizer::new(&*self.cdc_dir),
            limiter: self.limiter.clone(),
            tx: self.tx.clone(),
            manager,
            completed: self.completed.clone(),
            stop: self.stop.clone(),
            on_error: self.on_error.clone(),
        };
        let handle = thread::Builder::new()
            .name("cdc-size-recalc".into())
            .spawn(move || worker.run())?;
        *self.worker.lock() = Some(handle);

        Ok(())
    }

    /// Queue a recalculation of the on-disk CDC size.
    ///
    /// Best effort: at most one task is pending at a time, and submissions
    /// while one is pending are dropped (it will observe the state they
    /// meant to pick up).
    pub fn submit_overflow_recalc(&self) {
        submit(&self.tx);
    }

    /// Settle accounting for a discarded segment and schedule a
    /// recalculation to pick up consumer deletions.
    pub(crate) fn on_discard<W: SegmentWriter>(&self, segment: &Segment<W>) {
        self.accounting.process_discarded_segment(segment);
        self.submit_overflow_recalc();
    }

    /// Current tracked CDC bytes: flushed segments awaiting the consumer
    /// plus reservations for live segments.
    pub fn total_on_disk(&self) -> u64 {
        self.accounting.total_on_disk()
    }

    /// Number of completed recalculation walks.
    ///
    /// Monotonic; lets callers await convergence instead of sleeping for a
    /// recalculation interval.
    pub fn completed_recalcs(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Stop the worker and wait for it to exit. An in-flight walk runs to
    /// completion. Idempotent.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Release);
        // Wake the worker if it is idle; a full queue wakes it anyway.
        let _ = self.tx.try_send(());
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

impl Drop for CdcSizeTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn submit(tx: &Sender<()>) {
    // Full means a pending task already covers this request.
    let _ = tx.try_send(());
}

/// The single-slot recalculation executor.
struct RecalcWorker<M> {
    rx: Receiver<()>,
    accounting: Arc<Accounting>,
    sizer: DirectorySizer,
    limiter: Arc<RateLimiter>,
    tx: Sender<()>,
    manager: Arc<M>,
    completed: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    on_error: Arc<ErrorHandlerFn>,
}

impl<M: SegmentManager> RecalcWorker<M> {
    fn run(self) {
        while self.rx.recv().is_ok() {
            if self.stop.load(Ordering::Acquire) {
                break;
            }
            self.limiter.acquire();
            match self.sizer.walk() {
                Ok(total) => {
                    self.accounting.flushed_bytes.store(total, Ordering::Release);
                    debug!("recalculated CDC size: flushed={total}");
                    // Re-admission: re-evaluate whichever segment is active
                    // *now*. If the consumer has drained below budget the
                    // segment flips back to PERMITTED; otherwise the
                    // resubmission keeps polling at the limiter's pace.
                    let active = self.manager.active();
                    if active.cdc_state().get() == CdcState::Forbidden {
                        self.accounting.process_new_segment(active.as_ref());
                        submit(&self.tx);
                    }
                    self.completed.fetch_add(1, Ordering::AcqRel);
                }
                Err(e) => {
                    // Leave the tracked size unchanged; the next walk may
                    // succeed.
                    (self.on_error)(&e);
                }
            }
        }
    }
}
