use std::{fs, io, path::Path, sync::Arc, time::Duration};

use log::warn;

use crate::{
    Options,
    error::Allocate,
    links::CdcLinkManager,
    manager::{FsSegmentManager, SegmentManager},
    mutation::{Mutation, Reservation},
    paths::{CdcRawDir, CommitLogDir},
    ratelimit::RateLimitedLogger,
    segment::{CdcState, Segment, SegmentWriter},
    tracker::{CdcSizeTracker, ErrorHandlerFn},
};

/// Rejections are warned about at most this often per keyspace.
const REJECTION_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Admission-controlling allocator over CDC-aware commit-log segments.
///
/// For each write it picks the active segment, checks CDC admission,
/// reserves space, and drives a hand-off to a fresh segment when the active
/// one is full. CDC-tracked writes are rejected with
/// [`Allocate::CdcWriteRejected`] while the CDC on-disk budget is
/// exhausted; everything else proceeds regardless of CDC state.
pub struct CdcAllocator<M: SegmentManager> {
    manager: Arc<M>,
    tracker: CdcSizeTracker,
    links: CdcLinkManager,
    rejection_log: RateLimitedLogger,
}

impl CdcAllocator<FsSegmentManager> {
    /// Open an allocator over filesystem-backed segments: creates the
    /// directories as needed, wires the size tracker into the segment
    /// manager, opens the first segment, and starts the recalculation
    /// worker.
    ///
    /// `on_error` receives I/O errors from background recalculations; pass
    /// `None` to just log them.
    pub fn open(
        opts: &Options,
        clog_dir: CommitLogDir,
        cdc_dir: CdcRawDir,
        on_error: Option<Arc<ErrorHandlerFn>>,
    ) -> io::Result<Self> {
        let tracker = CdcSizeTracker::new(opts, cdc_dir.clone(), on_error);
        let manager = Arc::new(FsSegmentManager::open(
            clog_dir,
            cdc_dir.clone(),
            opts.segment_size,
            tracker.on_segment_created(),
        )?);
        tracker.start(manager.clone())?;

        Ok(Self::new(manager, tracker, cdc_dir))
    }
}

impl<M: SegmentManager> CdcAllocator<M> {
    /// Wire an allocator from parts.
    ///
    /// `manager` must have the tracker's creation hook installed
    /// ([`CdcSizeTracker::on_segment_created`]), and the tracker must be
    /// started against it.
    pub fn new(manager: Arc<M>, tracker: CdcSizeTracker, cdc_dir: CdcRawDir) -> Self {
        Self {
            manager,
            tracker,
            links: CdcLinkManager::new(cdc_dir),
            rejection_log: RateLimitedLogger::new(REJECTION_LOG_INTERVAL),
        }
    }

    pub fn manager(&self) -> &Arc<M> {
        &self.manager
    }

    pub fn tracker(&self) -> &CdcSizeTracker {
        &self.tracker
    }

    /// Reserve `size` bytes of segment space for `mutation`.
    ///
    /// Admission always precedes reservation: a CDC-tracked mutation is
    /// checked against the active segment's CDC state before any space is
    /// reserved, and again after every hand-off.
    ///
    /// # Errors
    ///
    /// [`Allocate::CdcWriteRejected`] if the mutation is CDC-tracked and
    /// the budget is exhausted; [`Allocate::Io`] if the hand-off to a fresh
    /// segment fails.
    pub fn allocate(&self, mutation: &impl Mutation, size: u64) -> Result<Reservation, Allocate> {
        let mut segment = self.manager.active();
        loop {
            self.reject_if_forbidden(mutation, &segment)?;
            if let Some(offset) = segment.writer().allocate(size) {
                if mutation.cdc_tracked() {
                    // Only after the reservation succeeded: a failed
                    // reservation must not tag the segment.
                    segment.cdc_state().mark_contains();
                }
                return Ok(Reservation {
                    segment_id: segment.id(),
                    offset,
                    len: size,
                });
            }
            // Full segment: promote a fresh one and retry. Deliberately
            // unbounded: giving up here would mean the node accepts no
            // writes at all, and upstream validation guarantees a mutation
            // fits an empty segment.
            self.manager.switch_segment(&segment)?;
            segment = self.manager.active();
        }
    }

    fn reject_if_forbidden(
        &self,
        mutation: &impl Mutation,
        segment: &Segment<M::Writer>,
    ) -> Result<(), Allocate> {
        if mutation.cdc_tracked() && segment.cdc_state().get() == CdcState::Forbidden {
            // The consumer may have drained since the segment was marked;
            // give the tracker a chance to notice.
            self.tracker.submit_overflow_recalc();
            if self.rejection_log.should_emit(mutation.keyspace()) {
                warn!(
                    "rejecting write to CDC-tracked keyspace `{}`: free up space in {}",
                    mutation.keyspace(),
                    self.links.dir().display()
                );
            }
            return Err(Allocate::CdcWriteRejected {
                keyspace: mutation.keyspace().to_owned(),
                cdc_dir: self.links.dir().to_path_buf(),
            });
        }

        Ok(())
    }

    /// Close `segment` and settle its accounting.
    ///
    /// If `delete`, the primary log file is removed. The CDC link and index
    /// sidecar are removed only for segments that never admitted CDC data;
    /// a `CONTAINS` segment keeps both until replay cleanup, so the
    /// consumer can still read it.
    pub fn discard(&self, segment: &Segment<M::Writer>, delete: bool) -> io::Result<()> {
        segment.writer().close()?;
        self.manager
            .add_size(-(segment.writer().on_disk_size() as i64));
        self.tracker.on_discard(segment);
        if delete {
            fs::remove_file(segment.log_path())?;
        }
        if segment.cdc_state().get() != CdcState::Contains {
            self.links.unlink(segment.log_path());
        }

        Ok(())
    }

    /// Replay-time cleanup for a replayed segment `file`: a CDC link whose
    /// index sidecar is missing was left by an unfinished producer and is
    /// removed.
    pub fn handle_replayed(&self, file: &Path) -> io::Result<()> {
        self.links.delete_orphan(file)
    }

    /// Stop the background recalculation worker. In-flight walks run to
    /// completion.
    pub fn shutdown(&self) {
        self.tracker.shutdown();
    }
}
