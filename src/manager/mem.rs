//! In-memory segment manager for tests.
//!
//! Behaves like the filesystem-backed manager, but segments live in memory
//! and their capacities can be scripted, so tests can force full-segment
//! hand-offs deterministically.

use std::{
    collections::VecDeque,
    fmt, io,
    sync::{
        Arc,
        atomic::{AtomicI64, AtomicU64, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};

use crate::{
    paths::CommitLogDir,
    segment::{Segment, SegmentWriter},
};

use super::{OnSegmentCreated, SegmentManager};

/// A segment writer backed by nothing at all.
///
/// Tracks the allocation position against a fixed capacity; the reserved
/// regions are never filled. `on_disk_size` reports the nominal capacity,
/// matching the file-backed writer.
#[derive(Debug)]
pub struct MemWriter {
    pos: AtomicU64,
    capacity: u64,
}

impl MemWriter {
    pub fn new(capacity: u64) -> Self {
        Self {
            pos: AtomicU64::new(0),
            capacity,
        }
    }
}

impl SegmentWriter for MemWriter {
    fn allocate(&self, len: u64) -> Option<u64> {
        self.pos
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pos| {
                pos.checked_add(len).filter(|end| *end <= self.capacity)
            })
            .ok()
    }

    fn on_disk_size(&self) -> u64 {
        self.capacity
    }

    fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

/// In-memory [`SegmentManager`].
///
/// Segment log paths are fabricated under a root directory that need not
/// exist; nothing is written to it.
pub struct MemSegmentManager {
    clog_dir: CommitLogDir,
    default_capacity: u64,
    /// Capacities for upcoming segments, consumed front to back; when
    /// empty, `default_capacity` is used.
    capacities: Mutex<VecDeque<u64>>,
    next_id: AtomicU64,
    active: RwLock<Arc<Segment<MemWriter>>>,
    switch_lock: Mutex<()>,
    on_segment_created: Arc<OnSegmentCreated<MemWriter>>,
    log_size: AtomicI64,
}

impl fmt::Debug for MemSegmentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemSegmentManager")
            .field("clog_dir", &self.clog_dir)
            .finish_non_exhaustive()
    }
}

impl MemSegmentManager {
    pub fn new(
        clog_dir: CommitLogDir,
        default_capacity: u64,
        on_segment_created: Arc<OnSegmentCreated<MemWriter>>,
    ) -> Self {
        Self::with_capacities(clog_dir, default_capacity, [], on_segment_created)
    }

    /// Like [`Self::new`], but the first segments get the given capacities.
    pub fn with_capacities(
        clog_dir: CommitLogDir,
        default_capacity: u64,
        capacities: impl IntoIterator<Item = u64>,
        on_segment_created: Arc<OnSegmentCreated<MemWriter>>,
    ) -> Self {
        let mut capacities: VecDeque<u64> = capacities.into_iter().collect();
        let next_id = AtomicU64::new(0);
        let first = create_segment(
            &clog_dir,
            &mut capacities,
            default_capacity,
            &next_id,
            &on_segment_created,
        );
        let log_size = AtomicI64::new(first.writer().on_disk_size() as i64);

        Self {
            clog_dir,
            default_capacity,
            capacities: Mutex::new(capacities),
            next_id,
            active: RwLock::new(first),
            switch_lock: Mutex::new(()),
            on_segment_created,
            log_size,
        }
    }
}

impl SegmentManager for MemSegmentManager {
    type Writer = MemWriter;

    fn active(&self) -> Arc<Segment<MemWriter>> {
        self.active.read().clone()
    }

    fn switch_segment(&self, old: &Segment<MemWriter>) -> io::Result<()> {
        let _switching = self.switch_lock.lock();
        if self.active.read().id() != old.id() {
            return Ok(());
        }
        let fresh = create_segment(
            &self.clog_dir,
            &mut self.capacities.lock(),
            self.default_capacity,
            &self.next_id,
            &self.on_segment_created,
        );
        self.add_size(fresh.writer().on_disk_size() as i64);
        *self.active.write() = fresh;

        Ok(())
    }

    fn add_size(&self, delta: i64) {
        self.log_size.fetch_add(delta, Ordering::Relaxed);
    }

    fn size_on_disk(&self) -> u64 {
        self.log_size.load(Ordering::Relaxed).max(0) as u64
    }
}

fn create_segment(
    clog_dir: &CommitLogDir,
    capacities: &mut VecDeque<u64>,
    default_capacity: u64,
    next_id: &AtomicU64,
    on_segment_created: &Arc<OnSegmentCreated<MemWriter>>,
) -> Arc<Segment<MemWriter>> {
    let id = next_id.fetch_add(1, Ordering::Relaxed);
    let capacity = capacities.pop_front().unwrap_or(default_capacity);
    let segment = Arc::new(Segment::new(id, clog_dir.segment(id), MemWriter::new(capacity)));
    on_segment_created(segment.as_ref());

    segment
}
