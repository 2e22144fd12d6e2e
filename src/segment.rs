use std::{
    io,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU8, Ordering},
};

use parking_lot::{Mutex, MutexGuard};

/// Capability the allocator requires of the underlying log writer.
///
/// Implementations must not block in [`Self::allocate`]: a segment that
/// cannot fit the request returns `None`, and the caller drives a hand-off
/// to a fresh segment instead of waiting.
pub trait SegmentWriter: Send + Sync + 'static {
    /// Reserve `len` bytes, returning the offset of the start of the
    /// reserved region, or `None` if the segment cannot fit it.
    ///
    /// Within one segment, reservations are handed out at monotonically
    /// increasing offsets, in the order the calls return.
    fn allocate(&self, len: u64) -> Option<u64>;

    /// Bytes this segment is counted as occupying on disk.
    ///
    /// Never decreases while the segment is live. Implementations may
    /// report the nominal segment size rather than the filled length.
    fn on_disk_size(&self) -> u64;

    /// Flush and close the writer. Idempotent.
    fn close(&self) -> io::Result<()>;
}

/// Per-segment CDC admission state.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CdcState {
    /// CDC-tracked mutations may be reserved in this segment.
    Permitted = 0,
    /// The CDC budget was exhausted when this state was decided; CDC-tracked
    /// mutations are rejected.
    Forbidden = 1,
    /// At least one CDC-tracked mutation was reserved in this segment.
    ///
    /// Terminal. A segment that has ever admitted CDC data keeps its CDC
    /// link and index sidecar on discard.
    Contains = 2,
}

impl CdcState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Permitted,
            1 => Self::Forbidden,
            2 => Self::Contains,
            _ => unreachable!("invalid CDC state discriminant: {raw}"),
        }
    }
}

/// The per-segment CDC state machine.
///
/// The state is published through an atomic so the write path can read it
/// without locking. Transitions happen under a dedicated lock, so they can
/// be serialized with budget accounting without touching the segment's
/// data-append critical section.
#[derive(Debug)]
pub struct CdcStateCell {
    state: AtomicU8,
    lock: Mutex<()>,
}

impl CdcStateCell {
    pub(crate) fn new(initial: CdcState) -> Self {
        Self {
            state: AtomicU8::new(initial as u8),
            lock: Mutex::new(()),
        }
    }

    /// The current state, without locking.
    pub fn get(&self) -> CdcState {
        CdcState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Take the state lock.
    ///
    /// All transitions, and any accounting that must be atomic with them,
    /// happen while the returned guard is held.
    pub(crate) fn lock(&self) -> CdcStateGuard<'_> {
        CdcStateGuard {
            cell: self,
            _lock: self.lock.lock(),
        }
    }

    /// Transition `PERMITTED` → `CONTAINS` after a CDC-tracked reservation
    /// succeeded in this segment. No-op if the segment already contains CDC
    /// data.
    ///
    /// # Panics
    ///
    /// If the segment is `FORBIDDEN`: a successful reservation against a
    /// forbidden segment means admission control is broken.
    pub fn mark_contains(&self) {
        let guard = self.lock();
        match guard.get() {
            CdcState::Contains => {}
            CdcState::Permitted => guard.set(CdcState::Contains),
            CdcState::Forbidden => {
                panic!("CDC-tracked reservation succeeded in a FORBIDDEN segment")
            }
        }
    }

    /// Set the state to `new` iff it currently equals `expected`.
    ///
    /// Test-only convenience: the tracker's conditional transitions must be
    /// atomic with their accounting delta, so production code goes through
    /// [`Self::lock`] instead.
    #[cfg(test)]
    pub(crate) fn compare_and_set(&self, expected: CdcState, new: CdcState) -> bool {
        let guard = self.lock();
        if guard.get() == expected {
            guard.set(new);
            true
        } else {
            false
        }
    }
}

/// Proof that the state lock is held.
pub(crate) struct CdcStateGuard<'a> {
    cell: &'a CdcStateCell,
    _lock: MutexGuard<'a, ()>,
}

impl CdcStateGuard<'_> {
    pub fn get(&self) -> CdcState {
        self.cell.get()
    }

    /// Apply a transition.
    ///
    /// # Panics
    ///
    /// On transitions the state machine forbids: out of `CONTAINS`, or
    /// `FORBIDDEN` directly to `CONTAINS`.
    pub fn set(&self, new: CdcState) {
        let current = self.get();
        if current == new {
            return;
        }
        match (current, new) {
            (CdcState::Contains, _) => panic!("cannot transition out of CONTAINS (to {new:?})"),
            (CdcState::Forbidden, CdcState::Contains) => {
                panic!("cannot transition FORBIDDEN directly to CONTAINS")
            }
            _ => self.cell.state.store(new as u8, Ordering::Release),
        }
    }
}

/// One append-only commit-log segment.
///
/// Shared between writer threads, the segment manager, and the size
/// tracker; all of its state is interiorly synchronized.
#[derive(Debug)]
pub struct Segment<W> {
    id: u64,
    log_path: PathBuf,
    writer: W,
    cdc_state: CdcStateCell,
}

impl<W> Segment<W> {
    /// A fresh segment starts `PERMITTED`. The segment manager must run the
    /// creation hook, which decides the real initial state under the state
    /// lock, before publishing the segment as active.
    pub fn new(id: u64, log_path: PathBuf, writer: W) -> Self {
        Self {
            id,
            log_path,
            writer,
            cdc_state: CdcStateCell::new(CdcState::Permitted),
        }
    }

    /// Unique, ascending id assigned at creation.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Path of the segment's primary log file.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn cdc_state(&self) -> &CdcStateCell {
        &self.cdc_state
    }
}
