use std::{io, sync::Arc};

use crate::segment::{Segment, SegmentWriter};

pub(crate) mod fs;
#[cfg(any(test, feature = "test"))]
pub mod mem;

pub use fs::{FileWriter, FsSegmentManager};
#[cfg(any(test, feature = "test"))]
pub use mem::{MemSegmentManager, MemWriter};

/// Owner of the active segment and of segment hand-off.
///
/// This is mainly a seam to allow testing against an in-memory
/// representation; the contract mirrors what the surrounding log engine
/// provides.
///
/// Implementations must run the installed [`OnSegmentCreated`] hook on every
/// freshly created segment **before** publishing it as active, so the
/// segment's CDC state is decided before any writer can observe it.
pub trait SegmentManager: Send + Sync + 'static {
    /// The writer type backing segments of this manager.
    type Writer: SegmentWriter;

    /// The segment currently accepting reservations.
    ///
    /// During a hand-off this may briefly return a segment that is already
    /// full; callers must tolerate a failed reservation and retry.
    fn active(&self) -> Arc<Segment<Self::Writer>>;

    /// Promote a fresh active segment if `old` is still the active one.
    ///
    /// No-op when another thread has already switched away from `old`. May
    /// park the caller until the fresh segment is ready.
    fn switch_segment(&self, old: &Segment<Self::Writer>) -> io::Result<()>;

    /// Adjust the running total of live log bytes.
    fn add_size(&self, delta: i64);

    /// Current total on-disk size of live log segments.
    fn size_on_disk(&self) -> u64;
}

/// Hook run for every freshly created segment, before it is published.
///
/// This is how the segment manager reaches the size tracker without any
/// global state: the tracker hands its hook to the manager at wiring time.
pub type OnSegmentCreated<W> = dyn Fn(&Segment<W>) + Send + Sync + 'static;
