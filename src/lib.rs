use std::time::Duration;

mod allocator;
mod links;
mod manager;
mod mutation;
mod paths;
mod ratelimit;
mod segment;
mod sizer;
mod tracker;

pub use crate::{
    allocator::CdcAllocator,
    links::CdcLinkManager,
    manager::{FileWriter, FsSegmentManager, OnSegmentCreated, SegmentManager},
    mutation::{Mutation, Reservation},
    paths::{CdcRawDir, CommitLogDir, LOG_VERSION},
    ratelimit::{RateLimitedLogger, RateLimiter},
    segment::{CdcState, CdcStateCell, Segment, SegmentWriter},
    sizer::DirectorySizer,
    tracker::{CdcSizeTracker, ErrorHandlerFn},
};
pub mod error;

#[cfg(any(test, feature = "test"))]
pub use crate::manager::{MemSegmentManager, MemWriter};
#[cfg(any(test, feature = "test"))]
pub mod testing;

#[cfg(test)]
mod tests;

const MIB: u64 = 1024 * 1024;

/// [`CdcAllocator`] options.
#[derive(Clone, Copy, Debug)]
pub struct Options {
    /// Nominal size in bytes of one commit-log segment (the
    /// `commitlog_segment_size_mb` option). A segment stops accepting
    /// reservations beyond this, and is counted at this size from creation.
    ///
    /// Also the amount of CDC budget reserved when a segment is created
    /// `PERMITTED`.
    ///
    /// Default: 32 MiB
    pub segment_size: u64,
    /// Maximum bytes of CDC data allowed across live segments and the
    /// CDC-raw directory combined (the `cdc_total_space_mb` option).
    ///
    /// Default: 4096 MiB
    pub cdc_total_space: u64,
    /// Minimum interval between two size recalculations of the CDC-raw
    /// directory (the `cdc_free_space_check_interval_ms` option).
    ///
    /// Default: 250 ms
    pub cdc_disk_check_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            segment_size: 32 * MIB,
            cdc_total_space: 4096 * MIB,
            cdc_disk_check_interval: Duration::from_millis(250),
        }
    }
}
