use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use tempfile::TempDir;

use crate::{
    CdcAllocator, CdcRawDir, CdcSizeTracker, CommitLogDir, MemSegmentManager, Options,
    testing::enable_logging,
};

pub struct MemFixture {
    /// Keeps the CDC-raw directory the tracker walks alive.
    _root: TempDir,
    pub alloc: CdcAllocator<MemSegmentManager>,
}

/// An allocator over scripted in-memory segments, with a real (initially
/// empty) CDC-raw directory for the recalculation walk.
///
/// With `start_worker: false` the recalculation worker is not running;
/// submissions queue up and are processed once the test calls
/// [`CdcSizeTracker::start`]. This removes all timing from tests that
/// assert on the state *between* accounting updates and recalculations.
pub fn mem_fixture(
    opts: Options,
    capacities: impl IntoIterator<Item = u64>,
    start_worker: bool,
) -> MemFixture {
    enable_logging();
    let root = tempfile::tempdir().unwrap();
    let cdc_dir = CdcRawDir::new(root.path().join("cdc_raw"));
    cdc_dir.create().unwrap();

    let tracker = CdcSizeTracker::new(&opts, cdc_dir.clone(), None);
    let manager = Arc::new(MemSegmentManager::with_capacities(
        CommitLogDir::new(root.path().join("clog")),
        opts.segment_size,
        capacities,
        tracker.on_segment_created(),
    ));
    if start_worker {
        tracker.start(manager.clone()).unwrap();
    }

    MemFixture {
        _root: root,
        alloc: CdcAllocator::new(manager, tracker, cdc_dir),
    }
}

/// Wait until more than `past` recalculation walks have completed.
pub fn wait_for_recalc(tracker: &CdcSizeTracker, past: u64) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while tracker.completed_recalcs() <= past {
        assert!(Instant::now() < deadline, "recalculation did not complete");
        thread::sleep(Duration::from_millis(1));
    }
}
