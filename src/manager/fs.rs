use std::{
    fmt,
    fs::File,
    io::{self, Seek as _, SeekFrom, Write as _},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicI64, AtomicU64, Ordering},
    },
};

use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::{
    links::CdcLinkManager,
    paths::{CdcRawDir, CommitLogDir},
    segment::{Segment, SegmentWriter},
};

use super::{OnSegmentCreated, SegmentManager};

/// Writer over one segment file.
///
/// Reservations are handed out against the nominal capacity with a single
/// atomic position; the file itself grows only as reservations are filled.
/// [`SegmentWriter::on_disk_size`] reports the nominal capacity: for budget
/// purposes a segment occupies its full nominal size from the moment it is
/// created.
#[derive(Debug)]
pub struct FileWriter {
    /// Reservations are filled through positioned writes under this lock;
    /// it is not on the reservation path.
    file: Mutex<File>,
    pos: AtomicU64,
    capacity: u64,
}

impl FileWriter {
    /// Create the segment file at `path` with a nominal capacity of
    /// `capacity` bytes.
    ///
    /// Returns [`io::ErrorKind::AlreadyExists`] if the file exists.
    pub fn create(path: &Path, capacity: u64) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file: Mutex::new(file),
            pos: AtomicU64::new(0),
            capacity,
        })
    }

    /// Fill a previously reserved region.
    pub fn write_at(&self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        if offset
            .checked_add(bytes.len() as u64)
            .is_none_or(|end| end > self.capacity)
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "write beyond segment capacity",
            ));
        }
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)
    }
}

impl SegmentWriter for FileWriter {
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
        self.file.lock().sync_all()
    }
}

/// A segment manager which stores segments in files on disk, hard-linked
/// into the CDC-raw directory at creation.
pub struct FsSegmentManager {
    clog_dir: CommitLogDir,
    links: CdcLinkManager,
    segment_size: u64,
    next_id: AtomicU64,
    active: RwLock<Arc<Segment<FileWriter>>>,
    /// Serializes hand-off; writers race to request a switch, one wins.
    switch_lock: Mutex<()>,
    on_segment_created: Arc<OnSegmentCreated<FileWriter>>,
    log_size: AtomicI64,
}

impl fmt::Debug for FsSegmentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsSegmentManager")
            .field("clog_dir", &self.clog_dir)
            .finish_non_exhaustive()
    }
}

impl FsSegmentManager {
    /// Create both directories as needed and open the first segment.
    pub fn open(
        clog_dir: CommitLogDir,
        cdc_dir: CdcRawDir,
        segment_size: u64,
        on_segment_created: Arc<OnSegmentCreated<FileWriter>>,
    ) -> io::Result<Self> {
        clog_dir.create()?;
        cdc_dir.create()?;
        let links = CdcLinkManager::new(cdc_dir);
        let next_id = AtomicU64::new(0);
        let first = create_segment(&clog_dir, &links, segment_size, &next_id, &on_segment_created)?;

        Ok(Self {
            clog_dir,
            links,
            segment_size,
            next_id,
            active: RwLock::new(first),
            switch_lock: Mutex::new(()),
            on_segment_created,
            log_size: AtomicI64::new(segment_size as i64),
        })
    }
}

impl SegmentManager for FsSegmentManager {
    type Writer = FileWriter;

    fn active(&self) -> Arc<Segment<FileWriter>> {
        self.active.read().clone()
    }

    fn switch_segment(&self, old: &Segment<FileWriter>) -> io::Result<()> {
        let _switching = self.switch_lock.lock();
        if self.active.read().id() != old.id() {
            // Lost the race; a fresh segment is already active.
            return Ok(());
        }
        let fresh = create_segment(
            &self.clog_dir,
            &self.links,
            self.segment_size,
            &self.next_id,
            &self.on_segment_created,
        )?;
        self.add_size(self.segment_size as i64);
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

/// Create, link, and initialize one segment.
///
/// The CDC hard link is created before the segment is handed to the
/// creation hook; a link failure aborts creation, and the segment is never
/// published.
fn create_segment(
    clog_dir: &CommitLogDir,
    links: &CdcLinkManager,
    segment_size: u64,
    next_id: &AtomicU64,
    on_segment_created: &Arc<OnSegmentCreated<FileWriter>>,
) -> io::Result<Arc<Segment<FileWriter>>> {
    let id = next_id.fetch_add(1, Ordering::Relaxed);
    let path = clog_dir.segment(id);
    let writer = FileWriter::create(&path, segment_size)?;
    links.link(&path)?;
    let segment = Arc::new(Segment::new(id, path, writer));
    debug!("created segment {} ({})", id, segment.log_path().display());
    on_segment_created(segment.as_ref());

    Ok(segment)
}
