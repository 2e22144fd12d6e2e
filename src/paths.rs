use std::{
    fs, io,
    ops::Deref,
    path::{Path, PathBuf},
};

/// Version tag embedded in segment file names.
pub const LOG_VERSION: u32 = 1;

const SEGMENT_FILE_PREFIX: &str = "CommitLog";
const SEGMENT_FILE_EXT: &str = "log";
const CDC_INDEX_FILE_EXT: &str = "cdc_idx";

/// The primary commit-log directory, holding the segment files themselves.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommitLogDir(PathBuf);

impl CommitLogDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Create the directory, including missing parents.
    pub fn create(&self) -> io::Result<()> {
        fs::create_dir_all(&self.0)
    }

    /// Path of the segment file with id `id` within this directory,
    /// e.g. `CommitLog-1-42.log`.
    pub fn segment(&self, id: u64) -> PathBuf {
        self.0
            .join(format!("{SEGMENT_FILE_PREFIX}-{LOG_VERSION}-{id}.{SEGMENT_FILE_EXT}"))
    }
}

impl Deref for CommitLogDir {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for CommitLogDir {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// The CDC-raw directory, holding hard links to segments carrying CDC data
/// plus the per-segment index sidecars written once a segment is fully
/// synced.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CdcRawDir(PathBuf);

impl CdcRawDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Create the directory, including missing parents.
    pub fn create(&self) -> io::Result<()> {
        fs::create_dir_all(&self.0)
    }

    /// Path of the hard link for `segment_file` within this directory.
    ///
    /// The link shares the segment file's basename.
    pub fn link_for(&self, segment_file: &Path) -> PathBuf {
        self.0.join(segment_file.file_name().unwrap_or_default())
    }

    /// Path of the index sidecar for `segment_file` within this directory:
    /// same stem, `.cdc_idx` extension.
    pub fn index_for(&self, segment_file: &Path) -> PathBuf {
        self.link_for(segment_file).with_extension(CDC_INDEX_FILE_EXT)
    }
}

impl Deref for CdcRawDir {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for CdcRawDir {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}
