use std::{fs, io, path::Path};

use log::warn;

use crate::paths::CdcRawDir;

/// Maintains the hard links from segment log files into the CDC-raw
/// directory.
///
/// Linking (not copying) lets the consumer observe segment growth in real
/// time while the primary commit log keeps writing.
#[derive(Clone, Debug)]
pub struct CdcLinkManager {
    dir: CdcRawDir,
}

impl CdcLinkManager {
    pub fn new(dir: CdcRawDir) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &CdcRawDir {
        &self.dir
    }

    /// Hard-link `segment_file` into the CDC-raw directory under the same
    /// basename.
    ///
    /// Failure is fatal to segment creation: a segment without its CDC link
    /// cannot honor the CDC contract, and must not become active.
    pub fn link(&self, segment_file: &Path) -> io::Result<()> {
        fs::hard_link(segment_file, self.dir.link_for(segment_file))
    }

    /// Remove the link and index sidecar of a segment that never admitted
    /// CDC data.
    ///
    /// Already-absent files are tolerated. Other removal failures are logged
    /// and swallowed; leftovers are collected at the next replay.
    pub fn unlink(&self, segment_file: &Path) {
        remove_if_exists(&self.dir.link_for(segment_file));
        remove_if_exists(&self.dir.index_for(segment_file));
    }

    /// Replay-time cleanup: a link whose index sidecar is missing was left
    /// behind by an unfinished producer and is deleted.
    pub fn delete_orphan(&self, segment_file: &Path) -> io::Result<()> {
        let link = self.dir.link_for(segment_file);
        if link.try_exists()? && !self.dir.index_for(segment_file).try_exists()? {
            fs::remove_file(&link)?;
        }
        Ok(())
    }
}

fn remove_if_exists(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("failed to remove {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs::File;
    use std::io::Write as _;

    fn fixture() -> (tempfile::TempDir, CdcLinkManager, std::path::PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let cdc = CdcRawDir::new(root.path().join("cdc_raw"));
        cdc.create().unwrap();
        let segment_file = root.path().join("CommitLog-1-0.log");
        File::create(&segment_file).unwrap();
        (root, CdcLinkManager::new(cdc), segment_file)
    }

    #[test]
    fn link_tracks_growth_of_the_primary_file() {
        let (_root, links, segment_file) = fixture();
        links.link(&segment_file).unwrap();

        let link = links.dir().link_for(&segment_file);
        assert_eq!(link.metadata().unwrap().len(), 0);

        let mut f = File::options().append(true).open(&segment_file).unwrap();
        f.write_all(b"some commit log bytes").unwrap();
        f.sync_all().unwrap();

        // Hard link, same inode: the consumer sees the growth.
        assert_eq!(link.metadata().unwrap().len(), 21);
    }

    #[test]
    fn unlink_removes_link_and_sidecar_tolerating_absence() {
        let (_root, links, segment_file) = fixture();
        links.link(&segment_file).unwrap();
        File::create(links.dir().index_for(&segment_file)).unwrap();

        links.unlink(&segment_file);
        assert!(!links.dir().link_for(&segment_file).exists());
        assert!(!links.dir().index_for(&segment_file).exists());

        // Nothing left to remove: still fine.
        links.unlink(&segment_file);
    }

    #[test]
    fn orphaned_link_is_deleted_at_replay() {
        let (_root, links, segment_file) = fixture();
        links.link(&segment_file).unwrap();

        links.delete_orphan(&segment_file).unwrap();
        assert!(!links.dir().link_for(&segment_file).exists());
    }

    #[test]
    fn link_with_sidecar_survives_replay() {
        let (_root, links, segment_file) = fixture();
        links.link(&segment_file).unwrap();
        File::create(links.dir().index_for(&segment_file)).unwrap();

        links.delete_orphan(&segment_file).unwrap();
        assert!(links.dir().link_for(&segment_file).exists());
    }
}
