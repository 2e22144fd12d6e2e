use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Computes the total byte size of the regular files under a directory.
///
/// Symbolic links are not followed. Each walk uses its own accumulator;
/// concurrent walks over the same tracker are impossible by construction
/// (the recalc executor is single-slot).
#[derive(Clone, Debug)]
pub struct DirectorySizer {
    root: PathBuf,
}

impl DirectorySizer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Walk the tree under the root and return the byte sum of all regular
    /// files in it.
    pub fn walk(&self) -> io::Result<u64> {
        let mut total = 0;
        visit(&self.root, &mut total)?;
        Ok(total)
    }
}

fn visit(dir: &Path, total: &mut u64) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            visit(&entry.path(), total)?;
        } else if file_type.is_file() {
            *total += entry.metadata()?.len();
        }
        // Symlinks and special files don't count toward the budget.
    }

    Ok(())
}
