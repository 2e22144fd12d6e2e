use std::{io, path::PathBuf};

use thiserror::Error;

/// Error returned by [`crate::CdcAllocator::allocate`].
#[derive(Debug, Error)]
pub enum Allocate {
    /// The mutation targets a CDC-tracked keyspace, and the CDC on-disk
    /// budget is exhausted.
    ///
    /// This is a soft failure: the write is not durable, and may be retried
    /// once the CDC consumer has freed space in `cdc_dir`.
    #[error("rejected write to CDC-tracked keyspace `{keyspace}`: free up space in {}", cdc_dir.display())]
    CdcWriteRejected {
        /// The keyspace the rejected mutation targeted.
        keyspace: String,
        /// The CDC-raw directory whose budget is exhausted.
        cdc_dir: PathBuf,
    },

    /// The underlying segment writer or segment hand-off failed.
    ///
    /// Fatal at this level; the host's disk-failure policy decides what
    /// happens next.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Allocate {
    /// `true` if the error is the soft, client-retriable admission
    /// rejection.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::CdcWriteRejected { .. })
    }
}
