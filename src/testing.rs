//! Types and helpers for testing, enabled by the `test` feature.

use crate::mutation::Mutation;

/// A mutation carrying just what admission control looks at.
#[derive(Clone, Debug)]
pub struct TestMutation {
    keyspace: String,
    cdc: bool,
}

impl TestMutation {
    /// A mutation targeting a CDC-tracked keyspace.
    pub fn cdc(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            cdc: true,
        }
    }

    /// A mutation targeting a keyspace without CDC.
    pub fn plain(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            cdc: false,
        }
    }
}

impl Mutation for TestMutation {
    fn keyspace(&self) -> &str {
        &self.keyspace
    }

    fn cdc_tracked(&self) -> bool {
        self.cdc
    }
}

pub fn enable_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .format_timestamp(None)
        .is_test(true)
        .try_init();
}
