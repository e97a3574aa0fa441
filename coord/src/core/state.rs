use anyhow::bail;
use std::time::Duration;

use crate::core::manager::FileManager;
use crate::core::transport::ShardClient;

pub const DEFAULT_MAX_FRAGMENT_SIZE: usize = 1024 * 1024;
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Size of every fragment but the last one of a file.
    pub max_fragment_size: usize,
    /// Deadline for all stores of one batch.
    pub batch_timeout: Duration,
    /// Age after which an uncommitted upload may be reclaimed.
    pub stale_after: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_fragment_size: DEFAULT_MAX_FRAGMENT_SIZE,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

impl CoordinatorConfig {
    /// A live upload goes up to one batch timeout between checkpoints, so it
    /// must not look abandoned before that.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stale_after <= self.batch_timeout {
            bail!(
                "stale-after ({:?}) must exceed batch-timeout ({:?})",
                self.stale_after,
                self.batch_timeout
            );
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct CoordinatorState {
    pub manager: FileManager,
    pub shards: ShardClient,
    pub config: CoordinatorConfig,
}
