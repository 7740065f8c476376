//! Seeding run configuration.

use std::time::Duration;

/// Default interval between polls for the root subtree.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of root polls before a partial gives up.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 300;

/// Default wait of non-first partials while the first one purges.
pub const DEFAULT_PURGE_GRACE: Duration = Duration::from_secs(2);

/// Default number of content cells materialized concurrently.
pub const DEFAULT_CONTENT_CONCURRENCY: usize = 16;

/// Wall-clock coordination between partials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedingTimings {
    /// Interval between root polls
    pub poll_interval: Duration,
    /// Root polls before the branch is skipped
    pub max_poll_attempts: u32,
    /// Wait before walking when the first partial purges
    pub purge_grace: Duration,
}

impl Default for SeedingTimings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            purge_grace: DEFAULT_PURGE_GRACE,
        }
    }
}

/// Configuration of one seeding run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedingConfig {
    /// Number of cooperating partials
    pub partition_count: u32,
    /// Run only this partial; `None` runs every partial in this process
    pub partition_index: Option<u32>,
    /// Delete every cached resource of the dataset first
    pub purge_before_run: bool,
    /// Recompute subtrees even when cached
    pub force_recompute: bool,
    pub timings: SeedingTimings,
    /// Content cells materialized concurrently per subtree
    pub content_concurrency: usize,
}

impl Default for SeedingConfig {
    fn default() -> Self {
        Self {
            partition_count: 1,
            partition_index: None,
            purge_before_run: false,
            force_recompute: false,
            timings: SeedingTimings::default(),
            content_concurrency: DEFAULT_CONTENT_CONCURRENCY,
        }
    }
}

impl SeedingConfig {
    /// Config for running a single partial out of `partition_count`.
    pub fn partial(partition_count: u32, partition_index: u32) -> Self {
        Self {
            partition_count,
            partition_index: Some(partition_index),
            ..Self::default()
        }
    }

    /// Partials this process runs.
    pub fn partitions_to_run(&self) -> Vec<u32> {
        match self.partition_index {
            Some(index) => vec![index],
            None => (0..self.partition_count.max(1)).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.partition_count == 0 {
            return Err("partition count must be at least 1".to_string());
        }
        if let Some(index) = self.partition_index {
            if index >= self.partition_count {
                return Err(format!(
                    "partition index {} out of range for {} partitions",
                    index, self.partition_count
                ));
            }
        }
        if self.content_concurrency == 0 {
            return Err("content concurrency must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SeedingConfig::default();
        assert_eq!(config.partition_count, 1);
        assert_eq!(config.timings.poll_interval, Duration::from_secs(1));
        assert_eq!(config.timings.max_poll_attempts, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partitions_to_run() {
        let all = SeedingConfig {
            partition_count: 3,
            ..SeedingConfig::default()
        };
        assert_eq!(all.partitions_to_run(), vec![0, 1, 2]);
        assert_eq!(SeedingConfig::partial(3, 2).partitions_to_run(), vec![2]);
    }

    #[test]
    fn test_validate_rejects_bad_index() {
        assert!(SeedingConfig::partial(2, 2).validate().is_err());
        let zero = SeedingConfig {
            partition_count: 0,
            ..SeedingConfig::default()
        };
        assert!(zero.validate().is_err());
    }
}
