//! Grid configuration.

use crate::dialect::DuplicateInsertPreventionStrategy;
use crate::strategy::CacheMappingType;
use std::time::Duration;

/// Settings of the parallel tuple scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MassScanConfig {
    /// Capacity of the queue between producers and consumers.
    pub queue_capacity: usize,

    /// Number of consumer threads.
    pub consumer_threads: usize,

    /// How long a consumer waits for work before re-checking cancellation.
    pub poll_interval: Duration,
}

impl Default for MassScanConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1_000,
            consumer_threads: 4,
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl MassScanConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the queue capacity. Values below one are raised to one.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Sets the number of consumer threads. Values below one are raised to one.
    #[must_use]
    pub fn consumer_threads(mut self, threads: usize) -> Self {
        self.consumer_threads = threads.max(1);
        self
    }

    /// Sets the consumer poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Configuration of a [`crate::Grid`] and the dialects built for it.
#[derive(Debug, Clone)]
pub struct GridConfig {
    /// How cache-based stores map keys to caches.
    pub cache_mapping: CacheMappingType,

    /// Forces a duplicate-insert prevention strategy instead of asking the
    /// dialect.
    pub duplicate_insert_prevention: Option<DuplicateInsertPreventionStrategy>,

    /// Queued writes that trigger a batch round trip before flush ends.
    pub batch_size: usize,

    /// Parallel scan settings.
    pub mass_scan: MassScanConfig,

    /// Rows fetched per round trip when a query does not say otherwise.
    pub default_fetch_size: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cache_mapping: CacheMappingType::CachePerTable,
            duplicate_insert_prevention: None,
            batch_size: 50,
            mass_scan: MassScanConfig::default(),
            default_fetch_size: 100,
        }
    }
}

impl GridConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache mapping type.
    #[must_use]
    pub const fn cache_mapping(mut self, mapping: CacheMappingType) -> Self {
        self.cache_mapping = mapping;
        self
    }

    /// Overrides the duplicate-insert prevention strategy.
    #[must_use]
    pub const fn duplicate_insert_prevention(
        mut self,
        strategy: DuplicateInsertPreventionStrategy,
    ) -> Self {
        self.duplicate_insert_prevention = Some(strategy);
        self
    }

    /// Sets the batch size. Values below one are raised to one.
    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Sets the mass scan settings.
    #[must_use]
    pub fn mass_scan(mut self, config: MassScanConfig) -> Self {
        self.mass_scan = config;
        self
    }

    /// Sets the default fetch size.
    #[must_use]
    pub const fn default_fetch_size(mut self, size: usize) -> Self {
        self.default_fetch_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = GridConfig::default();
        assert_eq!(config.cache_mapping, CacheMappingType::CachePerTable);
        assert!(config.duplicate_insert_prevention.is_none());
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.mass_scan.consumer_threads, 4);
    }

    #[test]
    fn builder_pattern() {
        let config = GridConfig::new()
            .cache_mapping(CacheMappingType::CachePerKind)
            .duplicate_insert_prevention(DuplicateInsertPreventionStrategy::LookUp)
            .batch_size(0)
            .mass_scan(MassScanConfig::new().consumer_threads(8).queue_capacity(16));

        assert_eq!(config.cache_mapping, CacheMappingType::CachePerKind);
        assert_eq!(
            config.duplicate_insert_prevention,
            Some(DuplicateInsertPreventionStrategy::LookUp)
        );
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.mass_scan.consumer_threads, 8);
        assert_eq!(config.mass_scan.queue_capacity, 16);
    }
}
