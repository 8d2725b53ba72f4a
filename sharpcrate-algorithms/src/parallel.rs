//! Parallel processing utilities for the per-point pipeline stages
//!
//! Every stage is a map over point indices where item `i` writes only slot `i`
//! of the stage output. The helpers here run that map on a configurable rayon
//! pool with contiguous index chunks, or sequentially when parallelism is
//! disabled.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use sharpcrate_core::{Error, Result};

/// Thread pool configuration for parallel processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadPoolConfig {
    /// Number of threads to use (None = rayon default)
    pub num_threads: Option<usize>,
    /// Thread name prefix
    pub thread_name_prefix: String,
    /// Enable parallel processing (can be disabled for debugging)
    pub enabled: bool,
    /// Minimum number of contiguous indices handed to a worker at once
    pub chunk_size: usize,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            thread_name_prefix: "sharpcrate".to_string(),
            enabled: true,
            chunk_size: 100,
        }
    }
}

impl ThreadPoolConfig {
    /// Set number of threads
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Enable or disable parallel processing
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the scheduling chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than 0".to_string()));
        }
        if self.num_threads == Some(0) {
            return Err(Error::Config("num_threads must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Build a dedicated pool for a pipeline run.
///
/// Returns `None` when parallelism is disabled.
pub fn build_thread_pool(config: &ThreadPoolConfig) -> Result<Option<ThreadPool>> {
    config.validate()?;
    if !config.enabled {
        return Ok(None);
    }

    let mut builder = ThreadPoolBuilder::new();

    if let Some(num_threads) = config.num_threads {
        builder = builder.num_threads(num_threads);
    }

    if !config.thread_name_prefix.is_empty() {
        let prefix = config.thread_name_prefix.clone();
        builder = builder.thread_name(move |index| format!("{}-{}", prefix, index));
    }

    let pool = builder.build().map_err(|e| {
        Error::Algorithm(format!("Failed to create thread pool: {}", e))
    })?;

    Ok(Some(pool))
}

/// Execute an operation inside `pool`, or on the calling thread without one
pub fn execute_parallel<F, R>(pool: Option<&ThreadPool>, op: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    match pool {
        Some(pool) => pool.install(op),
        None => op(),
    }
}

/// Map `f` over `0..len`, collecting results in index order.
pub fn map_indices<U, F>(len: usize, config: &ThreadPoolConfig, f: F) -> Vec<U>
where
    U: Send,
    F: Fn(usize) -> U + Sync + Send,
{
    if !config.enabled {
        return (0..len).map(f).collect();
    }

    (0..len)
        .into_par_iter()
        .with_min_len(config.chunk_size.max(1))
        .map(f)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_indices_preserves_order() {
        let config = ThreadPoolConfig::default().with_chunk_size(7);
        let squares = map_indices(1000, &config, |i| i * i);
        assert_eq!(squares.len(), 1000);
        assert!(squares.iter().enumerate().all(|(i, &v)| v == i * i));
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let parallel = map_indices(257, &ThreadPoolConfig::default(), |i| i as f64 * 0.5);
        let sequential = map_indices(
            257,
            &ThreadPoolConfig::default().with_enabled(false),
            |i| i as f64 * 0.5,
        );
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_build_pool_with_threads() {
        let config = ThreadPoolConfig::default().with_threads(2);
        let pool = build_thread_pool(&config).unwrap().unwrap();
        assert_eq!(pool.current_num_threads(), 2);

        let sum: usize = execute_parallel(Some(&pool), || map_indices(100, &config, |i| i).into_iter().sum());
        assert_eq!(sum, 4950);
    }

    #[test]
    fn test_disabled_config_builds_no_pool() {
        let config = ThreadPoolConfig::default().with_enabled(false);
        assert!(build_thread_pool(&config).unwrap().is_none());
        assert_eq!(execute_parallel(None, || 42), 42);
    }

    #[test]
    fn test_invalid_config() {
        assert!(ThreadPoolConfig::default().with_chunk_size(0).validate().is_err());
        assert!(ThreadPoolConfig::default().with_threads(0).validate().is_err());
    }
}
