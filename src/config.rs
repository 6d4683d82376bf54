use std::time::Duration;

use crate::perception::PerceptionStrategy;
use crate::tree::{TreeShape, DEFAULT_SPLITTING_COUNT};

/// Default ceiling on a parallel pass
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Worker count used when the machine parallelism cannot be queried
const FALLBACK_WORKERS: usize = 4;

/// Upper bound accepted for PERCEPTION_WORKERS
const MAX_WORKERS: usize = 1024;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("worker_threads must be at least 1")]
    NoWorkers,
    #[error("worker_threads cannot exceed {max}, got {actual}")]
    TooManyWorkers { max: usize, actual: usize },
    #[error("task_timeout must be positive")]
    ZeroTimeout,
    #[error("splitting_count must be at least 1")]
    ZeroSplittingCount,
}

/// Perception engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PerceptionConfig {
    /// Execution strategy of the perception pass
    pub strategy: PerceptionStrategy,
    /// Worker pool size (Parallel and Hybrid)
    pub worker_threads: usize,
    /// How long the driver waits for the workers before giving up on a pass
    pub task_timeout: Duration,
    /// Maximum entities per tree leaf
    pub splitting_count: usize,
    /// Zone shape of the trees built by the caller
    pub tree_shape: TreeShape,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            strategy: PerceptionStrategy::Parallel,
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(FALLBACK_WORKERS),
            task_timeout: DEFAULT_TASK_TIMEOUT,
            splitting_count: DEFAULT_SPLITTING_COUNT,
            tree_shape: TreeShape::Binary,
        }
    }
}

impl PerceptionConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(strategy) = std::env::var("PERCEPTION_STRATEGY") {
            match strategy.parse() {
                Ok(parsed) => config.strategy = parsed,
                Err(e) => tracing::warn!("Invalid PERCEPTION_STRATEGY: {}, using default", e),
            }
        }

        if let Ok(workers) = std::env::var("PERCEPTION_WORKERS") {
            if let Ok(parsed) = workers.parse::<usize>() {
                if parsed > 0 && parsed <= MAX_WORKERS {
                    config.worker_threads = parsed;
                } else {
                    tracing::warn!("PERCEPTION_WORKERS must be 1-{}, using default", MAX_WORKERS);
                }
            } else {
                tracing::warn!("Invalid PERCEPTION_WORKERS '{}', using default", workers);
            }
        }

        if let Ok(timeout) = std::env::var("PERCEPTION_TIMEOUT_SECS") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                if parsed > 0 {
                    config.task_timeout = Duration::from_secs(parsed);
                } else {
                    tracing::warn!("PERCEPTION_TIMEOUT_SECS must be > 0, using default");
                }
            } else {
                tracing::warn!("Invalid PERCEPTION_TIMEOUT_SECS '{}', using default", timeout);
            }
        }

        if let Ok(count) = std::env::var("PERCEPTION_SPLIT_COUNT") {
            if let Ok(parsed) = count.parse::<usize>() {
                if parsed > 0 {
                    config.splitting_count = parsed;
                } else {
                    tracing::warn!("PERCEPTION_SPLIT_COUNT must be > 0, using default");
                }
            } else {
                tracing::warn!("Invalid PERCEPTION_SPLIT_COUNT '{}', using default", count);
            }
        }

        if let Ok(shape) = std::env::var("PERCEPTION_TREE_SHAPE") {
            match shape.parse() {
                Ok(parsed) => config.tree_shape = parsed,
                Err(e) => tracing::warn!("Invalid PERCEPTION_TREE_SHAPE: {}, using default", e),
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.worker_threads > MAX_WORKERS {
            return Err(ConfigError::TooManyWorkers {
                max: MAX_WORKERS,
                actual: self.worker_threads,
            });
        }
        if self.task_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.splitting_count == 0 {
            return Err(ConfigError::ZeroSplittingCount);
        }
        Ok(())
    }
}
