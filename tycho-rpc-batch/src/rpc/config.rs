use std::time::Duration;

use crate::rpc::retry::RetryPolicy;

/// Configuration for per-call retry behavior
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RPCRetryConfig {
    /// Maximum number of retries after the first attempt (default: 10)
    pub max_retries: usize,
    /// Backoff scale in milliseconds; the n-th retry waits about `base_delay_ms * 2^n` (default:
    /// 50ms)
    pub base_delay_ms: u64,
}

impl RPCRetryConfig {
    pub fn new(max_retries: usize, base_delay_ms: u64) -> Self {
        Self { max_retries, base_delay_ms }
    }
}

impl Default for RPCRetryConfig {
    fn default() -> Self {
        Self { max_retries: 10, base_delay_ms: 50 }
    }
}

impl From<&RPCRetryConfig> for RetryPolicy {
    fn from(config: &RPCRetryConfig) -> Self {
        RetryPolicy::new(config.max_retries, Duration::from_millis(config.base_delay_ms))
    }
}

/// Configuration for scanning a block range in batches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanConfig {
    /// Number of consecutive blocks covered by one batch (default: 100)
    pub batch_size: usize,
    /// Stride between selected blocks inside a batch (default: 1)
    pub block_interval: usize,
}

impl ScanConfig {
    pub fn new(batch_size: usize, block_interval: usize) -> Self {
        Self { batch_size, block_interval }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { batch_size: 100, block_interval: 1 }
    }
}
