//! Cancellation and timeout utilities for long scans.
//!
//! Parsers are synchronous and check a shared `CancellationToken` every few
//! thousand iterations. Async callers bound the whole parse with
//! `parse_with_timeout`, which cancels the token when the deadline passes.

use crate::config::ParserConfig;
use crate::error::{MachoError, Result};
use crate::formats::macho::{parse_container_with, Container};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// Default timeout duration in seconds
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

/// Fast operation timeout in seconds
pub const FAST_TIMEOUT_SECONDS: u64 = 10;

/// Shared flag a scan polls to stop early.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Per-loop cancellation checker; polls the token every `interval` ticks.
pub struct ScanGuard<'a> {
    token: &'a CancellationToken,
    interval: usize,
    count: usize,
}

impl<'a> ScanGuard<'a> {
    pub fn new(token: &'a CancellationToken, interval: usize) -> Self {
        Self {
            token,
            interval: interval.max(1),
            count: 0,
        }
    }

    /// Call once per iteration.
    pub fn tick(&mut self) -> Result<()> {
        self.count += 1;
        if self.count % self.interval == 0 && self.token.is_cancelled() {
            debug!(iterations = self.count, "Scan cancelled");
            return Err(MachoError::Cancelled);
        }
        Ok(())
    }

    pub fn iterations(&self) -> usize {
        self.count
    }
}

/// Timeout configuration for async operations
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub duration: Duration,
    pub log_warnings: bool,
    pub operation_name: String,
}

impl TimeoutConfig {
    pub fn new(seconds: u64, operation: impl Into<String>) -> Self {
        Self {
            duration: Duration::from_secs(seconds),
            log_warnings: true,
            operation_name: operation.into(),
        }
    }

    /// 10 seconds
    pub fn fast(operation: impl Into<String>) -> Self {
        Self::new(FAST_TIMEOUT_SECONDS, operation)
    }

    /// 5 minutes
    pub fn default_timeout(operation: impl Into<String>) -> Self {
        Self::new(DEFAULT_TIMEOUT_SECONDS, operation)
    }
}

/// Execute an async operation with a timeout
pub async fn with_timeout<T, F>(config: TimeoutConfig, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    debug!(
        operation = %config.operation_name,
        seconds = config.duration.as_secs(),
        "Starting operation with timeout"
    );

    match timeout(config.duration, future).await {
        Ok(result) => result,
        Err(_) => {
            if config.log_warnings {
                error!(
                    operation = %config.operation_name,
                    seconds = config.duration.as_secs(),
                    "Operation timed out"
                );
            }
            Err(MachoError::Timeout {
                seconds: config.duration.as_secs(),
            })
        }
    }
}

/// Parse a container on the blocking pool, cancelling the scan on timeout.
pub async fn parse_with_timeout(
    data: Arc<[u8]>,
    parser: ParserConfig,
    config: TimeoutConfig,
) -> Result<Container> {
    let token = CancellationToken::new();
    let worker_token = token.clone();
    let seconds = config.duration.as_secs();

    let handle = tokio::task::spawn_blocking(move || {
        parse_container_with(&data, &parser, &worker_token)
    });

    match timeout(config.duration, handle).await {
        Ok(joined) => joined.map_err(|e| MachoError::Internal(format!("parse task failed: {}", e)))?,
        Err(_) => {
            token.cancel();
            if config.log_warnings {
                warn!(
                    operation = %config.operation_name,
                    seconds,
                    "Parse timed out; cancelling scan"
                );
            }
            Err(MachoError::Timeout { seconds })
        }
    }
}

/// Wall-clock bound for synchronous loops
pub struct IterationTimeout {
    start: std::time::Instant,
    max_duration: Duration,
    check_interval: usize,
    iteration_count: usize,
    operation_name: String,
}

impl IterationTimeout {
    pub fn new(seconds: u64, operation: impl Into<String>) -> Self {
        Self {
            start: std::time::Instant::now(),
            max_duration: Duration::from_secs(seconds),
            check_interval: 1000,
            iteration_count: 0,
            operation_name: operation.into(),
        }
    }

    pub fn with_check_interval(mut self, interval: usize) -> Self {
        self.check_interval = interval.max(1);
        self
    }

    /// Check if the deadline has passed; elapsed time is only read every N calls.
    pub fn check(&mut self) -> Result<()> {
        self.iteration_count += 1;

        if self.iteration_count % self.check_interval == 0 {
            let elapsed = self.start.elapsed();
            if elapsed > self.max_duration {
                error!(
                    operation = %self.operation_name,
                    iterations = self.iteration_count,
                    ?elapsed,
                    "Loop timed out"
                );
                return Err(MachoError::Timeout {
                    seconds: elapsed.as_secs(),
                });
            }
        }
        Ok(())
    }

    pub fn iterations(&self) -> usize {
        self.iteration_count
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
