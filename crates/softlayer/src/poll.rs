//! Bounded polling with injected time.
//!
//! The provisioning poll and the readiness wait both run one attempt per
//! [`POLL_INTERVAL`] for `timeout / 60` attempts. Sleeping goes through a
//! [`Sleeper`] so tests can run the loops without real delays.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

/// Delay between poll attempts.
pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Readiness wait bound, in seconds.
pub const READY_TIMEOUT_SECS: u64 = 120;

/// SSH port probed for reachability.
pub const SSH_PORT: u16 = 22;

/// Iterator over 1-based poll attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    attempts: u64,
    next: u64,
}

impl PollBudget {
    /// One attempt per full poll interval of `timeout_secs`.
    #[must_use]
    pub fn from_timeout(timeout_secs: u64) -> Self {
        Self {
            attempts: timeout_secs / POLL_INTERVAL.as_secs(),
            next: 1,
        }
    }

    /// Total attempts allowed.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Whether `attempt` is the final one.
    #[must_use]
    pub fn is_last(&self, attempt: u64) -> bool {
        attempt >= self.attempts
    }
}

impl Iterator for PollBudget {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.next > self.attempts {
            return None;
        }
        let attempt = self.next;
        self.next += 1;
        Some(attempt)
    }
}

/// Source of delays.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real delays on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Whether a machine accepts connections.
#[async_trait]
pub trait Reachability: Send + Sync {
    async fn is_reachable(&self, address: &str) -> bool;
}

/// TCP connect probe.
#[derive(Debug, Clone, Copy)]
pub struct TcpProbe {
    port: u16,
    connect_timeout: Duration,
}

impl TcpProbe {
    #[must_use]
    pub fn new(port: u16, connect_timeout: Duration) -> Self {
        Self {
            port,
            connect_timeout,
        }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(SSH_PORT, Duration::from_secs(5))
    }
}

#[async_trait]
impl Reachability for TcpProbe {
    async fn is_reachable(&self, address: &str) -> bool {
        let connect = TcpStream::connect((address, self.port));
        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(address = %address, port = self.port, error = %e, "Connection attempt failed");
                false
            }
            Err(_) => {
                debug!(address = %address, port = self.port, "Connection attempt timed out");
                false
            }
        }
    }
}
