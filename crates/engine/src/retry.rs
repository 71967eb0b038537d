//! Execution and retry engine
//!
//! Every top-level `execute` call runs through [`Runner::run`]:
//!
//! 1. **Acquire**: reuse a caller-supplied connection (borrowed), a connection
//!    kept open by an earlier call, or open a new one (owned).
//! 2. **Configure**: force `READ UNCOMMITTED` on the session. Owned sessions
//!    get their language pinned when opened.
//! 3. **Attempt**: run the command's step once.
//! 4. **Classify**: a lock timeout extends the attempt budget by one and
//!    triggers a single blocking-session report per call.
//! 5. **Release**: close owned connections unless keep-alive was requested
//!    and the attempt succeeded. A failed owned connection is never reused.
//!
//! Attempts stop at the first of: success, a non-retryable error, the
//! attempt budget, the wall-clock ceiling, or a step cancelling retries. The
//! engine sleeps only when another attempt follows.

use crate::config::EngineConfig;
use crate::connection::{DbConnection, Ownership};
use crate::context::EngineContext;
use crate::diagnostics;
use crate::driver::IsolationLevel;
use parking_lot::Mutex;
use quarry_core::{Limits, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// ============================================================================
// Retry Policy
// ============================================================================

/// Attempt budget and pacing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per call when retrying is enabled (0 behaves as 1)
    pub retry_count: usize,
    /// Pause before another attempt
    pub interval: Duration,
    /// Wall-clock bound; no attempt starts after it
    pub ceiling: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: 2,
            interval: Duration::from_millis(1000),
            ceiling: Duration::from_millis(40_000),
        }
    }
}

impl RetryPolicy {
    /// Default policy
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy with a single attempt
    pub fn no_retry() -> Self {
        Self {
            retry_count: 1,
            ..Default::default()
        }
    }

    /// Set the attempt count
    pub fn with_retry_count(mut self, retry_count: usize) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Set the pause between attempts
    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval = Duration::from_millis(interval_ms);
        self
    }

    /// Set the wall-clock ceiling
    pub fn with_ceiling_ms(mut self, ceiling_ms: u64) -> Self {
        self.ceiling = Duration::from_millis(ceiling_ms);
        self
    }

    /// Maximum attempts for one call.
    ///
    /// `retry_count` when retrying is enabled, otherwise one; plus one once a
    /// lock timeout has been observed.
    pub fn max_attempts(&self, retry_on_error: bool, lock_seen: bool) -> usize {
        let base = if retry_on_error {
            self.retry_count.max(1)
        } else {
            1
        };
        base + usize::from(lock_seen)
    }
}

// ============================================================================
// Clocks
// ============================================================================

/// Time source for retry pacing
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;
    /// Block for `duration`
    fn sleep(&self, duration: Duration);
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that records sleeps and advances only when told to
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Clock at offset zero
    pub fn new() -> Self {
        ManualClock {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Move time forward without recording a sleep
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }

    /// Sleeps requested so far
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        self.advance(duration);
    }
}

// ============================================================================
// Runner
// ============================================================================

/// What a command step sees during one attempt
pub struct Attempt<'a> {
    connection: &'a DbConnection,
    ownership: Ownership,
    config: &'a EngineConfig,
    cancel_retry: bool,
}

impl<'a> Attempt<'a> {
    /// Working connection
    pub fn connection(&self) -> &'a DbConnection {
        self.connection
    }

    /// Whether the engine opened the connection
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Engine configuration
    pub fn config(&self) -> &'a EngineConfig {
        self.config
    }

    /// Statement synthesis limits
    pub fn limits(&self) -> Limits {
        self.config.limits()
    }

    /// Prevent further attempts after this one, whatever its result
    pub fn cancel_retry(&mut self) {
        self.cancel_retry = true;
    }
}

/// Connection slot and retry loop shared by every command
pub(crate) struct Runner {
    ctx: Arc<EngineContext>,
    connection_string: Option<String>,
    borrowed: Option<DbConnection>,
    kept: Option<DbConnection>,
}

impl Runner {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Runner {
            ctx,
            connection_string: None,
            borrowed: None,
            kept: None,
        }
    }

    /// A runner for a derived command: same connection source, nothing kept.
    pub(crate) fn fork(&self) -> Runner {
        Runner {
            ctx: Arc::clone(&self.ctx),
            connection_string: self.connection_string.clone(),
            borrowed: self.borrowed.clone(),
            kept: None,
        }
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub(crate) fn set_connection_string(&mut self, connection_string: String) {
        self.release_kept();
        self.connection_string = Some(connection_string);
    }

    pub(crate) fn set_borrowed(&mut self, connection: DbConnection) {
        self.release_kept();
        self.borrowed = Some(connection);
    }

    /// Run `step` under the retry policy.
    pub(crate) fn run<T, F>(
        &mut self,
        label: &'static str,
        keep_open: bool,
        retry_on_error: bool,
        mut step: F,
    ) -> Result<T>
    where
        F: FnMut(&mut Attempt<'_>) -> Result<T>,
    {
        let policy = self.ctx.config.retry_policy();
        let clock = Arc::clone(&self.ctx.clock);
        let started = clock.now();
        let mut attempts = 0usize;
        let mut lock_seen = false;
        let mut reported = false;

        loop {
            attempts += 1;
            let mut cancelled = false;
            let err = match self.attempt_once(keep_open, &mut step, &mut cancelled) {
                Ok(value) => {
                    debug!(target: "quarry::engine", command = label, attempts, "Command succeeded");
                    return Ok(value);
                }
                Err(e) => e,
            };

            if err.is_transient_lock() {
                lock_seen = true;
                if !reported && self.ctx.config.lock_diagnostics {
                    reported = true;
                    diagnostics::spawn_lock_report(
                        Arc::clone(&self.ctx.connector),
                        self.connection_string().to_string(),
                        self.ctx.config.probe_timeout(),
                    );
                }
            }

            let max = policy.max_attempts(retry_on_error, lock_seen);
            let elapsed = clock.now().saturating_duration_since(started);
            let retry = err.is_retryable()
                && !cancelled
                && attempts < max
                && elapsed + policy.interval <= policy.ceiling;
            if !retry {
                return Err(err);
            }

            warn!(
                target: "quarry::engine",
                command = label,
                attempt = attempts,
                max_attempts = max,
                error = %err,
                "Attempt failed, retrying"
            );
            clock.sleep(policy.interval);
        }
    }

    fn connection_string(&self) -> &str {
        self.connection_string
            .as_deref()
            .unwrap_or(&self.ctx.connection_string)
    }

    fn attempt_once<T, F>(&mut self, keep_open: bool, step: &mut F, cancelled: &mut bool) -> Result<T>
    where
        F: FnMut(&mut Attempt<'_>) -> Result<T>,
    {
        let (connection, ownership) = self.acquire()?;
        let configured = connection
            .session()
            .set_isolation(IsolationLevel::ReadUncommitted);
        let result = configured.and_then(|_| {
            let mut attempt = Attempt {
                connection: &connection,
                ownership,
                config: &self.ctx.config,
                cancel_retry: false,
            };
            let result = step(&mut attempt);
            *cancelled = attempt.cancel_retry;
            result
        });
        self.release(connection, ownership, keep_open && result.is_ok());
        result
    }

    fn acquire(&mut self) -> Result<(DbConnection, Ownership)> {
        if let Some(connection) = &self.borrowed {
            return Ok((connection.clone(), Ownership::Borrowed));
        }
        if let Some(connection) = self.kept.take() {
            return Ok((connection, Ownership::Owned));
        }
        let connection =
            DbConnection::open(self.ctx.connector.as_ref(), self.connection_string())?;
        debug!(target: "quarry::engine", "Opened connection");
        Ok((connection, Ownership::Owned))
    }

    fn release(&mut self, connection: DbConnection, ownership: Ownership, keep: bool) {
        match ownership {
            Ownership::Borrowed => {}
            Ownership::Owned if keep => self.kept = Some(connection),
            Ownership::Owned => close_quietly(&connection),
        }
    }

    fn release_kept(&mut self) {
        if let Some(connection) = self.kept.take() {
            close_quietly(&connection);
        }
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.release_kept();
    }
}

fn close_quietly(connection: &DbConnection) {
    match connection.close() {
        Ok(()) => debug!(target: "quarry::engine", "Closed connection"),
        Err(e) => warn!(target: "quarry::engine", error = %e, "Failed to close connection"),
    }
}
