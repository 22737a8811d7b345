//! Bounded-wait access to a single shared [`Storage`] connection.
//!
//! The teacher's storage layer uses a single `rusqlite::Connection` per
//! process. This module wraps that connection in a `parking_lot::Mutex` and
//! exposes a bounded acquire timeout, so a request that cannot get the lock
//! promptly fails fast with [`StorageError::Timeout`] instead of queuing
//! indefinitely behind a slow write. A multi-connection pool (e.g. against
//! Postgres/pgvector) is a drop-in replacement behind the same [`Storage`]
//! trait and is not implemented here.
//!
//! `SQLite`-reported [`StorageError::ConnectionLost`] conditions (the
//! connection is busy, locked, unopenable, or fails at the OS I/O level) are
//! retried in place with jittered exponential backoff, the same pattern
//! `embedding::retry::RetryingEmbedder` uses around transient provider
//! failures, up to `max_retries` before the error is propagated.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Error, Result, StorageError};
use crate::storage::Storage;

/// Default time to wait for the storage lock before giving up.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default maximum retry attempts for a [`StorageError::ConnectionLost`]
/// before it propagates to the caller.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for the connection-lost retry backoff.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// Shared handle to a single storage backend, guarded by a lock with a
/// bounded acquire timeout.
pub struct StoragePool<S: Storage> {
    inner: Arc<Mutex<S>>,
    acquire_timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl<S: Storage> Clone for StoragePool<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            acquire_timeout: self.acquire_timeout,
            max_retries: self.max_retries,
            retry_base_delay: self.retry_base_delay,
        }
    }
}

impl<S: Storage> StoragePool<S> {
    /// Wraps `storage`, bounding lock acquisition to `acquire_timeout` and
    /// retrying connection-lost failures up to [`DEFAULT_MAX_RETRIES`]
    /// times.
    #[must_use]
    pub fn new(storage: S, acquire_timeout: Duration) -> Self {
        Self::with_retry(storage, acquire_timeout, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_DELAY)
    }

    /// Wraps `storage` with explicit retry tuning for connection-lost
    /// failures.
    #[must_use]
    pub fn with_retry(storage: S, acquire_timeout: Duration, max_retries: u32, retry_base_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(storage)),
            acquire_timeout,
            max_retries,
            retry_base_delay,
        }
    }

    /// Runs `f` with exclusive access to the underlying storage, failing
    /// with [`StorageError::Timeout`] if the lock is not acquired within
    /// `acquire_timeout`. A [`StorageError::ConnectionLost`] returned by `f`
    /// is retried in place, with the lock re-acquired each attempt, up to
    /// `max_retries` times with jittered exponential backoff before it is
    /// returned to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Timeout`] on lock contention past the
    /// configured timeout, or whatever error `f` returns once the
    /// connection-lost retry budget is exhausted.
    pub fn with_storage<T>(&self, f: impl Fn(&mut S) -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            let mut guard = self
                .inner
                .try_lock_for(self.acquire_timeout)
                .ok_or(StorageError::Timeout)?;
            match f(&mut guard) {
                Ok(value) => return Ok(value),
                Err(Error::Storage(StorageError::ConnectionLost)) if attempt < self.max_retries => {
                    drop(guard);
                    std::thread::sleep(self.backoff_delay(attempt));
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.retry_base_delay.saturating_mul(1 << attempt.min(16));
        let seed = attempt.wrapping_mul(2_654_435_761);
        let jitter_fraction = 0.5 + (seed % 500) as f32 / 1000.0;
        exp.mul_f32(jitter_fraction)
    }
}
