//! Retrying decorator around an [`Embedder`].
//!
//! Transient failures (rate-limit, 5xx, network) are retried up to
//! `max_retries` times with jittered exponential backoff; authentication and
//! quota errors are not retried and propagate immediately.

use std::thread;
use std::time::Duration;

use crate::Result;
use crate::embedding::Embedder;
use crate::error::{EmbedderError, Error};

/// Wraps an [`Embedder`], retrying transient failures with jittered
/// exponential backoff.
pub struct RetryingEmbedder<E> {
    inner: E,
    max_retries: u32,
    base_delay: Duration,
}

impl<E: Embedder> RetryingEmbedder<E> {
    /// Wraps `inner`, retrying up to `max_retries` times with backoff
    /// starting at `base_delay` and doubling each attempt.
    #[must_use]
    pub const fn new(inner: E, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1 << attempt.min(16));
        let jitter_fraction = jitter_fraction(attempt);
        exp.mul_f32(jitter_fraction)
    }

    fn is_retryable(err: &Error) -> bool {
        matches!(err, Error::Embedder(EmbedderError::Transient(_)))
    }
}

/// A deterministic pseudo-jitter in `[0.5, 1.0)` derived from the attempt
/// number, avoiding a dependency on `rand` for a single decorator.
fn jitter_fraction(attempt: u32) -> f32 {
    let seed = attempt.wrapping_mul(2_654_435_761);
    0.5 + (seed % 500) as f32 / 1000.0
}

impl<E: Embedder> Embedder for RetryingEmbedder<E> {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut attempt = 0;
        loop {
            match self.inner.embed(text) {
                Ok(embedding) => return Ok(embedding),
                Err(err) if attempt < self.max_retries && Self::is_retryable(&err) => {
                    thread::sleep(self.backoff_delay(attempt));
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0;
        loop {
            match self.inner.embed_batch(texts) {
                Ok(embeddings) => return Ok(embeddings),
                Err(err) if attempt < self.max_retries && Self::is_retryable(&err) => {
                    thread::sleep(self.backoff_delay(attempt));
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::Mutex;

    struct FlakyEmbedder {
        failures_remaining: Mutex<Cell<u32>>,
        fail_with: fn() -> Error,
    }

    impl Embedder for FlakyEmbedder {
        fn dimensions(&self) -> usize {
            4
        }

        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            let lock = self.failures_remaining.lock().unwrap_or_else(|e| e.into_inner());
            if lock.get() > 0 {
                lock.set(lock.get() - 1);
                return Err((self.fail_with)());
            }
            Ok(vec![0.0; 4])
        }
    }

    #[test]
    fn test_retries_transient_then_succeeds() {
        let embedder = RetryingEmbedder::new(
            FlakyEmbedder {
                failures_remaining: Mutex::new(Cell::new(2)),
                fail_with: || Error::Embedder(EmbedderError::Transient("boom".to_string())),
            },
            5,
            Duration::from_millis(1),
        );

        let result = embedder.embed("hi");
        assert!(result.is_ok());
    }

    #[test]
    fn test_exhausts_retries_and_fails() {
        let embedder = RetryingEmbedder::new(
            FlakyEmbedder {
                failures_remaining: Mutex::new(Cell::new(10)),
                fail_with: || Error::Embedder(EmbedderError::Transient("boom".to_string())),
            },
            2,
            Duration::from_millis(1),
        );

        assert!(embedder.embed("hi").is_err());
    }

    #[test]
    fn test_unauthorized_not_retried() {
        let embedder = RetryingEmbedder::new(
            FlakyEmbedder {
                failures_remaining: Mutex::new(Cell::new(10)),
                fail_with: || Error::Embedder(EmbedderError::Unauthorized),
            },
            5,
            Duration::from_millis(1),
        );

        let result = embedder.embed("hi");
        assert!(matches!(
            result,
            Err(Error::Embedder(EmbedderError::Unauthorized))
        ));
    }

    #[test]
    fn test_jitter_fraction_bounded() {
        for attempt in 0..20 {
            let fraction = jitter_fraction(attempt);
            assert!((0.5..1.0).contains(&fraction));
        }
    }
}
