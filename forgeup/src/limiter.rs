//! Per-stage concurrency limiter.
//!
//! Each stage (fetch, clone, install) owns its own [`StageLimiter`], so the
//! limits never share capacity. A job holds a [`StagePermit`] for as long as
//! it runs; dropping the permit releases the slot.
//!
//! ```text
//! fetch limiter   (8) ──► aria2c / HTTP stream jobs
//! clone limiter   (6) ──► git clone jobs
//! install limiter (3) ──► uv pip install jobs
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded counting limiter for one pipeline stage.
#[derive(Debug)]
pub struct StageLimiter {
    semaphore: Arc<Semaphore>,
    permits: usize,
    in_flight: Arc<AtomicUsize>,
    label: String,
}

impl StageLimiter {
    /// Creates a limiter allowing `permits` concurrent jobs (minimum 1).
    pub fn new(permits: usize, label: impl Into<String>) -> Self {
        let permits = permits.max(1);
        let label = label.into();

        tracing::debug!(permits, label = %label, "Created stage limiter");

        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            permits,
            in_flight: Arc::new(AtomicUsize::new(0)),
            label,
        }
    }

    /// Waits for a free slot.
    ///
    /// The semaphore is never closed, so this only returns `None` if that
    /// invariant is broken.
    pub async fn acquire(&self) -> Option<StagePermit> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await.ok()?;
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        Some(StagePermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Returns the label used in logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the configured number of permits.
    pub fn permits(&self) -> usize {
        self.permits
    }

    /// Returns the number of jobs currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Returns the number of free slots.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// A slot in a [`StageLimiter`], released on drop.
pub struct StagePermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for StagePermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_minimum_one_permit() {
        let limiter = StageLimiter::new(0, "test");
        assert_eq!(limiter.permits(), 1);
        assert_eq!(limiter.available(), 1);
        assert_eq!(limiter.label(), "test");
    }

    #[tokio::test]
    async fn test_permits_tracked_and_released() {
        let limiter = StageLimiter::new(2, "test");

        let a = limiter.acquire().await.unwrap();
        let b = limiter.acquire().await.unwrap();
        assert_eq!(limiter.in_flight(), 2);
        assert_eq!(limiter.available(), 0);

        drop(a);
        assert_eq!(limiter.in_flight(), 1);
        assert_eq!(limiter.available(), 1);

        drop(b);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_bounds_concurrent_jobs() {
        let limiter = Arc::new(StageLimiter::new(3, "bounded"));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs = (0..12).map(|_| {
            let limiter = Arc::clone(&limiter);
            let peak = Arc::clone(&peak);
            async move {
                let _permit = limiter.acquire().await.unwrap();
                peak.fetch_max(limiter.in_flight(), Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });
        futures::future::join_all(jobs).await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_limiters_are_independent() {
        let fetch = StageLimiter::new(1, "fetch");
        let install = StageLimiter::new(1, "install");

        let _held = fetch.acquire().await.unwrap();
        assert_eq!(fetch.available(), 0);
        assert_eq!(install.available(), 1);
        assert!(install.acquire().await.is_some());
    }
}
