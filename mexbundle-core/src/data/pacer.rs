//! Request pacing for the upstream rate limit.
//!
//! The exchange throttles anonymous clients. The pacer enforces a minimum
//! interval between consecutive requests; with a zero interval it never waits.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Enforces a minimum gap between requests.
#[derive(Debug)]
pub struct RequestPacer {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    fn last(&self) -> MutexGuard<'_, Option<Instant>> {
        self.last_request.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until the next request is allowed, then record it as sent.
    pub fn wait(&self) {
        let mut last = self.last();
        if let Some(at) = *last {
            let remaining = self.min_interval.saturating_sub(at.elapsed());
            if !remaining.is_zero() {
                std::thread::sleep(remaining);
            }
        }
        *last = Some(Instant::now());
    }
}
