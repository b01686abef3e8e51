use log::debug;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

pub const DEFAULT_MAX_CALLS: usize = 2;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Sliding-window throttle: at most `max_calls` in any `window`.
///
/// A slot is taken when [`acquire`](Self::acquire) returns, whether or not the
/// guarded call later succeeds.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        let max_calls = max_calls.max(1);
        Self {
            max_calls,
            window,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    /// Wait until a call is allowed, then record it.
    pub async fn acquire(&self) {
        let mut calls = self.calls.lock().await;

        if calls.len() >= self.max_calls {
            if let Some(oldest) = calls.front().copied() {
                let elapsed = oldest.elapsed();
                if elapsed < self.window {
                    let wait = self.window - elapsed;
                    debug!("Rate limit reached, sleeping {:?}", wait);
                    sleep(wait).await;
                }
            }
            calls.pop_front();
        }

        calls.push_back(Instant::now());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALLS, DEFAULT_WINDOW)
    }
}
