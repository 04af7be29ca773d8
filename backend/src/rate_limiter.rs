use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{error, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Too many login attempts. Please try again in {0} minutes.")]
    Exceeded(i64),
    #[error("Internal rate limit error")]
    Unavailable,
}

#[derive(Debug)]
struct Window {
    attempts: u32,
    started: OffsetDateTime,
}

/// Fixed-window attempt counter per key.
#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
    max_attempts: u32,
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(5, 15)
    }
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window_minutes: i64) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_attempts,
            window: Duration::minutes(window_minutes),
        }
    }

    /// Counts one attempt for `key`, refusing it once the window is full.
    pub fn check(&self, key: &str) -> Result<(), RateLimitError> {
        self.check_at(key, OffsetDateTime::now_utc())
    }

    pub fn check_at(&self, key: &str, now: OffsetDateTime) -> Result<(), RateLimitError> {
        let mut windows = self.windows.lock().map_err(|e| {
            error!("Failed to acquire rate limit lock: {}", e);
            RateLimitError::Unavailable
        })?;

        windows.retain(|_, w| now - w.started <= self.window * 2);

        let window = windows
            .entry(key.to_owned())
            .or_insert(Window { attempts: 0, started: now });

        if now - window.started > self.window {
            *window = Window { attempts: 0, started: now };
        }

        if window.attempts >= self.max_attempts {
            let wait = (window.started + self.window - now).whole_minutes().max(1);
            warn!(key, "Rate limit triggered");
            return Err(RateLimitError::Exceeded(wait));
        }

        window.attempts += 1;
        Ok(())
    }

    /// Forgets a key, e.g. after a successful login.
    pub fn clear(&self, key: &str) {
        if let Ok(mut windows) = self.windows.lock() {
            windows.remove(key);
        }
    }

    pub fn remaining(&self, key: &str) -> u32 {
        let now = OffsetDateTime::now_utc();
        self.windows.lock().ok()
            .and_then(|w| w.get(key).filter(|w| now - w.started <= self.window).map(|w| w.attempts))
            .map_or(self.max_attempts, |used| self.max_attempts.saturating_sub(used))
    }
}
