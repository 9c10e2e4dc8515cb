/// per-channel notification rate limiter
///
/// fires immediately the first time, then at most once per `cooldown_ms`.
/// `reset` forgets the last fire so the next one goes through right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiter {
    cooldown_ms: u64,
    last_fired: Option<u64>,
}

impl RateLimiter {
    pub fn new(cooldown_ms: u64) -> Self {
        Self { cooldown_ms, last_fired: None }
    }

    pub fn should_fire(&self, now: u64) -> bool {
        match self.last_fired {
            None => true,
            Some(at) => now.saturating_sub(at) >= self.cooldown_ms,
        }
    }

    pub fn record_fired(&mut self, now: u64) {
        self.last_fired = Some(now);
    }

    pub fn reset(&mut self) {
        self.last_fired = None;
    }

    pub fn last_fired(&self) -> Option<u64> {
        self.last_fired
    }
}
