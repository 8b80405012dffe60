use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

use crate::domain::UserId;

/// Outcome of an admission check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Rejected; the user may retry once `retry_after` has elapsed.
    Limited { retry_after: Duration },
}

/// Per-user sliding-window admission control.
///
/// Admits while the user's window holds fewer than `max_requests` timestamps
/// younger than `window`, so at most `max_requests` requests land in any
/// sliding window. Timestamps aged `window` or more are evicted before every
/// decision.
///
/// The limiter is not internally synchronized; callers that dispatch
/// concurrently hold it behind a mutex.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: HashMap<UserId, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests as usize,
            window,
            requests: HashMap::new(),
        }
    }

    pub fn admit(&mut self, user_id: UserId) -> Admission {
        self.admit_at(user_id, Instant::now())
    }

    pub fn admit_at(&mut self, user_id: UserId, now: Instant) -> Admission {
        let window = self.window;
        let recent = self.requests.entry(user_id).or_default();

        while recent
            .front()
            .map_or(false, |&t| now.duration_since(t) >= window)
        {
            recent.pop_front();
        }

        if recent.len() >= self.max_requests {
            // The slot freed next is the oldest surviving timestamp's.
            let retry_after = recent
                .front()
                .map(|&oldest| (oldest + window).saturating_duration_since(now))
                .unwrap_or_default();
            return Admission::Limited { retry_after };
        }

        recent.push_back(now);
        Admission::Admitted
    }
}
