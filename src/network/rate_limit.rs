//! Fixed-window rate limiting for authentication attempts, keyed by
//! hashed source IP.

use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::time::{Duration, Instant};

use rustc_hash::{FxHashMap, FxHasher};

pub const MAX_ATTEMPTS: u32 = 5;
pub const WINDOW: Duration = Duration::from_secs(60);

struct Attempt {
    count: u32,
    window_start: Instant,
}

/// Allows at most [`MAX_ATTEMPTS`] per [`WINDOW`] per source IP. The
/// window restarts once it has fully elapsed.
#[derive(Default)]
pub struct RateLimiter {
    attempts: FxHashMap<u64, Attempt>,
}

impl RateLimiter {
    /// Records one attempt from `ip`. Returns `false` when the caller
    /// should reject the request.
    pub fn check(&mut self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&mut self, ip: IpAddr, now: Instant) -> bool {
        let attempt = self.attempts.entry(hash_ip(ip)).or_insert(Attempt {
            count: 0,
            window_start: now,
        });

        if now.duration_since(attempt.window_start) > WINDOW {
            attempt.count = 0;
            attempt.window_start = now;
        }

        if attempt.count >= MAX_ATTEMPTS {
            return false;
        }

        attempt.count += 1;
        true
    }
}

fn hash_ip(ip: IpAddr) -> u64 {
    let mut hasher = FxHasher::default();
    ip.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, last))
    }

    #[test]
    fn sixth_attempt_in_the_window_is_rejected() {
        let mut limiter = RateLimiter::default();
        let start = Instant::now();

        for i in 0..5 {
            assert!(
                limiter.check_at(ip(1), start + Duration::from_secs(i)),
                "attempt {i} should pass"
            );
        }

        assert!(!limiter.check_at(ip(1), start + Duration::from_secs(10)));
    }

    #[test]
    fn window_resets_after_it_elapses() {
        let mut limiter = RateLimiter::default();
        let start = Instant::now();

        for _ in 0..6 {
            limiter.check_at(ip(1), start);
        }
        assert!(!limiter.check_at(ip(1), start + Duration::from_secs(30)));

        // 61 seconds after the window opened, attempts pass again.
        assert!(limiter.check_at(ip(1), start + Duration::from_secs(61)));
    }

    #[test]
    fn addresses_are_limited_independently() {
        let mut limiter = RateLimiter::default();
        let start = Instant::now();

        for _ in 0..MAX_ATTEMPTS {
            assert!(limiter.check_at(ip(1), start));
        }
        assert!(!limiter.check_at(ip(1), start));
        assert!(limiter.check_at(ip(2), start));
    }
}
