//! Delay between generation retries.

use rand::Rng;
use std::time::Duration;

/// Wait applied before each retry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Retry immediately.
    #[default]
    None,

    /// Same delay before every retry.
    Fixed(Duration),

    /// `base * 2^(retry - 1)`, capped at `max`. With `jitter`, the delay is
    /// drawn uniformly from the upper half of that value.
    Exponential {
        base: Duration,
        max: Duration,
        jitter: bool,
    },
}

impl Backoff {
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Backoff::Exponential {
            base,
            max,
            jitter: true,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential { base, max, jitter } => {
                let factor = 2u32.saturating_pow(retry.saturating_sub(1));
                let delay = base.saturating_mul(factor).min(*max);
                if *jitter && !delay.is_zero() {
                    let half = delay / 2;
                    rand::thread_rng().gen_range(half..=delay)
                } else {
                    delay
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_and_fixed() {
        assert_eq!(Backoff::None.delay_for(1), Duration::ZERO);
        let fixed = Backoff::Fixed(Duration::from_millis(250));
        assert_eq!(fixed.delay_for(1), Duration::from_millis(250));
        assert_eq!(fixed.delay_for(5), Duration::from_millis(250));
    }

    #[test]
    fn test_exponential_doubles_and_caps() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(500),
            jitter: false,
        };
        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(40), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_in_upper_half() {
        let backoff = Backoff::exponential(Duration::from_millis(100), Duration::from_secs(10));
        for _ in 0..50 {
            let delay = backoff.delay_for(3);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(400));
        }
    }
}
