//! Per-credential rate limit policy.
//!
//! A quota describes per-minute/hour/day ceilings attached to an API key or
//! OAuth app. Evaluation is a pure function over window counters supplied by
//! the store; this module performs no I/O.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Per-window request ceilings attached to a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RateLimitQuota {
    pub per_minute: i32,
    pub per_hour: i32,
    pub per_day: i32,
}

impl RateLimitQuota {
    pub fn new(per_minute: i32, per_hour: i32, per_day: i32) -> Self {
        Self {
            per_minute,
            per_hour,
            per_day,
        }
    }

    /// All windows must be positive integers.
    pub fn is_valid(&self) -> bool {
        self.per_minute > 0 && self.per_hour > 0 && self.per_day > 0
    }
}

impl Default for RateLimitQuota {
    fn default() -> Self {
        Self {
            per_minute: 60,
            per_hour: 1_000,
            per_day: 10_000,
        }
    }
}

/// Observed request counts per window, as supplied by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCounters {
    pub minute: i64,
    pub hour: i64,
    pub day: i64,
}

/// The window that tripped the limit, smallest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    Minute,
    Hour,
    Day,
}

impl Window {
    fn seconds(&self) -> u64 {
        match self {
            Window::Minute => 60,
            Window::Hour => 3_600,
            Window::Day => 86_400,
        }
    }
}

/// Outcome of a quota evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub exceeded: Option<Window>,
    pub retry_after_seconds: Option<u64>,
}

impl RateLimitDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            exceeded: None,
            retry_after_seconds: None,
        }
    }

    fn deny(window: Window) -> Self {
        Self {
            allowed: false,
            exceeded: Some(window),
            retry_after_seconds: Some(window.seconds()),
        }
    }
}

/// Evaluate a quota against the counters for the current windows.
///
/// The smallest violated window decides the retry-after hint, so a caller
/// blocked on the minute window is not told to wait a day.
pub fn evaluate(quota: &RateLimitQuota, counters: &WindowCounters) -> RateLimitDecision {
    if counters.minute >= i64::from(quota.per_minute) {
        return RateLimitDecision::deny(Window::Minute);
    }
    if counters.hour >= i64::from(quota.per_hour) {
        return RateLimitDecision::deny(Window::Hour);
    }
    if counters.day >= i64::from(quota.per_day) {
        return RateLimitDecision::deny(Window::Day);
    }
    RateLimitDecision::allow()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_all_windows_is_allowed() {
        let quota = RateLimitQuota::new(10, 100, 1000);
        let counters = WindowCounters {
            minute: 5,
            hour: 50,
            day: 500,
        };
        let decision = evaluate(&quota, &counters);
        assert!(decision.allowed);
        assert_eq!(decision.exceeded, None);
    }

    #[test]
    fn minute_window_trips_first() {
        let quota = RateLimitQuota::new(10, 100, 1000);
        let counters = WindowCounters {
            minute: 10,
            hour: 100,
            day: 1000,
        };
        let decision = evaluate(&quota, &counters);
        assert!(!decision.allowed);
        assert_eq!(decision.exceeded, Some(Window::Minute));
        assert_eq!(decision.retry_after_seconds, Some(60));
    }

    #[test]
    fn hour_window_trips_when_minute_is_clear() {
        let quota = RateLimitQuota::new(10, 100, 1000);
        let counters = WindowCounters {
            minute: 0,
            hour: 100,
            day: 0,
        };
        let decision = evaluate(&quota, &counters);
        assert_eq!(decision.exceeded, Some(Window::Hour));
        assert_eq!(decision.retry_after_seconds, Some(3_600));
    }

    #[test]
    fn day_window_trips_last() {
        let quota = RateLimitQuota::new(10, 100, 1000);
        let counters = WindowCounters {
            minute: 0,
            hour: 0,
            day: 1000,
        };
        let decision = evaluate(&quota, &counters);
        assert_eq!(decision.exceeded, Some(Window::Day));
        assert_eq!(decision.retry_after_seconds, Some(86_400));
    }

    #[test]
    fn quota_validation_rejects_non_positive_fields() {
        assert!(RateLimitQuota::new(1, 1, 1).is_valid());
        assert!(!RateLimitQuota::new(0, 1, 1).is_valid());
        assert!(!RateLimitQuota::new(1, -5, 1).is_valid());
        assert!(!RateLimitQuota::new(1, 1, 0).is_valid());
    }

    #[test]
    fn exact_boundary_counts_as_exceeded() {
        // A counter equal to the ceiling means the quota is spent.
        let quota = RateLimitQuota::new(1, 10, 100);
        let counters = WindowCounters {
            minute: 1,
            hour: 0,
            day: 0,
        };
        assert!(!evaluate(&quota, &counters).allowed);
    }
}
