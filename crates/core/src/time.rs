use chrono::{DateTime, Duration, Utc};

/// Time source injected into services so tests can pin "now".
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn system() -> Self {
        Self::System
    }

    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// Moves a fixed clock forward. No effect on the system clock.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }

    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Clock::Fixed(_))
    }
}

/// Elapsed-time tracker behind the per-minute "time spent" ticks of an open
/// activity view.
///
/// The view owns the timer and drops it on teardown; only the reported
/// minutes are ever persisted (as a draft's `time_spent`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityTimer {
    started_at: DateTime<Utc>,
    base_minutes: u32,
}

impl ActivityTimer {
    /// Starts counting from `now`, on top of minutes already recorded.
    #[must_use]
    pub fn resume(now: DateTime<Utc>, base_minutes: u32) -> Self {
        Self {
            started_at: now,
            base_minutes,
        }
    }

    /// Whole minutes spent, including the base. Never decreases below the
    /// base even if `now` is earlier than the start.
    #[must_use]
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> u32 {
        let minutes = now.signed_duration_since(self.started_at).num_minutes().max(0);
        let minutes = u32::try_from(minutes).unwrap_or(u32::MAX);
        self.base_minutes.saturating_add(minutes)
    }
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z, a Tuesday).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let mut clock = fixed_clock();
        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), fixed_now() + Duration::minutes(5));
    }

    #[test]
    fn system_clock_ignores_advance() {
        let mut clock = Clock::system();
        clock.advance(Duration::days(365));
        assert!(!clock.is_fixed());
        assert!(clock.now() < Utc::now() + Duration::days(1));
    }

    #[test]
    fn timer_counts_whole_minutes_on_top_of_base() {
        let timer = ActivityTimer::resume(fixed_now(), 4);
        assert_eq!(timer.elapsed_minutes(fixed_now() + Duration::seconds(59)), 4);
        assert_eq!(timer.elapsed_minutes(fixed_now() + Duration::minutes(3)), 7);
        assert_eq!(timer.elapsed_minutes(fixed_now() - Duration::minutes(3)), 4);
    }
}
