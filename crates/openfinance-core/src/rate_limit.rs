use crate::settings::PlatformSettings;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Which admission-control budget a request draws from (§4.2 defaults: 500 rpm AIS,
/// 1000 rpm general).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeClass {
    Ais,
    General,
}

#[derive(Debug, Clone, Copy)]
pub enum RateLimitOutcome {
    Allowed,
    Denied { retry_after: Duration },
}

struct WindowEntry {
    count: u32,
    window_start: Instant,
}

/// Per-`(participant, scope)` sliding window with a token-bucket-style burst allowance
/// (C9). Admission state is process-local; it is not part of the persisted data model.
pub struct RateLimiter {
    ais_limit: u32,
    general_limit: u32,
    burst_pct: u32,
    window: Duration,
    state: Mutex<HashMap<(String, ScopeClass), WindowEntry>>,
    bulk_concurrency_limit: u32,
    bulk_in_flight: Mutex<HashMap<String, HashSet<String>>>,
}

impl RateLimiter {
    pub fn new(settings: &PlatformSettings) -> Self {
        Self {
            ais_limit: settings.rate_limit_ais_rpm,
            general_limit: settings.rate_limit_general_rpm,
            burst_pct: settings.rate_limit_burst_pct,
            window: Duration::from_secs(60),
            state: Mutex::new(HashMap::new()),
            bulk_concurrency_limit: settings.rate_limit_max_concurrent_bulk_per_participant,
            bulk_in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn base_limit(&self, scope_class: ScopeClass) -> u32 {
        match scope_class {
            ScopeClass::Ais => self.ais_limit,
            ScopeClass::General => self.general_limit,
        }
    }

    /// Admit or deny one request for `participant_id` under `scope_class`, recording it
    /// against the sliding window as a side effect.
    pub fn check(&self, participant_id: &str, scope_class: ScopeClass) -> RateLimitOutcome {
        let base = self.base_limit(scope_class);
        let burst = base.saturating_mul(self.burst_pct) / 100;
        let limit = base + burst;

        let mut state = self.state.lock().expect("rate limiter mutex poisoned");
        let now = Instant::now();
        let key = (participant_id.to_string(), scope_class);
        let entry = state.entry(key).or_insert(WindowEntry { count: 0, window_start: now });

        if now.duration_since(entry.window_start) >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;

        if entry.count > limit {
            let reset_at = entry.window_start + self.window;
            RateLimitOutcome::Denied { retry_after: reset_at.saturating_duration_since(now) }
        } else {
            RateLimitOutcome::Allowed
        }
    }

    /// Admit one concurrent bulk-file submission for `participant_id`, tracked by
    /// `file_id` (C9: `rate_limit_max_concurrent_bulk_per_participant` in-flight files).
    /// Callers must pair a successful admission with `release_bulk_submission` once the
    /// file either fails to be created or later reaches a terminal status.
    pub fn begin_bulk_submission(&self, participant_id: &str, file_id: &str) -> RateLimitOutcome {
        let mut in_flight = self.bulk_in_flight.lock().expect("rate limiter mutex poisoned");
        let entry = in_flight.entry(participant_id.to_string()).or_insert_with(HashSet::new);

        if entry.len() as u32 >= self.bulk_concurrency_limit {
            RateLimitOutcome::Denied { retry_after: Duration::from_secs(1) }
        } else {
            entry.insert(file_id.to_string());
            RateLimitOutcome::Allowed
        }
    }

    /// Release a concurrent bulk-file slot. Idempotent: releasing a `file_id` that is
    /// not (or no longer) tracked is a no-op, so a file polled past its terminal status
    /// more than once does not under-count the participant's in-flight budget.
    pub fn release_bulk_submission(&self, participant_id: &str, file_id: &str) {
        let mut in_flight = self.bulk_in_flight.lock().expect("rate limiter mutex poisoned");
        if let Some(entry) = in_flight.get_mut(participant_id) {
            entry.remove(file_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_requests_within_base_limit() {
        let mut settings = PlatformSettings::default();
        settings.rate_limit_ais_rpm = 5;
        settings.rate_limit_burst_pct = 0;
        let limiter = RateLimiter::new(&settings);

        for _ in 0..5 {
            assert!(matches!(limiter.check("tpp-1", ScopeClass::Ais), RateLimitOutcome::Allowed));
        }
    }

    #[test]
    fn denies_once_burst_is_exhausted() {
        let mut settings = PlatformSettings::default();
        settings.rate_limit_ais_rpm = 2;
        settings.rate_limit_burst_pct = 50;
        let limiter = RateLimiter::new(&settings);

        assert!(matches!(limiter.check("tpp-2", ScopeClass::Ais), RateLimitOutcome::Allowed));
        assert!(matches!(limiter.check("tpp-2", ScopeClass::Ais), RateLimitOutcome::Allowed));
        assert!(matches!(limiter.check("tpp-2", ScopeClass::Ais), RateLimitOutcome::Allowed));
        assert!(matches!(limiter.check("tpp-2", ScopeClass::Ais), RateLimitOutcome::Denied { .. }));
    }

    #[test]
    fn participants_are_tracked_independently() {
        let mut settings = PlatformSettings::default();
        settings.rate_limit_general_rpm = 1;
        settings.rate_limit_burst_pct = 0;
        let limiter = RateLimiter::new(&settings);

        assert!(matches!(limiter.check("tpp-a", ScopeClass::General), RateLimitOutcome::Allowed));
        assert!(matches!(limiter.check("tpp-b", ScopeClass::General), RateLimitOutcome::Allowed));
        assert!(matches!(limiter.check("tpp-a", ScopeClass::General), RateLimitOutcome::Denied { .. }));
    }

    #[test]
    fn denies_bulk_submission_once_concurrency_cap_is_reached() {
        let mut settings = PlatformSettings::default();
        settings.rate_limit_max_concurrent_bulk_per_participant = 2;
        let limiter = RateLimiter::new(&settings);

        assert!(matches!(
            limiter.begin_bulk_submission("tpp-3", "file-1"),
            RateLimitOutcome::Allowed
        ));
        assert!(matches!(
            limiter.begin_bulk_submission("tpp-3", "file-2"),
            RateLimitOutcome::Allowed
        ));
        assert!(matches!(
            limiter.begin_bulk_submission("tpp-3", "file-3"),
            RateLimitOutcome::Denied { .. }
        ));
    }

    #[test]
    fn releasing_a_file_frees_its_slot_for_reuse() {
        let mut settings = PlatformSettings::default();
        settings.rate_limit_max_concurrent_bulk_per_participant = 1;
        let limiter = RateLimiter::new(&settings);

        assert!(matches!(
            limiter.begin_bulk_submission("tpp-4", "file-1"),
            RateLimitOutcome::Allowed
        ));
        assert!(matches!(
            limiter.begin_bulk_submission("tpp-4", "file-2"),
            RateLimitOutcome::Denied { .. }
        ));

        limiter.release_bulk_submission("tpp-4", "file-1");
        assert!(matches!(
            limiter.begin_bulk_submission("tpp-4", "file-2"),
            RateLimitOutcome::Allowed
        ));
    }

    #[test]
    fn releasing_an_untracked_file_is_a_harmless_no_op() {
        let mut settings = PlatformSettings::default();
        settings.rate_limit_max_concurrent_bulk_per_participant = 1;
        let limiter = RateLimiter::new(&settings);

        limiter.release_bulk_submission("tpp-5", "never-submitted");
        assert!(matches!(
            limiter.begin_bulk_submission("tpp-5", "file-1"),
            RateLimitOutcome::Allowed
        ));
    }
}
