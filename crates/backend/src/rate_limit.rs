//! Sliding-window admission gate for ingestion runs.
//!
//! State is held in memory and resets on process restart; this is an
//! accepted limitation. The gate is a cost control, not a correctness
//! mechanism — duplicate suppression is owned by the database uniqueness
//! constraint on `(user_id, gmail_id)`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-key sliding-window rate gate.
pub struct RateGate {
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateGate {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject a request for `key`, allowing at most `limit`
    /// admissions per trailing `window`. Admission records the current time.
    pub fn admit(&self, key: &str, limit: usize, window: Duration) -> bool {
        self.admit_at(key, limit, window, Instant::now())
    }

    fn admit_at(&self, key: &str, limit: usize, window: Duration, now: Instant) -> bool {
        let mut clients = self.clients.lock().expect("rate gate lock poisoned");
        let entries = clients.entry(key.to_string()).or_default();

        // Evict timestamps that fell out of the window
        while let Some(front) = entries.front() {
            if now.duration_since(*front) > window {
                entries.pop_front();
            } else {
                break;
            }
        }

        if entries.len() >= limit {
            return false;
        }

        entries.push_back(now);
        true
    }
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(300);

    #[test]
    fn test_exactly_limit_admissions_within_window() {
        let gate = RateGate::new();
        let t0 = Instant::now();

        let admitted = (0..10)
            .filter(|_| gate.admit_at("user_1", 5, WINDOW, t0))
            .count();
        assert_eq!(admitted, 5);
    }

    #[test]
    fn test_admission_after_window_elapses() {
        let gate = RateGate::new();
        let t0 = Instant::now();

        for _ in 0..5 {
            assert!(gate.admit_at("user_1", 5, WINDOW, t0));
        }
        assert!(!gate.admit_at("user_1", 5, WINDOW, t0));

        // 301 seconds later the t0 entries have aged out
        let t301 = t0 + Duration::from_secs(301);
        assert!(gate.admit_at("user_1", 5, WINDOW, t301));
    }

    #[test]
    fn test_keys_are_isolated() {
        let gate = RateGate::new();
        let t0 = Instant::now();

        for _ in 0..5 {
            assert!(gate.admit_at("user_1", 5, WINDOW, t0));
        }
        assert!(!gate.admit_at("user_1", 5, WINDOW, t0));
        assert!(gate.admit_at("user_2", 5, WINDOW, t0));
    }

    #[test]
    fn test_partial_eviction_keeps_recent_entries() {
        let gate = RateGate::new();
        let t0 = Instant::now();
        let t200 = t0 + Duration::from_secs(200);
        let t301 = t0 + Duration::from_secs(301);

        for _ in 0..3 {
            assert!(gate.admit_at("user_1", 5, WINDOW, t0));
        }
        for _ in 0..2 {
            assert!(gate.admit_at("user_1", 5, WINDOW, t200));
        }
        assert!(!gate.admit_at("user_1", 5, WINDOW, t200));

        // At t=301 only the t0 entries expired: 2 remain, 3 slots free
        assert!(gate.admit_at("user_1", 5, WINDOW, t301));
        assert!(gate.admit_at("user_1", 5, WINDOW, t301));
        assert!(gate.admit_at("user_1", 5, WINDOW, t301));
        assert!(!gate.admit_at("user_1", 5, WINDOW, t301));
    }
}
