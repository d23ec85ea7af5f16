//! Generic sliding-window activity tracker
//!
//! One instance backs each of the four rate detectors (instant activity,
//! deletion burst, daily deletion, daily bot-invite link). `record` prunes
//! expired entries, appends the new one, and compares against the threshold,
//! so the triggering event itself counts; `record_after_check` compares
//! before appending for flows that escalate through a warning first.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// A single recorded event inside a window
#[derive(Debug, Clone)]
struct WindowEntry {
    at: DateTime<Utc>,
    // Optional sub-type label, surfaced in diagnostics only
    label: Option<&'static str>,
}

/// Prune-then-append-then-compare counter over recent timestamps, keyed by actor
pub struct SlidingWindow {
    window: Duration,
    threshold: usize,
    entries: DashMap<u64, Vec<WindowEntry>>,
}

impl SlidingWindow {
    #[must_use]
    pub fn new(window: Duration, threshold: usize) -> Self {
        Self {
            window,
            threshold,
            entries: DashMap::new(),
        }
    }

    /// Record an event for `actor` at `now` and report whether the window
    /// threshold is reached (inclusive).
    pub fn record(&self, actor: u64, now: DateTime<Utc>) -> bool {
        self.record_inner(actor, now, self.window, None)
    }

    /// Record with a per-call window override. Used by the instant-activity
    /// tracker, which watches bots over a shorter window than humans.
    pub fn record_with_window(&self, actor: u64, now: DateTime<Utc>, window: Duration) -> bool {
        self.record_inner(actor, now, window, None)
    }

    /// Record with a sub-type label kept for diagnostics.
    pub fn record_labeled(&self, actor: u64, now: DateTime<Utc>, label: &'static str) -> bool {
        self.record_inner(actor, now, self.window, Some(label))
    }

    fn record_inner(
        &self,
        actor: u64,
        now: DateTime<Utc>,
        window: Duration,
        label: Option<&'static str>,
    ) -> bool {
        let mut entries = self.entries.entry(actor).or_default();
        entries.retain(|entry| now - entry.at < window);
        entries.push(WindowEntry { at: now, label });
        entries.len() >= self.threshold
    }

    /// Prune, compare against the threshold, then append. Used where an
    /// actor already at the limit is handled before the triggering event
    /// itself counts.
    pub fn record_after_check(&self, actor: u64, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries.entry(actor).or_default();
        entries.retain(|entry| now - entry.at < self.window);
        let at_threshold = entries.len() >= self.threshold;
        entries.push(WindowEntry { at: now, label: None });
        at_threshold
    }

    /// Labels of the live entries for an actor, oldest first. Diagnostics only.
    #[must_use]
    pub fn recent_labels(&self, actor: u64) -> Vec<&'static str> {
        self.entries.get(&actor).map_or_else(Vec::new, |entries| {
            entries.iter().filter_map(|entry| entry.label).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn threshold_is_inclusive() {
        let window = SlidingWindow::new(Duration::milliseconds(1000), 2);
        assert!(!window.record(1, t0()));
        // Second event inside the window trips the threshold
        assert!(window.record(1, t0() + Duration::milliseconds(400)));
    }

    #[test]
    fn spaced_events_never_exceed() {
        let window = SlidingWindow::new(Duration::milliseconds(1000), 2);
        let mut now = t0();
        for _ in 0..10 {
            assert!(!window.record(1, now));
            now += Duration::milliseconds(1000);
        }
    }

    #[test]
    fn entries_at_exact_window_edge_are_pruned() {
        let window = SlidingWindow::new(Duration::milliseconds(1000), 2);
        assert!(!window.record(1, t0()));
        // now - t == window counts as expired
        assert!(!window.record(1, t0() + Duration::milliseconds(1000)));
    }

    #[test]
    fn actors_are_independent() {
        let window = SlidingWindow::new(Duration::hours(24), 2);
        assert!(!window.record(1, t0()));
        assert!(!window.record(2, t0()));
        assert!(window.record(1, t0() + Duration::hours(1)));
    }

    #[test]
    fn record_after_check_excludes_the_triggering_event() {
        let window = SlidingWindow::new(Duration::hours(24), 2);
        assert!(!window.record_after_check(1, t0()));
        assert!(!window.record_after_check(1, t0() + Duration::hours(1)));
        // Third event: the two prior entries already sit at the threshold
        assert!(window.record_after_check(1, t0() + Duration::hours(2)));
    }

    #[test]
    fn per_call_window_override() {
        let window = SlidingWindow::new(Duration::milliseconds(1000), 2);
        let short = Duration::milliseconds(500);
        assert!(!window.record_with_window(1, t0(), short));
        // 600ms later: outside the short window, inside the default one
        assert!(!window.record_with_window(1, t0() + Duration::milliseconds(600), short));
        assert!(window.record_with_window(1, t0() + Duration::milliseconds(900), short));
    }

    #[test]
    fn labels_survive_for_diagnostics() {
        let window = SlidingWindow::new(Duration::milliseconds(1000), 2);
        assert!(!window.record_labeled(1, t0(), "channel"));
        assert!(window.record_labeled(1, t0() + Duration::milliseconds(100), "role"));
        assert_eq!(window.recent_labels(1), vec!["channel", "role"]);
    }

    #[test]
    fn daily_window_counts_across_hours() {
        let window = SlidingWindow::new(Duration::hours(24), 2);
        assert!(!window.record(1, t0()));
        assert!(window.record(1, t0() + Duration::hours(6)));
        // A day later both are gone
        assert!(!window.record(1, t0() + Duration::hours(31)));
    }
}
