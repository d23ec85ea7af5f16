//! Two-state warning ledgers
//!
//! Offenders get exactly one warning before enforcement. The first offense
//! records the actor and returns `Offense::First`; the second clears the
//! record and returns `Offense::Second`, so a third offense after enforcement
//! starts the cycle over.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Outcome of recording an offense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offense {
    First,
    Second,
}

/// Per-actor warn-once ledger.
#[derive(Default)]
pub struct WarningLedger {
    warned: DashMap<u64, DateTime<Utc>>,
}

impl WarningLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an offense for `actor` and report whether it is the first
    /// (warn) or second (enforce). The second offense clears the record.
    pub fn escalate(&self, actor: u64, now: DateTime<Utc>) -> Offense {
        if self.warned.remove(&actor).is_some() {
            Offense::Second
        } else {
            self.warned.insert(actor, now);
            Offense::First
        }
    }

}
