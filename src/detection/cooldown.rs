//! Per-actor cooldown gates
//!
//! Two flavours live here. `CooldownGate` covers structural guild actions
//! (channel/category/role create and delete): the first observed action for
//! an actor starts a 24h cooldown, and further actions of the same kind
//! inside that period are violations without extending it. `BotAddCooldown`
//! is explicitly installed when a whitelisted member adds a bot and blocks
//! further bot additions by the same member until it lapses.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Structural actions that each carry an independent cooldown per actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CooldownAction {
    ChannelCreate,
    CategoryCreate,
    RoleCreate,
    ChannelDelete,
    RoleDelete,
}

impl CooldownAction {
    /// Human-readable action name used in punishment reasons.
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::ChannelCreate => "channel creation",
            Self::CategoryCreate => "category creation",
            Self::RoleCreate => "role creation",
            Self::ChannelDelete => "channel deletion",
            Self::RoleDelete => "role deletion",
        }
    }
}

/// Gate that blocks repeat structural actions inside the cooldown period.
pub struct CooldownGate {
    period: Duration,
    started: DashMap<(u64, CooldownAction), DateTime<Utc>>,
}

impl CooldownGate {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            started: DashMap::new(),
        }
    }

    /// Record an action and report whether it violates an active cooldown.
    ///
    /// A violation does not rebase the cooldown start, so the gate reopens a
    /// fixed period after the first action regardless of violations in
    /// between.
    pub fn check(&self, actor: u64, action: CooldownAction, now: DateTime<Utc>) -> bool {
        match self.started.entry((actor, action)) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if now - *occupied.get() < self.period {
                    return true;
                }
                // Expired: this action starts a fresh cooldown
                occupied.insert(now);
                false
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(now);
                false
            }
        }
    }
}

/// Cooldown on adding bots, installed explicitly for whitelisted members.
pub struct BotAddCooldown {
    period: Duration,
    installed: DashMap<u64, DateTime<Utc>>,
}

impl BotAddCooldown {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            installed: DashMap::new(),
        }
    }

    /// Start (or restart) the cooldown for an actor.
    pub fn install(&self, actor: u64, now: DateTime<Utc>) {
        self.installed.insert(actor, now);
    }

    /// Time left on the actor's cooldown, if one is active.
    #[must_use]
    pub fn remaining(&self, actor: u64, now: DateTime<Utc>) -> Option<Duration> {
        let started = self.installed.get(&actor).map(|at| *at)?;
        let elapsed = now - started;
        if elapsed < self.period {
            Some(self.period - elapsed)
        } else {
            self.installed.remove(&actor);
            None
        }
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
    fn first_action_starts_cooldown_without_violation() {
        let gate = CooldownGate::new(Duration::hours(24));
        assert!(!gate.check(1, CooldownAction::ChannelCreate, t0()));
    }

    #[test]
    fn repeat_inside_period_violates() {
        let gate = CooldownGate::new(Duration::hours(24));
        assert!(!gate.check(1, CooldownAction::RoleCreate, t0()));
        assert!(gate.check(1, CooldownAction::RoleCreate, t0() + Duration::hours(1)));
        assert!(gate.check(1, CooldownAction::RoleCreate, t0() + Duration::hours(23)));
    }

    #[test]
    fn violations_do_not_rebase_the_cooldown() {
        let gate = CooldownGate::new(Duration::hours(24));
        assert!(!gate.check(1, CooldownAction::ChannelDelete, t0()));
        assert!(gate.check(1, CooldownAction::ChannelDelete, t0() + Duration::hours(23)));
        // 25h after the FIRST action the gate has reopened, even though a
        // violation happened 2h ago
        assert!(!gate.check(1, CooldownAction::ChannelDelete, t0() + Duration::hours(25)));
    }

    #[test]
    fn actions_are_independent() {
        let gate = CooldownGate::new(Duration::hours(24));
        assert!(!gate.check(1, CooldownAction::ChannelCreate, t0()));
        assert!(!gate.check(1, CooldownAction::CategoryCreate, t0()));
        assert!(!gate.check(1, CooldownAction::RoleCreate, t0()));
        assert!(gate.check(1, CooldownAction::ChannelCreate, t0() + Duration::minutes(1)));
    }

    #[test]
    fn actors_are_independent() {
        let gate = CooldownGate::new(Duration::hours(24));
        assert!(!gate.check(1, CooldownAction::RoleDelete, t0()));
        assert!(!gate.check(2, CooldownAction::RoleDelete, t0()));
    }

    #[test]
    fn bot_add_cooldown_requires_install() {
        let cooldown = BotAddCooldown::new(Duration::hours(24));
        assert!(cooldown.remaining(1, t0()).is_none());
        cooldown.install(1, t0());
        let left = cooldown.remaining(1, t0() + Duration::hours(10)).unwrap();
        assert_eq!(left, Duration::hours(14));
    }

    #[test]
    fn bot_add_cooldown_lapses() {
        let cooldown = BotAddCooldown::new(Duration::hours(24));
        cooldown.install(1, t0());
        assert!(cooldown.remaining(1, t0() + Duration::hours(24)).is_none());
        // Lapsed entries are dropped, not resurrected
        assert!(cooldown.remaining(1, t0() + Duration::hours(1)).is_none());
    }
}
