//! Violation classification
//!
//! The [`Detector`] owns every tracker and ledger and exposes one check
//! method per event category. Checks are pure over detector state plus a
//! caller-supplied `now`, so the event handlers own all Discord I/O and the
//! chains are testable without a gateway.
//!
//! Every applicable tracker records the event; the verdict is the first
//! positive check in the category's chain, so ordering picks the reason
//! string and nothing else.

use chrono::{DateTime, Duration, Utc};

use super::cooldown::{BotAddCooldown, CooldownAction, CooldownGate};
use super::warnings::{Offense, WarningLedger};
use super::window::SlidingWindow;

/// Instant-activity window for bot actors.
pub const INSTANT_WINDOW_BOT_MS: i64 = 500;
/// Instant-activity window for human actors.
pub const INSTANT_WINDOW_HUMAN_MS: i64 = 1000;
/// Deletion-burst window.
pub const BURST_WINDOW_MS: i64 = 1000;
/// Daily windows (deletions, bot invite links).
pub const DAILY_WINDOW_HOURS: i64 = 24;
/// Structural-action and bot-addition cooldown period.
pub const COOLDOWN_HOURS: i64 = 24;
/// Shared event-count threshold for every window tracker.
pub const TRACKER_THRESHOLD: usize = 2;

/// Which creation event is being classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationKind {
    Channel,
    Category,
    Role,
}

impl CreationKind {
    fn cooldown_action(self) -> CooldownAction {
        match self {
            Self::Channel => CooldownAction::ChannelCreate,
            Self::Category => CooldownAction::CategoryCreate,
            Self::Role => CooldownAction::RoleCreate,
        }
    }
}

/// Which deletion event is being classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionKind {
    Message,
    Channel,
    Role,
    Kick,
}

impl DeletionKind {
    fn label(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Channel => "channel",
            Self::Role => "role",
            Self::Kick => "kick",
        }
    }

    fn cooldown_action(self) -> Option<CooldownAction> {
        match self {
            Self::Channel => Some(CooldownAction::ChannelDelete),
            Self::Role => Some(CooldownAction::RoleDelete),
            Self::Message | Self::Kick => None,
        }
    }

    // Message deletions never count toward the daily limit
    fn counts_daily(self) -> bool {
        !matches!(self, Self::Message)
    }
}

/// Which check produced a violation. Logged alongside the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Cooldown,
    InstantActivity,
    DeletionBurst,
    DailyDeletion,
    MentionSpam,
}

/// A positive detection outcome for a rate-guarded event.
#[derive(Debug, Clone)]
pub struct Violation {
    pub check: CheckKind,
    pub reason: String,
}

/// Outcome of classifying a bot-invite-link post.
#[derive(Debug, Clone)]
pub enum LinkVerdict {
    /// Whitelisted actor, first offense: DM a warning, keep the whitelist.
    WhitelistFirstWarning,
    /// Whitelisted actor, second offense: evict, cool down bot adds, punish.
    WhitelistEvict { reason: String },
    /// Non-whitelisted actor over the daily link limit: punish immediately.
    DailyLimit { reason: String },
    /// Non-whitelisted actor, first offense: DM a warning.
    FirstWarning,
    /// Non-whitelisted actor, second offense: punish.
    Repeat { reason: String },
}

/// Outcome of classifying a bot joining the guild.
#[derive(Debug, Clone)]
pub enum BotAddVerdict {
    /// Whitelisted adder under an active cooldown: ban the bot, DM the notice.
    CooldownActive { remaining_hours: i64 },
    /// Whitelisted adder, first offense: ban the bot, DM a warning.
    WhitelistFirstWarning,
    /// Whitelisted adder, second offense: evict, punish.
    WhitelistEvict { reason: String },
    /// Non-whitelisted adder: ban the bot, punish the adder.
    Unauthorized { reason: String },
}

/// Outcome of classifying a member ban.
#[derive(Debug, Clone)]
pub enum BanVerdict {
    Allow,
    /// Reverse the ban and punish the banner once with this reason.
    Unauthorized { reason: String },
}

/// All tracker and ledger state behind the classification chains.
pub struct Detector {
    instant: SlidingWindow,
    deletion_burst: SlidingWindow,
    daily_deletion: SlidingWindow,
    daily_link: SlidingWindow,
    action_cooldowns: CooldownGate,
    bot_add_cooldown: BotAddCooldown,
    link_warnings: WarningLedger,
    whitelist_warnings: WarningLedger,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            instant: SlidingWindow::new(
                Duration::milliseconds(INSTANT_WINDOW_HUMAN_MS),
                TRACKER_THRESHOLD,
            ),
            deletion_burst: SlidingWindow::new(
                Duration::milliseconds(BURST_WINDOW_MS),
                TRACKER_THRESHOLD,
            ),
            daily_deletion: SlidingWindow::new(
                Duration::hours(DAILY_WINDOW_HOURS),
                TRACKER_THRESHOLD,
            ),
            daily_link: SlidingWindow::new(Duration::hours(DAILY_WINDOW_HOURS), TRACKER_THRESHOLD),
            action_cooldowns: CooldownGate::new(Duration::hours(COOLDOWN_HOURS)),
            bot_add_cooldown: BotAddCooldown::new(Duration::hours(COOLDOWN_HOURS)),
            link_warnings: WarningLedger::new(),
            whitelist_warnings: WarningLedger::new(),
        }
    }

    /// Deletion sub-type labels recorded for an actor, for diagnostics.
    #[must_use]
    pub fn recent_deletion_labels(&self, actor: u64) -> Vec<&'static str> {
        self.deletion_burst.recent_labels(actor)
    }

    fn record_instant(&self, actor: u64, actor_is_bot: bool, now: DateTime<Utc>) -> bool {
        let window = if actor_is_bot {
            Duration::milliseconds(INSTANT_WINDOW_BOT_MS)
        } else {
            Duration::milliseconds(INSTANT_WINDOW_HUMAN_MS)
        };
        self.instant.record_with_window(actor, now, window)
    }

    fn instant_reason(actor_is_bot: bool) -> String {
        let span = if actor_is_bot { "500ms" } else { "1 second" };
        format!("Crash attack suspected: multiple actions within {span}")
    }

    /// Classify a channel, category or role creation. The caller has already
    /// applied the matching protection toggle and the admin-role special case.
    pub fn check_creation(
        &self,
        actor: u64,
        actor_is_bot: bool,
        whitelisted: bool,
        kind: CreationKind,
        now: DateTime<Utc>,
    ) -> Option<Violation> {
        if whitelisted {
            return None;
        }
        let blocked =
            !actor_is_bot && self.action_cooldowns.check(actor, kind.cooldown_action(), now);
        let rapid = self.record_instant(actor, actor_is_bot, now);
        if blocked {
            return Some(Violation {
                check: CheckKind::Cooldown,
                reason: format!(
                    "Cooldown violation: repeated {} within 24 hours",
                    kind.cooldown_action().describe()
                ),
            });
        }
        rapid.then(|| Violation {
            check: CheckKind::InstantActivity,
            reason: Self::instant_reason(actor_is_bot),
        })
    }

    /// Classify a message, channel or role deletion, or a kick.
    pub fn check_deletion(
        &self,
        actor: u64,
        actor_is_bot: bool,
        whitelisted: bool,
        kind: DeletionKind,
        now: DateTime<Utc>,
    ) -> Option<Violation> {
        if whitelisted {
            return None;
        }
        let burst = self
            .deletion_burst
            .record_labeled(actor, now, kind.label());
        let daily = !actor_is_bot
            && kind.counts_daily()
            && self.daily_deletion.record(actor, now);
        let blocked = !actor_is_bot
            && kind
                .cooldown_action()
                .is_some_and(|action| self.action_cooldowns.check(actor, action, now));
        let rapid = self.record_instant(actor, actor_is_bot, now);

        if burst {
            return Some(Violation {
                check: CheckKind::DeletionBurst,
                reason: "Deletion limit exceeded: 2 or more deletions within one second"
                    .to_string(),
            });
        }
        if daily {
            return Some(Violation {
                check: CheckKind::DailyDeletion,
                reason: "Exceeded the daily deletion limit (2 per day)".to_string(),
            });
        }
        if blocked {
            // Only channel and role deletions reach here
            let action = kind.cooldown_action().unwrap_or(CooldownAction::ChannelDelete);
            return Some(Violation {
                check: CheckKind::Cooldown,
                reason: format!(
                    "Cooldown violation: repeated {} within 24 hours",
                    action.describe()
                ),
            });
        }
        rapid.then(|| Violation {
            check: CheckKind::InstantActivity,
            reason: Self::instant_reason(actor_is_bot),
        })
    }

    /// Classify a member ban. Any non-whitelisted banner is unauthorized; the
    /// rate trackers only pick a more specific reason when they fire too.
    pub fn check_ban(
        &self,
        actor: u64,
        actor_is_bot: bool,
        whitelisted: bool,
        now: DateTime<Utc>,
    ) -> BanVerdict {
        if whitelisted {
            return BanVerdict::Allow;
        }
        let burst = self.deletion_burst.record_labeled(actor, now, "ban");
        let daily = !actor_is_bot && self.daily_deletion.record(actor, now);
        self.record_instant(actor, actor_is_bot, now);

        let reason = if burst {
            "Deletion limit exceeded: 2 or more deletions within one second".to_string()
        } else if daily {
            "Exceeded the daily deletion limit (2 per day)".to_string()
        } else {
            "Unauthorized ban (not whitelisted)".to_string()
        };
        BanVerdict::Unauthorized { reason }
    }

    /// Classify a human message for spam. The caller has already applied the
    /// mention-protection toggle and the whitelist bypass.
    pub fn check_message(
        &self,
        actor: u64,
        mention_count: usize,
        max_mentions: usize,
        now: DateTime<Utc>,
    ) -> Option<Violation> {
        if self.record_instant(actor, false, now) {
            return Some(Violation {
                check: CheckKind::InstantActivity,
                reason: Self::instant_reason(false),
            });
        }
        (mention_count >= max_mentions).then(|| Violation {
            check: CheckKind::MentionSpam,
            reason: format!(
                "Mention spam: {mention_count} mentions in one message (max {max_mentions})"
            ),
        })
    }

    /// Classify a posted bot invite link. The message is deleted either way.
    pub fn check_invite_link(
        &self,
        actor: u64,
        whitelisted: bool,
        now: DateTime<Utc>,
    ) -> LinkVerdict {
        if whitelisted {
            return match self.whitelist_warnings.escalate(actor, now) {
                Offense::First => LinkVerdict::WhitelistFirstWarning,
                Offense::Second => {
                    self.bot_add_cooldown.install(actor, now);
                    LinkVerdict::WhitelistEvict {
                        reason: "Whitelisted member posted bot invite links repeatedly after a warning".to_string(),
                    }
                }
            };
        }
        // At-threshold before this link counts, so the first two offenses in
        // a day still walk the warn-then-punish ladder
        if self.daily_link.record_after_check(actor, now) {
            return LinkVerdict::DailyLimit {
                reason: "Exceeded the daily limit for bot invite links (2 per day)".to_string(),
            };
        }
        match self.link_warnings.escalate(actor, now) {
            Offense::First => LinkVerdict::FirstWarning,
            Offense::Second => LinkVerdict::Repeat {
                reason: "Posted bot invite links repeatedly after a warning".to_string(),
            },
        }
    }

    /// Classify a bot joining, attributed to the member who added it.
    pub fn check_bot_add(
        &self,
        actor: u64,
        whitelisted: bool,
        now: DateTime<Utc>,
    ) -> BotAddVerdict {
        if !whitelisted {
            return BotAddVerdict::Unauthorized {
                reason: "Added a bot without whitelist authorization".to_string(),
            };
        }
        if let Some(left) = self.bot_add_cooldown.remaining(actor, now) {
            let remaining_hours = (left.num_minutes() + 59) / 60;
            return BotAddVerdict::CooldownActive { remaining_hours };
        }
        match self.whitelist_warnings.escalate(actor, now) {
            Offense::First => BotAddVerdict::WhitelistFirstWarning,
            Offense::Second => {
                self.bot_add_cooldown.install(actor, now);
                BotAddVerdict::WhitelistEvict {
                    reason: "Whitelisted member added bots repeatedly after a warning".to_string(),
                }
            }
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

    fn ms(n: i64) -> Duration {
        Duration::milliseconds(n)
    }

    #[test]
    fn whitelisted_actors_never_trip_rate_trackers() {
        let detector = Detector::new();
        for i in 0..5 {
            let now = t0() + ms(i * 10);
            assert!(detector
                .check_deletion(1, false, true, DeletionKind::Channel, now)
                .is_none());
            assert!(detector
                .check_creation(1, false, true, CreationKind::Role, now)
                .is_none());
        }
        // Exemption means nothing was recorded either
        let v = detector.check_deletion(1, false, false, DeletionKind::Channel, t0() + ms(100));
        assert!(v.is_none());
    }

    #[test]
    fn burst_wins_the_reason_on_rapid_channel_deletions() {
        let detector = Detector::new();
        assert!(detector
            .check_deletion(1, false, false, DeletionKind::Channel, t0())
            .is_none());
        let violation = detector
            .check_deletion(1, false, false, DeletionKind::Channel, t0() + ms(400))
            .unwrap();
        assert_eq!(violation.check, CheckKind::DeletionBurst);
        assert!(violation.reason.contains("one second"));
    }

    #[test]
    fn mixed_deletions_hit_the_daily_limit() {
        let detector = Detector::new();
        assert!(detector
            .check_deletion(1, false, false, DeletionKind::Channel, t0())
            .is_none());
        let violation = detector
            .check_deletion(1, false, false, DeletionKind::Kick, t0() + Duration::hours(3))
            .unwrap();
        assert_eq!(violation.check, CheckKind::DailyDeletion);
    }

    #[test]
    fn bots_skip_the_daily_deletion_limit() {
        let detector = Detector::new();
        assert!(detector
            .check_deletion(1, true, false, DeletionKind::Channel, t0())
            .is_none());
        // Hours apart: no burst, no instant, and bots have no daily limit
        assert!(detector
            .check_deletion(1, true, false, DeletionKind::Role, t0() + Duration::hours(3))
            .is_none());
    }

    #[test]
    fn message_deletions_skip_daily_and_cooldown() {
        let detector = Detector::new();
        assert!(detector
            .check_deletion(1, false, false, DeletionKind::Message, t0())
            .is_none());
        assert!(detector
            .check_deletion(1, false, false, DeletionKind::Message, t0() + Duration::hours(3))
            .is_none());
    }

    #[test]
    fn repeat_channel_creation_violates_the_cooldown() {
        let detector = Detector::new();
        assert!(detector
            .check_creation(1, false, false, CreationKind::Channel, t0())
            .is_none());
        let violation = detector
            .check_creation(1, false, false, CreationKind::Channel, t0() + Duration::hours(2))
            .unwrap();
        assert_eq!(violation.check, CheckKind::Cooldown);
        assert!(violation.reason.contains("channel creation"));
    }

    #[test]
    fn bot_creations_use_the_short_instant_window() {
        let detector = Detector::new();
        assert!(detector
            .check_creation(1, true, false, CreationKind::Channel, t0())
            .is_none());
        // 700ms apart: outside the 500ms bot window
        assert!(detector
            .check_creation(1, true, false, CreationKind::Role, t0() + ms(700))
            .is_none());
        let violation = detector
            .check_creation(1, true, false, CreationKind::Category, t0() + ms(1000))
            .unwrap();
        assert_eq!(violation.check, CheckKind::InstantActivity);
        assert!(violation.reason.contains("500ms"));
    }

    #[test]
    fn unauthorized_ban_reason_precedence() {
        let detector = Detector::new();
        // Isolated ban: generic unauthorized reason
        match detector.check_ban(1, false, false, t0()) {
            BanVerdict::Unauthorized { reason } => assert!(reason.contains("not whitelisted")),
            BanVerdict::Allow => panic!("non-whitelisted ban must be unauthorized"),
        }
        // Second ban 300ms later: burst reason takes over
        match detector.check_ban(1, false, false, t0() + ms(300)) {
            BanVerdict::Unauthorized { reason } => assert!(reason.contains("one second")),
            BanVerdict::Allow => panic!("non-whitelisted ban must be unauthorized"),
        }
    }

    #[test]
    fn whitelisted_bans_are_allowed() {
        let detector = Detector::new();
        assert!(matches!(
            detector.check_ban(1, false, true, t0()),
            BanVerdict::Allow
        ));
        assert!(matches!(
            detector.check_ban(1, false, true, t0() + ms(100)),
            BanVerdict::Allow
        ));
    }

    #[test]
    fn mention_spam_fires_under_the_instant_threshold() {
        let detector = Detector::new();
        let violation = detector.check_message(1, 6, 5, t0()).unwrap();
        assert_eq!(violation.check, CheckKind::MentionSpam);
    }

    #[test]
    fn rapid_messages_trip_instant_before_mentions() {
        let detector = Detector::new();
        assert!(detector.check_message(1, 0, 5, t0()).is_none());
        let violation = detector.check_message(1, 0, 5, t0() + ms(200)).unwrap();
        assert_eq!(violation.check, CheckKind::InstantActivity);
    }

    #[test]
    fn link_flow_warns_then_punishes_then_resets() {
        let detector = Detector::new();
        assert!(matches!(
            detector.check_invite_link(1, false, t0()),
            LinkVerdict::FirstWarning
        ));
        assert!(matches!(
            detector.check_invite_link(1, false, t0() + Duration::hours(1)),
            LinkVerdict::Repeat { .. }
        ));
        // Past the daily window the ladder restarts from the bottom
        assert!(matches!(
            detector.check_invite_link(1, false, t0() + Duration::hours(50)),
            LinkVerdict::FirstWarning
        ));
    }

    #[test]
    fn third_link_in_a_day_hits_the_daily_limit() {
        let detector = Detector::new();
        assert!(matches!(
            detector.check_invite_link(1, false, t0()),
            LinkVerdict::FirstWarning
        ));
        assert!(matches!(
            detector.check_invite_link(1, false, t0() + Duration::hours(1)),
            LinkVerdict::Repeat { .. }
        ));
        assert!(matches!(
            detector.check_invite_link(1, false, t0() + Duration::hours(2)),
            LinkVerdict::DailyLimit { .. }
        ));
        // And a fourth stays over the limit
        assert!(matches!(
            detector.check_invite_link(1, false, t0() + Duration::hours(3)),
            LinkVerdict::DailyLimit { .. }
        ));
    }

    #[test]
    fn whitelisted_link_offenses_escalate_to_eviction() {
        let detector = Detector::new();
        assert!(matches!(
            detector.check_invite_link(1, true, t0()),
            LinkVerdict::WhitelistFirstWarning
        ));
        assert!(matches!(
            detector.check_invite_link(1, true, t0() + Duration::hours(1)),
            LinkVerdict::WhitelistEvict { .. }
        ));
        // Eviction installed the bot-add cooldown
        match detector.check_bot_add(1, true, t0() + Duration::hours(2)) {
            BotAddVerdict::CooldownActive { remaining_hours } => {
                assert_eq!(remaining_hours, 23);
            }
            other => panic!("expected active cooldown, got {other:?}"),
        }
    }

    #[test]
    fn bot_add_escalation_shares_the_whitelist_ledger() {
        let detector = Detector::new();
        // A link warning and a bot-add offense count against the same ledger
        assert!(matches!(
            detector.check_invite_link(1, true, t0()),
            LinkVerdict::WhitelistFirstWarning
        ));
        assert!(matches!(
            detector.check_bot_add(1, true, t0() + Duration::hours(1)),
            BotAddVerdict::WhitelistEvict { .. }
        ));
    }

    #[test]
    fn non_whitelisted_bot_add_is_unauthorized() {
        let detector = Detector::new();
        assert!(matches!(
            detector.check_bot_add(1, false, t0()),
            BotAddVerdict::Unauthorized { .. }
        ));
    }

    #[test]
    fn bot_add_cooldown_lapses_back_to_warning_flow() {
        let detector = Detector::new();
        assert!(matches!(
            detector.check_bot_add(1, true, t0()),
            BotAddVerdict::WhitelistFirstWarning
        ));
        assert!(matches!(
            detector.check_bot_add(1, true, t0() + Duration::hours(1)),
            BotAddVerdict::WhitelistEvict { .. }
        ));
        // 25h later the installed cooldown has lapsed and the cycle restarts
        assert!(matches!(
            detector.check_bot_add(1, true, t0() + Duration::hours(26)),
            BotAddVerdict::WhitelistFirstWarning
        ));
    }
}
