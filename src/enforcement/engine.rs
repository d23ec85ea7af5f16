//! Punishment engine
//!
//! Guard and fairness logic is pure over [`EnforcementContext`] so it can be
//! tested without a gateway; [`punish`] applies the verdict through the HTTP
//! API. Guards never mutate anything and are silent toward users.

use chrono::{Duration, Utc};
use serenity::http::Http;
use serenity::model::id::{GuildId, RoleId, UserId};
use serenity::model::permissions::Permissions;
use tracing::{error, info, warn};

use super::error::{EnforcementError, EnforcementResult};
use crate::data::PunishmentSettings;
use crate::ENFORCEMENT_TARGET;

/// Days of message history removed when banning an offender.
pub const BAN_DELETE_MESSAGE_DAYS: u8 = 7;
/// Length of the timeout applied to punished humans.
pub const TIMEOUT_DAYS: i64 = 7;

/// Permissions that make a role count as privileged during the fairness
/// inspection.
pub const DANGEROUS_PERMISSIONS: Permissions = Permissions::ADMINISTRATOR
    .union(Permissions::MANAGE_GUILD)
    .union(Permissions::MANAGE_ROLES)
    .union(Permissions::MANAGE_CHANNELS)
    .union(Permissions::BAN_MEMBERS)
    .union(Permissions::KICK_MEMBERS)
    .union(Permissions::MANAGE_MESSAGES)
    .union(Permissions::MENTION_EVERYONE)
    .union(Permissions::MANAGE_WEBHOOKS);

/// One role held by the enforcement target.
#[derive(Debug, Clone)]
pub struct RoleProfile {
    pub id: u64,
    pub position: u16,
    pub permissions: Permissions,
    pub is_everyone: bool,
}

/// Everything the guards and fairness inspection need, as plain data.
#[derive(Debug, Clone)]
pub struct EnforcementContext {
    pub agent_id: u64,
    pub agent_top_position: u16,
    pub owner_id: u64,
    pub target_id: u64,
    pub target_is_bot: bool,
    pub target_roles: Vec<RoleProfile>,
}

/// Why a punishment request was skipped without any mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardSkip {
    SelfTarget,
    GuildOwner,
    Hierarchy,
}

/// Ordered unconditional guards. `Some` means skip the punishment entirely.
#[must_use]
pub fn guard_target(ctx: &EnforcementContext) -> Option<GuardSkip> {
    if ctx.target_id == ctx.agent_id {
        return Some(GuardSkip::SelfTarget);
    }
    if ctx.target_id == ctx.owner_id {
        return Some(GuardSkip::GuildOwner);
    }
    if target_top_position(ctx) >= ctx.agent_top_position {
        return Some(GuardSkip::Hierarchy);
    }
    None
}

fn target_top_position(ctx: &EnforcementContext) -> u16 {
    ctx.target_roles
        .iter()
        .filter(|role| !role.is_everyone)
        .map(|role| role.position)
        .max()
        .unwrap_or(0)
}

/// Whether the target holds any role granting dangerous permissions.
#[must_use]
pub fn has_privileged_roles(ctx: &EnforcementContext) -> bool {
    ctx.target_roles
        .iter()
        .any(|role| role.permissions.intersects(DANGEROUS_PERMISSIONS))
}

/// Roles the agent can actually remove: below its own top role, not @everyone.
#[must_use]
pub fn strippable_roles(ctx: &EnforcementContext) -> Vec<&RoleProfile> {
    ctx.target_roles
        .iter()
        .filter(|role| !role.is_everyone && role.position < ctx.agent_top_position)
        .collect()
}

/// Punish the target described by `ctx` for `base_reason`.
///
/// Guard skips return Ok without touching the target. Sub-actions (role
/// strip, ban, timeout) are attempted independently; individual failures are
/// logged and only a total failure produces a warning.
pub async fn punish(
    http: &Http,
    guild_id: GuildId,
    ctx: &EnforcementContext,
    base_reason: &str,
    punishment: &PunishmentSettings,
) -> EnforcementResult<()> {
    if let Some(skip) = guard_target(ctx) {
        info!(
            target: ENFORCEMENT_TARGET,
            guild_id = guild_id.get(),
            target_id = ctx.target_id,
            skip = ?skip,
            "Punishment skipped by guard"
        );
        return Ok(());
    }

    let reason = if has_privileged_roles(ctx) {
        format!("{base_reason} (held privileged roles)")
    } else {
        base_reason.to_string()
    };

    let target = UserId::new(ctx.target_id);
    let mut member = match guild_id.member(http, target).await {
        Ok(member) => member,
        // Rejected lookups mean the target already left the guild
        Err(e @ serenity::Error::Http(_)) => {
            return Err(EnforcementError::GuildOrMemberNotFound(format!(
                "member {} in guild {}: {e}",
                ctx.target_id,
                guild_id.get()
            )));
        }
        Err(e) => return Err(EnforcementError::DiscordApi(Box::new(e))),
    };

    let mut succeeded = 0_u32;

    if ctx.target_is_bot {
        if punishment.bots.remove_roles {
            succeeded += strip_roles(http, ctx, &member).await;
        }
        if punishment.bots.ban {
            match guild_id
                .ban_with_reason(http, target, BAN_DELETE_MESSAGE_DAYS, &reason)
                .await
            {
                Ok(()) => {
                    succeeded += 1;
                    info!(
                        target: ENFORCEMENT_TARGET,
                        guild_id = guild_id.get(),
                        target_id = ctx.target_id,
                        reason = %reason,
                        "Banned bot"
                    );
                }
                Err(e) => {
                    error!(
                        target: ENFORCEMENT_TARGET,
                        guild_id = guild_id.get(),
                        target_id = ctx.target_id,
                        error = %e,
                        "Failed to ban bot"
                    );
                }
            }
        }
    } else {
        succeeded += strip_roles(http, ctx, &member).await;
        let until = Utc::now() + Duration::days(TIMEOUT_DAYS);
        match member
            .disable_communication_until_datetime(http, until.into())
            .await
        {
            Ok(()) => {
                succeeded += 1;
                info!(
                    target: ENFORCEMENT_TARGET,
                    guild_id = guild_id.get(),
                    target_id = ctx.target_id,
                    reason = %reason,
                    "Timed out member for 7 days"
                );
            }
            Err(e) => {
                error!(
                    target: ENFORCEMENT_TARGET,
                    guild_id = guild_id.get(),
                    target_id = ctx.target_id,
                    error = %e,
                    "Failed to time out member"
                );
            }
        }
    }

    if succeeded == 0 {
        warn!(
            target: ENFORCEMENT_TARGET,
            guild_id = guild_id.get(),
            target_id = ctx.target_id,
            reason = %reason,
            "No punishment sub-action succeeded"
        );
    }
    Ok(())
}

async fn strip_roles(
    http: &Http,
    ctx: &EnforcementContext,
    member: &serenity::model::guild::Member,
) -> u32 {
    let mut removed = 0_u32;
    for role in strippable_roles(ctx) {
        match member.remove_role(http, RoleId::new(role.id)).await {
            Ok(()) => removed += 1,
            Err(e) => {
                error!(
                    target: ENFORCEMENT_TARGET,
                    target_id = ctx.target_id,
                    role_id = role.id,
                    error = %e,
                    "Failed to remove role"
                );
            }
        }
    }
    if removed > 0 {
        info!(
            target: ENFORCEMENT_TARGET,
            target_id = ctx.target_id,
            removed,
            "Stripped roles"
        );
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(id: u64, position: u16, permissions: Permissions) -> RoleProfile {
        RoleProfile {
            id,
            position,
            permissions,
            is_everyone: false,
        }
    }

    fn everyone() -> RoleProfile {
        RoleProfile {
            id: 100,
            position: 0,
            permissions: Permissions::empty(),
            is_everyone: true,
        }
    }

    fn ctx(target_id: u64, target_roles: Vec<RoleProfile>) -> EnforcementContext {
        EnforcementContext {
            agent_id: 1,
            agent_top_position: 50,
            owner_id: 2,
            target_id,
            target_is_bot: false,
            target_roles,
        }
    }

    #[test]
    fn guards_fire_in_order() {
        // Self beats owner even if they coincide
        let mut c = ctx(1, vec![]);
        c.owner_id = 1;
        assert_eq!(guard_target(&c), Some(GuardSkip::SelfTarget));

        assert_eq!(guard_target(&ctx(2, vec![])), Some(GuardSkip::GuildOwner));

        let high = ctx(3, vec![role(10, 50, Permissions::empty())]);
        assert_eq!(guard_target(&high), Some(GuardSkip::Hierarchy));
    }

    #[test]
    fn equal_rank_is_protected() {
        let peer = ctx(3, vec![role(10, 50, Permissions::empty())]);
        assert_eq!(guard_target(&peer), Some(GuardSkip::Hierarchy));
        let below = ctx(3, vec![role(10, 49, Permissions::empty())]);
        assert_eq!(guard_target(&below), None);
    }

    #[test]
    fn everyone_does_not_count_toward_rank() {
        let c = ctx(3, vec![everyone()]);
        assert_eq!(guard_target(&c), None);
    }

    #[test]
    fn fairness_flags_any_dangerous_permission() {
        let admin = ctx(3, vec![role(10, 5, Permissions::ADMINISTRATOR)]);
        assert!(has_privileged_roles(&admin));

        let webhooks = ctx(3, vec![role(10, 5, Permissions::MANAGE_WEBHOOKS)]);
        assert!(has_privileged_roles(&webhooks));

        let benign = ctx(
            3,
            vec![role(10, 5, Permissions::SEND_MESSAGES | Permissions::ADD_REACTIONS)],
        );
        assert!(!has_privileged_roles(&benign));
    }

    #[test]
    fn strippable_excludes_everyone_and_higher_roles() {
        let c = ctx(
            3,
            vec![
                everyone(),
                role(10, 10, Permissions::empty()),
                role(11, 49, Permissions::empty()),
                role(12, 60, Permissions::empty()),
            ],
        );
        let ids: Vec<u64> = strippable_roles(&c).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![10, 11]);
    }

    #[test]
    fn roleless_target_is_not_protected() {
        assert_eq!(guard_target(&ctx(3, vec![])), None);
        assert!(strippable_roles(&ctx(3, vec![])).is_empty());
    }
}
