//! Gateway event wiring
//!
//! Each event is attributed to an actor through the guild audit log, run
//! through the matching detection chain, and the verdict applied: destructive
//! objects removed, damage reversed, the actor punished. Attribution failure
//! fails open (no action), and events caused by this bot's own enforcement
//! are ignored.

use chrono::Utc;
use serenity::async_trait;
use serenity::builder::{CreateInvite, EditRole};
use serenity::client::{Context, EventHandler};
use serenity::model::channel::{ChannelType, GuildChannel, Message};
use serenity::model::gateway::Ready;
use serenity::model::guild::audit_log::{
    Action, ChannelAction, MemberAction, MessageAction, RoleAction,
};
use serenity::model::guild::{Member, Role};
use serenity::model::id::{ChannelId, GuildId, MessageId, RoleId, UserId};
use serenity::model::permissions::Permissions;
use serenity::model::user::User;
use tracing::{error, info, warn};

use crate::detection::{BanVerdict, BotAddVerdict, CreationKind, DeletionKind, LinkVerdict};
use crate::enforcement::{self, notify, EnforcementContext, RoleProfile};
use crate::{Data, DETECTION_TARGET, ENFORCEMENT_TARGET, EVENT_TARGET};

const INVITE_LINK_MARKERS: [&str; 2] = [
    "discord.com/oauth2/authorize",
    "discordapp.com/oauth2/authorize",
];

/// Whether a message body contains a bot invite (OAuth2 authorize) link.
#[must_use]
pub fn is_bot_invite_link(content: &str) -> bool {
    let lowered = content.to_lowercase();
    INVITE_LINK_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Mentions in one message: user pings, role pings and @everyone all count
/// toward the configured limit.
#[must_use]
pub fn mention_total(user_mentions: usize, role_mentions: usize, mentions_everyone: bool) -> usize {
    user_mentions + role_mentions + usize::from(mentions_everyone)
}

/// Who the audit log says performed the most recent action of a given type.
struct Attribution {
    executor_id: UserId,
    executor_is_bot: bool,
    target_id: Option<u64>,
}

pub struct Handler {
    data: Data,
}

impl Handler {
    #[must_use]
    pub fn new(data: Data) -> Self {
        Self { data }
    }

    /// Look up the most recent audit entry for `action`. Absence or an API
    /// failure fails open: the event is not acted on.
    async fn attribute(ctx: &Context, guild_id: GuildId, action: Action) -> Option<Attribution> {
        let logs = match guild_id
            .audit_logs(&ctx.http, Some(action), None, None, Some(1))
            .await
        {
            Ok(logs) => logs,
            Err(e) => {
                warn!(
                    target: EVENT_TARGET,
                    guild_id = guild_id.get(),
                    error = %e,
                    "Audit log unavailable, failing open"
                );
                return None;
            }
        };
        let entry = logs.entries.first()?;
        let executor_is_bot = logs
            .users
            .iter()
            .find(|(id, _)| **id == entry.user_id)
            .is_some_and(|(_, user)| user.bot);
        Some(Attribution {
            executor_id: entry.user_id,
            executor_is_bot,
            target_id: entry.target_id.map(|id| id.get()),
        })
    }

    /// Gather everything the enforcement guards need about a target.
    async fn build_context(
        ctx: &Context,
        guild_id: GuildId,
        target_id: UserId,
        target_is_bot: bool,
    ) -> Option<EnforcementContext> {
        let agent_id = ctx.cache.current_user().id;
        let guild = guild_id.to_partial_guild(&ctx.http).await.ok()?;
        let agent = guild_id.member(&ctx.http, agent_id).await.ok()?;
        let agent_top_position = agent
            .roles
            .iter()
            .filter_map(|id| guild.roles.get(id))
            .map(|role| role.position)
            .max()
            .unwrap_or(0);
        let target = guild_id.member(&ctx.http, target_id).await.ok()?;
        let target_roles = target
            .roles
            .iter()
            .filter_map(|id| guild.roles.get(id))
            .map(|role| RoleProfile {
                id: role.id.get(),
                position: role.position,
                permissions: role.permissions,
                is_everyone: role.id.get() == guild_id.get(),
            })
            .collect();
        Some(EnforcementContext {
            agent_id: agent_id.get(),
            agent_top_position,
            owner_id: guild.owner_id.get(),
            target_id: target_id.get(),
            target_is_bot,
            target_roles,
        })
    }

    async fn punish_actor(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        actor: UserId,
        actor_is_bot: bool,
        reason: &str,
    ) {
        let Some(enforcement_ctx) =
            Self::build_context(ctx, guild_id, actor, actor_is_bot).await
        else {
            warn!(
                target: ENFORCEMENT_TARGET,
                guild_id = guild_id.get(),
                actor_id = actor.get(),
                "Actor no longer resolvable, skipping punishment"
            );
            return;
        };
        let punishment = self.data.settings_snapshot().punishment;
        if let Err(e) =
            enforcement::punish(&ctx.http, guild_id, &enforcement_ctx, reason, &punishment).await
        {
            error!(
                target: ENFORCEMENT_TARGET,
                guild_id = guild_id.get(),
                actor_id = actor.get(),
                error = %e,
                "Punishment failed"
            );
        }
    }

    /// Shared path for every deletion-flavored event.
    async fn handle_deletion(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        action: Action,
        kind: DeletionKind,
        expected_target: Option<UserId>,
    ) {
        let Some(attribution) = Self::attribute(ctx, guild_id, action).await else {
            return;
        };
        if attribution.executor_id == ctx.cache.current_user().id {
            return;
        }
        if let Some(expected) = expected_target {
            // Stale audit entry: this event was not the logged action
            if attribution.target_id != Some(expected.get()) {
                return;
            }
        }
        let whitelisted = self.data.is_whitelisted(attribution.executor_id.get());
        let Some(violation) = self.data.detector.check_deletion(
            attribution.executor_id.get(),
            attribution.executor_is_bot,
            whitelisted,
            kind,
            Utc::now(),
        ) else {
            return;
        };
        info!(
            target: DETECTION_TARGET,
            guild_id = guild_id.get(),
            actor_id = attribution.executor_id.get(),
            check = ?violation.check,
            kind = ?kind,
            recent = ?self.data.detector.recent_deletion_labels(attribution.executor_id.get()),
            "Deletion violation detected"
        );
        self.punish_actor(
            ctx,
            guild_id,
            attribution.executor_id,
            attribution.executor_is_bot,
            &violation.reason,
        )
        .await;
    }

    /// Best-effort single-use invite for a wrongful-ban apology.
    async fn single_use_invite(ctx: &Context, guild_id: GuildId) -> Option<String> {
        let channels = guild_id.channels(&ctx.http).await.ok()?;
        let channel = channels
            .values()
            .find(|channel| channel.kind == ChannelType::Text)?;
        let invite = channel
            .id
            .create_invite(&ctx.http, CreateInvite::new().max_age(0).max_uses(1))
            .await
            .ok()?;
        Some(invite.url())
    }

    async fn handle_invite_link(&self, ctx: &Context, guild_id: GuildId, msg: &Message) {
        // The link is removed no matter which branch follows
        if let Err(e) = msg.delete(&ctx.http).await {
            warn!(
                target: EVENT_TARGET,
                guild_id = guild_id.get(),
                error = %e,
                "Could not delete invite-link message"
            );
        }
        let actor = msg.author.id;
        let whitelisted = self.data.is_whitelisted(actor.get());
        let verdict = self
            .data
            .detector
            .check_invite_link(actor.get(), whitelisted, Utc::now());
        info!(
            target: DETECTION_TARGET,
            guild_id = guild_id.get(),
            actor_id = actor.get(),
            verdict = ?verdict,
            "Bot invite link posted"
        );
        match verdict {
            LinkVerdict::WhitelistFirstWarning => {
                notify::send_dm(&ctx.http, actor, &notify::whitelist_link_warning()).await;
            }
            LinkVerdict::WhitelistEvict { reason } => {
                self.data.whitelist_remove(actor.get());
                if let Err(e) = self.data.save().await {
                    error!(target: EVENT_TARGET, error = %e, "Could not persist whitelist eviction");
                }
                notify::send_dm(&ctx.http, actor, &notify::whitelist_eviction_notice()).await;
                self.punish_actor(ctx, guild_id, actor, false, &reason).await;
            }
            LinkVerdict::DailyLimit { reason } => {
                notify::send_dm(&ctx.http, actor, &notify::daily_limit_notice()).await;
                self.punish_actor(ctx, guild_id, actor, false, &reason).await;
            }
            LinkVerdict::FirstWarning => {
                notify::send_dm(&ctx.http, actor, &notify::link_first_warning()).await;
            }
            LinkVerdict::Repeat { reason } => {
                notify::send_dm(&ctx.http, actor, &notify::link_repeat_notice()).await;
                self.punish_actor(ctx, guild_id, actor, false, &reason).await;
            }
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!("Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!("Cache ready! Protecting {guild_count} guild(s)");
    }

    /// Bot-invite-link interception and human message-spam detection.
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };

        // Link posting is policed even for whitelisted members
        if is_bot_invite_link(&msg.content) {
            self.handle_invite_link(&ctx, guild_id, &msg).await;
            return;
        }

        let actor = msg.author.id;
        if self.data.is_whitelisted(actor.get()) {
            return;
        }
        let settings = self.data.settings_snapshot();
        if !settings.mention_protection.enabled {
            return;
        }
        let mentions = mention_total(
            msg.mentions.len(),
            msg.mention_roles.len(),
            msg.mention_everyone,
        );
        let Some(violation) = self.data.detector.check_message(
            actor.get(),
            mentions,
            settings.mention_protection.max_mentions,
            Utc::now(),
        ) else {
            return;
        };
        info!(
            target: DETECTION_TARGET,
            guild_id = guild_id.get(),
            actor_id = actor.get(),
            check = ?violation.check,
            "Message violation detected"
        );
        if let Err(e) = msg.delete(&ctx.http).await {
            warn!(target: EVENT_TARGET, error = %e, "Could not delete offending message");
        }
        self.punish_actor(&ctx, guild_id, actor, false, &violation.reason)
            .await;
    }

    async fn message_delete(
        &self,
        ctx: Context,
        _channel_id: ChannelId,
        _deleted_message_id: MessageId,
        guild_id: Option<GuildId>,
    ) {
        let Some(guild_id) = guild_id else {
            return;
        };
        self.handle_deletion(
            &ctx,
            guild_id,
            Action::Message(MessageAction::Delete),
            DeletionKind::Message,
            None,
        )
        .await;
    }

    /// Channel and category creation (categories arrive as channels of kind
    /// `Category`).
    async fn channel_create(&self, ctx: Context, channel: GuildChannel) {
        let guild_id = channel.guild_id;
        let settings = self.data.settings_snapshot();
        let kind = if channel.kind == ChannelType::Category {
            if !settings.category_protection.enabled {
                return;
            }
            CreationKind::Category
        } else {
            if !settings.channel_protection.enabled {
                return;
            }
            CreationKind::Channel
        };

        let Some(attribution) =
            Self::attribute(&ctx, guild_id, Action::Channel(ChannelAction::Create)).await
        else {
            return;
        };
        if attribution.executor_id == ctx.cache.current_user().id {
            return;
        }
        let whitelisted = self.data.is_whitelisted(attribution.executor_id.get());
        let Some(violation) = self.data.detector.check_creation(
            attribution.executor_id.get(),
            attribution.executor_is_bot,
            whitelisted,
            kind,
            Utc::now(),
        ) else {
            return;
        };
        info!(
            target: DETECTION_TARGET,
            guild_id = guild_id.get(),
            actor_id = attribution.executor_id.get(),
            check = ?violation.check,
            kind = ?kind,
            "Creation violation detected"
        );
        if let Err(e) = channel.id.delete(&ctx.http).await {
            error!(
                target: ENFORCEMENT_TARGET,
                channel_id = channel.id.get(),
                error = %e,
                "Could not delete created channel"
            );
        }
        self.punish_actor(
            &ctx,
            guild_id,
            attribution.executor_id,
            attribution.executor_is_bot,
            &violation.reason,
        )
        .await;
    }

    /// Deletions are always policed; the protection toggles gate creation
    /// floods only.
    async fn channel_delete(
        &self,
        ctx: Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        self.handle_deletion(
            &ctx,
            channel.guild_id,
            Action::Channel(ChannelAction::Delete),
            DeletionKind::Channel,
            None,
        )
        .await;
    }

    /// Role creation, with a rate-tracker bypass when the new role already
    /// carries administrator permissions.
    async fn guild_role_create(&self, ctx: Context, new: Role) {
        let guild_id = new.guild_id;
        if !self.data.settings_snapshot().role_protection.enabled {
            return;
        }
        let Some(attribution) =
            Self::attribute(&ctx, guild_id, Action::Role(RoleAction::Create)).await
        else {
            return;
        };
        if attribution.executor_id == ctx.cache.current_user().id {
            return;
        }
        let whitelisted = self.data.is_whitelisted(attribution.executor_id.get());

        let violation_reason = if new.permissions.contains(Permissions::ADMINISTRATOR) {
            if whitelisted {
                return;
            }
            Some("Created a role with administrator permissions".to_string())
        } else {
            self.data
                .detector
                .check_creation(
                    attribution.executor_id.get(),
                    attribution.executor_is_bot,
                    whitelisted,
                    CreationKind::Role,
                    Utc::now(),
                )
                .map(|violation| violation.reason)
        };
        let Some(reason) = violation_reason else {
            return;
        };
        info!(
            target: DETECTION_TARGET,
            guild_id = guild_id.get(),
            actor_id = attribution.executor_id.get(),
            role_id = new.id.get(),
            reason = %reason,
            "Role creation violation detected"
        );
        if let Err(e) = guild_id.delete_role(&ctx.http, new.id).await {
            error!(
                target: ENFORCEMENT_TARGET,
                role_id = new.id.get(),
                error = %e,
                "Could not delete created role"
            );
        }
        self.punish_actor(
            &ctx,
            guild_id,
            attribution.executor_id,
            attribution.executor_is_bot,
            &reason,
        )
        .await;
    }

    /// Reverts role updates that newly grant administrator permissions.
    async fn guild_role_update(&self, ctx: Context, old_data_if_available: Option<Role>, new: Role) {
        let guild_id = new.guild_id;
        if !self.data.settings_snapshot().role_protection.enabled {
            return;
        }
        // Without the old role we cannot tell whether admin was newly granted
        let Some(old) = old_data_if_available else {
            return;
        };
        if !new.permissions.contains(Permissions::ADMINISTRATOR)
            || old.permissions.contains(Permissions::ADMINISTRATOR)
        {
            return;
        }
        let Some(attribution) =
            Self::attribute(&ctx, guild_id, Action::Role(RoleAction::Update)).await
        else {
            return;
        };
        if attribution.executor_id == ctx.cache.current_user().id {
            return;
        }
        if self.data.is_whitelisted(attribution.executor_id.get()) {
            return;
        }
        info!(
            target: DETECTION_TARGET,
            guild_id = guild_id.get(),
            actor_id = attribution.executor_id.get(),
            role_id = new.id.get(),
            "Administrator grant on role update detected"
        );
        if let Err(e) = guild_id
            .edit_role(&ctx.http, new.id, EditRole::new().permissions(old.permissions))
            .await
        {
            error!(
                target: ENFORCEMENT_TARGET,
                role_id = new.id.get(),
                error = %e,
                "Could not restore role permissions"
            );
        }
        self.punish_actor(
            &ctx,
            guild_id,
            attribution.executor_id,
            attribution.executor_is_bot,
            "Granted administrator permissions to a role",
        )
        .await;
    }

    async fn guild_role_delete(
        &self,
        ctx: Context,
        guild_id: GuildId,
        _removed_role_id: RoleId,
        _removed_role_data_if_available: Option<Role>,
    ) {
        self.handle_deletion(
            &ctx,
            guild_id,
            Action::Role(RoleAction::Delete),
            DeletionKind::Role,
            None,
        )
        .await;
    }

    /// Unauthorized bans are reversed (unban plus apology DM with a fresh
    /// invite) and the banner punished exactly once.
    async fn guild_ban_addition(&self, ctx: Context, guild_id: GuildId, banned_user: User) {
        let Some(attribution) =
            Self::attribute(&ctx, guild_id, Action::Member(MemberAction::BanAdd)).await
        else {
            return;
        };
        if attribution.executor_id == ctx.cache.current_user().id {
            return;
        }
        if attribution.target_id != Some(banned_user.id.get()) {
            return;
        }
        let whitelisted = self.data.is_whitelisted(attribution.executor_id.get());
        let verdict = self.data.detector.check_ban(
            attribution.executor_id.get(),
            attribution.executor_is_bot,
            whitelisted,
            Utc::now(),
        );
        let BanVerdict::Unauthorized { reason } = verdict else {
            return;
        };
        info!(
            target: DETECTION_TARGET,
            guild_id = guild_id.get(),
            actor_id = attribution.executor_id.get(),
            victim_id = banned_user.id.get(),
            reason = %reason,
            "Unauthorized ban detected"
        );

        match guild_id.unban(&ctx.http, banned_user.id).await {
            Ok(()) => {
                let guild_name = guild_id
                    .to_partial_guild(&ctx.http)
                    .await
                    .map_or_else(|_| "the server".to_string(), |guild| guild.name);
                let invite = Self::single_use_invite(&ctx, guild_id).await;
                notify::send_dm(
                    &ctx.http,
                    banned_user.id,
                    &notify::wrongful_ban_apology(&guild_name, invite.as_deref()),
                )
                .await;
            }
            Err(e) => {
                error!(
                    target: ENFORCEMENT_TARGET,
                    victim_id = banned_user.id.get(),
                    error = %e,
                    "Could not reverse ban"
                );
            }
        }
        self.punish_actor(
            &ctx,
            guild_id,
            attribution.executor_id,
            attribution.executor_is_bot,
            &reason,
        )
        .await;
    }

    /// Member removals are only acted on when the audit log shows a matching
    /// kick; voluntary leaves produce no kick entry for the user.
    async fn guild_member_removal(
        &self,
        ctx: Context,
        guild_id: GuildId,
        user: User,
        _member_data_if_available: Option<Member>,
    ) {
        self.handle_deletion(
            &ctx,
            guild_id,
            Action::Member(MemberAction::Kick),
            DeletionKind::Kick,
            Some(user.id),
        )
        .await;
    }

    /// Every bot joining is attributed to the member who added it and run
    /// through the bot-addition policy. The new bot itself is always banned;
    /// the verdict decides what happens to the adder.
    async fn guild_member_addition(&self, ctx: Context, new_member: Member) {
        if !new_member.user.bot {
            return;
        }
        let guild_id = new_member.guild_id;
        let Some(attribution) =
            Self::attribute(&ctx, guild_id, Action::Member(MemberAction::BotAdd)).await
        else {
            return;
        };
        if attribution.target_id != Some(new_member.user.id.get()) {
            return;
        }
        let adder = attribution.executor_id;
        let whitelisted = self.data.is_whitelisted(adder.get());
        let verdict = self
            .data
            .detector
            .check_bot_add(adder.get(), whitelisted, Utc::now());
        info!(
            target: DETECTION_TARGET,
            guild_id = guild_id.get(),
            adder_id = adder.get(),
            bot_id = new_member.user.id.get(),
            verdict = ?verdict,
            "Bot addition detected"
        );

        if let Err(e) = guild_id
            .ban_with_reason(&ctx.http, new_member.user.id, 0, "Unauthorized bot addition")
            .await
        {
            error!(
                target: ENFORCEMENT_TARGET,
                bot_id = new_member.user.id.get(),
                error = %e,
                "Could not ban added bot"
            );
        }

        match verdict {
            BotAddVerdict::CooldownActive { remaining_hours } => {
                notify::send_dm(&ctx.http, adder, &notify::cooldown_notice(remaining_hours)).await;
            }
            BotAddVerdict::WhitelistFirstWarning => {
                notify::send_dm(&ctx.http, adder, &notify::bot_add_warning()).await;
            }
            BotAddVerdict::WhitelistEvict { reason } => {
                self.data.whitelist_remove(adder.get());
                if let Err(e) = self.data.save().await {
                    error!(target: EVENT_TARGET, error = %e, "Could not persist whitelist eviction");
                }
                notify::send_dm(&ctx.http, adder, &notify::whitelist_eviction_notice()).await;
                self.punish_actor(&ctx, guild_id, adder, false, &reason).await;
            }
            BotAddVerdict::Unauthorized { reason } => {
                notify::send_dm(&ctx.http, adder, &notify::bot_banned_notice()).await;
                self.punish_actor(&ctx, guild_id, adder, false, &reason).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataInner, Settings};
    use crate::detection::Detector;
    use std::sync::{Arc, RwLock};

    fn test_data() -> Data {
        Data(Arc::new(DataInner {
            settings: RwLock::new(Settings::default()),
            detector: Detector::new(),
        }))
    }

    #[test]
    fn test_handler_creation() {
        let handler = Handler::new(test_data());
        assert!(!handler.data.is_whitelisted(1));
    }

    #[test]
    fn test_handler_implements_event_handler() {
        // This test verifies at compile time that Handler implements EventHandler
        fn assert_impl<T: EventHandler>() {}
        assert_impl::<Handler>();
    }

    #[test]
    fn recognizes_bot_invite_links() {
        assert!(is_bot_invite_link(
            "check this out https://discord.com/oauth2/authorize?client_id=1"
        ));
        assert!(is_bot_invite_link(
            "HTTPS://DISCORDAPP.COM/OAUTH2/AUTHORIZE?client_id=1"
        ));
    }

    #[test]
    fn role_and_everyone_pings_count_toward_the_mention_limit() {
        assert_eq!(mention_total(3, 2, true), 6);
        assert_eq!(mention_total(0, 5, false), 5);
        // An @everyone with no other pings still registers
        assert_eq!(mention_total(0, 0, true), 1);
    }

    #[test]
    fn ignores_ordinary_links() {
        assert!(!is_bot_invite_link("https://discord.com/channels/1/2/3"));
        assert!(!is_bot_invite_link("https://discord.gg/abcdef"));
        assert!(!is_bot_invite_link("plain text without links"));
    }
}
