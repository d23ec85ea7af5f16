use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use poise::{command, ChoiceParameter, CreateReply};

/// One of the four protection toggles.
#[derive(Debug, Clone, Copy, ChoiceParameter)]
pub enum ProtectionFeature {
    #[name = "mentions"]
    Mentions,
    #[name = "channels"]
    Channels,
    #[name = "roles"]
    Roles,
    #[name = "categories"]
    Categories,
}

/// A punishment option that can be switched on or off.
#[derive(Debug, Clone, Copy, ChoiceParameter)]
pub enum PunishmentOption {
    #[name = "user-ban"]
    UserBan,
    #[name = "user-mute"]
    UserMute,
    #[name = "user-remove-roles"]
    UserRemoveRoles,
    #[name = "bot-ban"]
    BotBan,
    #[name = "bot-remove-roles"]
    BotRemoveRoles,
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

async fn reply_ephemeral(ctx: Context<'_>, content: String) -> Result<(), Error> {
    ctx.send(CreateReply::default().content(content).ephemeral(true))
        .await?;
    Ok(())
}

/// View and configure the anti-nuke protections
#[command(
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    subcommands("show", "toggle", "punishment"),
    subcommand_required
)]
pub async fn protections(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show the current protection and punishment settings
#[command(slash_command, guild_only)]
pub async fn show(ctx: Context<'_>) -> Result<(), Error> {
    let settings = ctx.data().settings_snapshot();
    let content = format!(
        "Mention protection: {} (max {} mentions)\n\
         Channel protection: {}\n\
         Role protection: {}\n\
         Category protection: {}\n\
         Bot punishment: ban {}, remove roles {}\n\
         User punishment (informational): ban {}, mute {} ({} days), remove roles {}\n\
         Whitelist: {} member(s)",
        on_off(settings.mention_protection.enabled),
        settings.mention_protection.max_mentions,
        on_off(settings.channel_protection.enabled),
        on_off(settings.role_protection.enabled),
        on_off(settings.category_protection.enabled),
        on_off(settings.punishment.bots.ban),
        on_off(settings.punishment.bots.remove_roles),
        on_off(settings.punishment.users.ban),
        on_off(settings.punishment.users.mute),
        settings.punishment.users.mute_duration_days,
        on_off(settings.punishment.users.remove_roles),
        settings.whitelist.len(),
    );
    reply_ephemeral(ctx, content).await
}

/// Enable or disable one protection
#[command(slash_command, guild_only)]
pub async fn toggle(
    ctx: Context<'_>,
    #[description = "Which protection to change"] feature: ProtectionFeature,
    #[description = "Whether the protection is active"] enabled: bool,
    #[description = "New mention limit (mentions only)"]
    #[min = 1]
    max_mentions: Option<u32>,
) -> Result<(), Error> {
    ctx.data().update_settings(|settings| match feature {
        ProtectionFeature::Mentions => {
            settings.mention_protection.enabled = enabled;
            if let Some(max) = max_mentions {
                settings.mention_protection.max_mentions = max as usize;
            }
        }
        ProtectionFeature::Channels => settings.channel_protection.enabled = enabled,
        ProtectionFeature::Roles => settings.role_protection.enabled = enabled,
        ProtectionFeature::Categories => settings.category_protection.enabled = enabled,
    });
    ctx.data().save().await?;
    reply_ephemeral(
        ctx,
        format!("{} protection is now {}.", feature.name(), on_off(enabled)),
    )
    .await
}

/// Switch a punishment option on or off
#[command(slash_command, guild_only)]
pub async fn punishment(
    ctx: Context<'_>,
    #[description = "Which punishment option to change"] option: PunishmentOption,
    #[description = "Whether the option is active"] enabled: bool,
) -> Result<(), Error> {
    ctx.data().update_settings(|settings| match option {
        PunishmentOption::UserBan => settings.punishment.users.ban = enabled,
        PunishmentOption::UserMute => settings.punishment.users.mute = enabled,
        PunishmentOption::UserRemoveRoles => settings.punishment.users.remove_roles = enabled,
        PunishmentOption::BotBan => settings.punishment.bots.ban = enabled,
        PunishmentOption::BotRemoveRoles => settings.punishment.bots.remove_roles = enabled,
    });
    ctx.data().save().await?;
    reply_ephemeral(
        ctx,
        format!("Punishment option {} is now {}.", option.name(), on_off(enabled)),
    )
    .await
}

/// Only the guild owner may change who is exempt from detection.
async fn guild_owner_check(ctx: Context<'_>) -> Result<bool, Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(false);
    };
    let guild = guild_id.to_partial_guild(ctx.http()).await?;
    if guild.owner_id == ctx.author().id {
        return Ok(true);
    }
    reply_ephemeral(
        ctx,
        "Only the server owner can manage the whitelist.".to_string(),
    )
    .await?;
    Ok(false)
}

/// Manage the whitelist of members exempt from detection
#[command(
    slash_command,
    guild_only,
    check = "guild_owner_check",
    subcommands("add", "remove", "list"),
    subcommand_required
)]
pub async fn whitelist(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Add a member to the whitelist
#[command(slash_command, guild_only)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Member to exempt"] user: serenity::User,
) -> Result<(), Error> {
    if ctx.data().whitelist_add(user.id.get()) {
        ctx.data().save().await?;
        reply_ephemeral(ctx, format!("Added <@{}> to the whitelist.", user.id.get())).await
    } else {
        reply_ephemeral(
            ctx,
            format!("<@{}> is already on the whitelist.", user.id.get()),
        )
        .await
    }
}

/// Remove a member from the whitelist
#[command(slash_command, guild_only)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Member to remove"] user: serenity::User,
) -> Result<(), Error> {
    if ctx.data().whitelist_remove(user.id.get()) {
        ctx.data().save().await?;
        reply_ephemeral(
            ctx,
            format!("Removed <@{}> from the whitelist.", user.id.get()),
        )
        .await
    } else {
        reply_ephemeral(
            ctx,
            format!("<@{}> is not on the whitelist.", user.id.get()),
        )
        .await
    }
}

/// List the whitelisted members
#[command(slash_command, guild_only)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let whitelist = ctx.data().settings_snapshot().whitelist;
    let content = if whitelist.is_empty() {
        "The whitelist is empty.".to_string()
    } else {
        let mentions: Vec<String> = whitelist.iter().map(|id| format!("<@{id}>")).collect();
        format!("Whitelisted members: {}", mentions.join(", "))
    };
    reply_ephemeral(ctx, content).await
}
