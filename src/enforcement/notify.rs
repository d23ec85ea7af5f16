//! Direct-message notifications
//!
//! One template per scenario, rendered separately from delivery so the
//! wording is testable. Delivery failures (DMs closed, user gone) are logged
//! and never block enforcement.

use serenity::http::Http;
use serenity::model::id::UserId;
use tracing::warn;

use crate::ENFORCEMENT_TARGET;

pub fn link_first_warning() -> String {
    "Warning: posting bot invite links is not allowed here. The message was \
     deleted. A second offense will be punished."
        .to_string()
}

pub fn link_repeat_notice() -> String {
    "You posted a bot invite link again after a warning. Your roles have been \
     removed and you have been timed out."
        .to_string()
}

pub fn whitelist_link_warning() -> String {
    "Warning: even whitelisted members may not post bot invite links. The \
     message was deleted. A second offense removes you from the whitelist."
        .to_string()
}

pub fn whitelist_eviction_notice() -> String {
    "You have been removed from the whitelist after a repeated offense. \
     Adding bots is blocked for the next 24 hours."
        .to_string()
}

pub fn daily_limit_notice() -> String {
    "You exceeded the daily limit for bot invite links (2 per day) and have \
     been punished."
        .to_string()
}

pub fn bot_add_warning() -> String {
    "Warning: the bot you added has been banned. Whitelisted members may not \
     add bots without review. A second offense removes you from the whitelist."
        .to_string()
}

pub fn cooldown_notice(remaining_hours: i64) -> String {
    format!(
        "The bot you added has been banned. You are on a bot-addition \
         cooldown for another {remaining_hours} hour(s)."
    )
}

pub fn bot_banned_notice() -> String {
    "The bot you added has been banned. Only whitelisted members may add \
     bots to this server."
        .to_string()
}

pub fn wrongful_ban_apology(guild_name: &str, invite_url: Option<&str>) -> String {
    match invite_url {
        Some(url) => format!(
            "You were banned from {guild_name} by an unauthorized action. The \
             ban has been lifted. You can rejoin with this single-use invite: {url}"
        ),
        None => format!(
            "You were banned from {guild_name} by an unauthorized action. The \
             ban has been lifted; please ask a moderator for a new invite."
        ),
    }
}

/// Send a DM, logging (not propagating) any failure.
pub async fn send_dm(http: &Http, user_id: UserId, content: &str) {
    let channel = match user_id.create_dm_channel(http).await {
        Ok(channel) => channel,
        Err(e) => {
            warn!(
                target: ENFORCEMENT_TARGET,
                user_id = user_id.get(),
                error = %e,
                "Could not open DM channel"
            );
            return;
        }
    };
    if let Err(e) = channel.id.say(http, content).await {
        warn!(
            target: ENFORCEMENT_TARGET,
            user_id = user_id.get(),
            error = %e,
            "Could not deliver DM"
        );
    }
}
