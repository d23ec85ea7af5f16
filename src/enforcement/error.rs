use thiserror::Error;

/// Errors surfaced by the enforcement engine.
#[derive(Error, Debug)]
pub enum EnforcementError {
    #[error("Guild or member not found: {0}")]
    GuildOrMemberNotFound(String),

    #[error("Discord API error: {0}")]
    DiscordApi(#[from] Box<serenity::Error>),
}

pub type EnforcementResult<T> = Result<T, EnforcementError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_their_context() {
        let not_found = EnforcementError::GuildOrMemberNotFound("member 7 in guild 9".to_string());
        assert_eq!(
            not_found.to_string(),
            "Guild or member not found: member 7 in guild 9"
        );

        let api: EnforcementError = Box::new(serenity::Error::Other("gateway closed")).into();
        assert!(api.to_string().contains("gateway closed"));
    }
}
