use serenity::model::id::{ChannelId, GuildId, RoleId};
use thiserror::Error;

use crate::rooms::RoomSettings;

pub const DEFAULT_CHANNEL_PREFIX: &str = "💻-SESS° Chatting";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {name} is not a valid id: {value:?}")]
    InvalidId { name: &'static str, value: String },
    #[error("channel prefix must not be empty")]
    EmptyPrefix,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub rooms: RoomSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let token = set("DISCORD_TOKEN")
            .or_else(|| set("BOT_TOKEN"))
            .ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;

        let guild = GuildId::new(id(&lookup, "GUILD_ID")?);
        let trigger = ChannelId::new(id(&lookup, "TRIGGER_CHANNEL_ID")?);
        let excluded_role = RoleId::new(id(&lookup, "EXCLUDED_ROLE_ID")?);
        let privileged_role = RoleId::new(id(&lookup, "PRIVILEGED_ROLE_ID")?);

        let prefix = match lookup("CHANNEL_PREFIX") {
            Some(prefix) if prefix.trim().is_empty() => return Err(ConfigError::EmptyPrefix),
            Some(prefix) => prefix.trim().to_string(),
            None => DEFAULT_CHANNEL_PREFIX.to_string(),
        };

        Ok(Config {
            token,
            rooms: RoomSettings {
                guild,
                trigger,
                excluded_role,
                privileged_role,
                prefix,
            },
        })
    }
}

fn id<F>(lookup: &F, name: &'static str) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name).ok_or(ConfigError::Missing(name))?;
    match value.trim().parse::<u64>() {
        Ok(id) if id != 0 => Ok(id),
        _ => Err(ConfigError::InvalidId { name, value }),
    }
}
