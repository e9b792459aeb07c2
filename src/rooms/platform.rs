use serenity::async_trait;
use serenity::model::channel::{PermissionOverwrite, PermissionOverwriteType};
use serenity::model::id::{ChannelId, GuildId, RoleId, UserId};
use serenity::model::permissions::Permissions;

use crate::error::PlatformError;

/// Snapshot of a voice channel as seen at the time of the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceChannel {
    pub id: ChannelId,
    pub name: String,
    pub parent: Option<ChannelId>,
    /// Connected members, bots excluded.
    pub occupants: usize,
}

impl VoiceChannel {
    pub fn is_empty(&self) -> bool {
        self.occupants == 0
    }
}

/// Parameters for a new voice channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChannel {
    pub name: String,
    pub parent: Option<ChannelId>,
    pub user_limit: u32,
}

/// What the bot itself is allowed to do in a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standing {
    pub permissions: Permissions,
    pub top_role_position: u16,
}

/// Remote channel management. Every call may be slow or fail independently.
#[async_trait]
pub trait VoicePlatform: Send + Sync {
    /// Fetches a channel. A channel that no longer exists is `Ok(None)`.
    async fn channel(&self, id: ChannelId) -> Result<Option<VoiceChannel>, PlatformError>;

    /// Lists every voice channel of the guild with live occupancy.
    async fn voice_channels(&self, guild: GuildId) -> Result<Vec<VoiceChannel>, PlatformError>;

    async fn create_voice_channel(
        &self,
        guild: GuildId,
        request: &NewChannel,
    ) -> Result<VoiceChannel, PlatformError>;

    /// Creates the overwrite, or replaces the one already set for the same subject.
    async fn set_overwrite(
        &self,
        channel: ChannelId,
        overwrite: PermissionOverwrite,
    ) -> Result<(), PlatformError>;

    async fn delete_overwrite(
        &self,
        channel: ChannelId,
        subject: PermissionOverwriteType,
    ) -> Result<(), PlatformError>;

    async fn overwrites(&self, channel: ChannelId) -> Result<Vec<PermissionOverwrite>, PlatformError>;

    async fn move_member(
        &self,
        guild: GuildId,
        user: UserId,
        channel: ChannelId,
    ) -> Result<(), PlatformError>;

    async fn delete_channel(&self, channel: ChannelId) -> Result<(), PlatformError>;

    /// The bot's own permissions, if the guild is cached.
    fn standing(&self, guild: GuildId) -> Option<Standing>;

    fn role_position(&self, guild: GuildId, role: RoleId) -> Option<u16>;
}
