use std::collections::HashMap;

use serenity::async_trait;
use serenity::builder::CreateChannel;
use serenity::client::Context;
use serenity::model::channel::{
    Channel, ChannelType, GuildChannel, PermissionOverwrite, PermissionOverwriteType,
};
use serenity::model::id::{ChannelId, GuildId, RoleId, UserId};
use serenity::model::permissions::Permissions;

use crate::error::PlatformError;
use crate::rooms::platform::{NewChannel, Standing, VoiceChannel, VoicePlatform};

//==================================================================================================
//      SerenityPlatform
//--------------------------------------------------------------------------------------------------

/// [`VoicePlatform`] over a live serenity client.
///
/// Channel listings and existence checks go over HTTP; occupancy comes from
/// the gateway's voice state cache, which serenity updates before it
/// dispatches the event that triggered the call.
pub struct SerenityPlatform {
    ctx: Context,
}

impl SerenityPlatform {
    pub fn new(ctx: Context) -> Self {
        SerenityPlatform { ctx }
    }

    /// Human members connected to each voice channel of the guild.
    fn occupancy(&self, guild_id: GuildId) -> Result<HashMap<ChannelId, usize>, PlatformError> {
        let guild = self
            .ctx
            .cache
            .guild(guild_id)
            .ok_or(PlatformError::CacheMiss(guild_id.get()))?;

        let mut counts = HashMap::new();
        for state in guild.voice_states.values() {
            let Some(channel) = state.channel_id else {
                continue;
            };
            let bot = state
                .member
                .as_ref()
                .map(|member| member.user.bot)
                .or_else(|| guild.members.get(&state.user_id).map(|member| member.user.bot))
                .unwrap_or(false);
            if !bot {
                *counts.entry(channel).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn guild_channel(&self, id: ChannelId) -> Result<Option<GuildChannel>, PlatformError> {
        match self.ctx.http.get_channel(id).await {
            Ok(Channel::Guild(channel)) => Ok(Some(channel)),
            Ok(_) => Ok(None),
            Err(e) => match PlatformError::from(e) {
                PlatformError::NotFound => Ok(None),
                e => Err(e),
            },
        }
    }
}

fn snapshot(channel: GuildChannel, occupancy: &HashMap<ChannelId, usize>) -> VoiceChannel {
    VoiceChannel {
        occupants: occupancy.get(&channel.id).copied().unwrap_or(0),
        id: channel.id,
        name: channel.name,
        parent: channel.parent_id,
    }
}

#[async_trait]
impl VoicePlatform for SerenityPlatform {
    async fn channel(&self, id: ChannelId) -> Result<Option<VoiceChannel>, PlatformError> {
        let Some(channel) = self.guild_channel(id).await? else {
            return Ok(None);
        };
        let occupancy = self.occupancy(channel.guild_id)?;
        Ok(Some(snapshot(channel, &occupancy)))
    }

    async fn voice_channels(&self, guild: GuildId) -> Result<Vec<VoiceChannel>, PlatformError> {
        let channels = guild.channels(&self.ctx.http).await?;
        let occupancy = self.occupancy(guild)?;
        Ok(channels
            .into_values()
            .filter(|channel| channel.kind == ChannelType::Voice)
            .map(|channel| snapshot(channel, &occupancy))
            .collect())
    }

    async fn create_voice_channel(
        &self,
        guild: GuildId,
        request: &NewChannel,
    ) -> Result<VoiceChannel, PlatformError> {
        let mut builder = CreateChannel::new(request.name.clone())
            .kind(ChannelType::Voice)
            .user_limit(request.user_limit);
        if let Some(parent) = request.parent {
            builder = builder.category(parent);
        }

        let channel = guild.create_channel(&self.ctx.http, builder).await?;
        Ok(VoiceChannel {
            id: channel.id,
            name: channel.name,
            parent: channel.parent_id,
            occupants: 0,
        })
    }

    async fn set_overwrite(
        &self,
        channel: ChannelId,
        overwrite: PermissionOverwrite,
    ) -> Result<(), PlatformError> {
        channel.create_permission(&self.ctx.http, overwrite).await?;
        Ok(())
    }

    async fn delete_overwrite(
        &self,
        channel: ChannelId,
        subject: PermissionOverwriteType,
    ) -> Result<(), PlatformError> {
        channel.delete_permission(&self.ctx.http, subject).await?;
        Ok(())
    }

    async fn overwrites(&self, channel: ChannelId) -> Result<Vec<PermissionOverwrite>, PlatformError> {
        self.guild_channel(channel)
            .await?
            .map(|channel| channel.permission_overwrites)
            .ok_or(PlatformError::NotFound)
    }

    async fn move_member(
        &self,
        guild: GuildId,
        user: UserId,
        channel: ChannelId,
    ) -> Result<(), PlatformError> {
        guild.move_member(&self.ctx.http, user, channel).await?;
        Ok(())
    }

    async fn delete_channel(&self, channel: ChannelId) -> Result<(), PlatformError> {
        channel.delete(&self.ctx.http).await?;
        Ok(())
    }

    fn standing(&self, guild_id: GuildId) -> Option<Standing> {
        let bot = self.ctx.cache.current_user().id;
        let guild = self.ctx.cache.guild(guild_id)?;

        if guild.owner_id == bot {
            return Some(Standing {
                permissions: Permissions::all(),
                top_role_position: u16::MAX,
            });
        }

        let member = guild.members.get(&bot)?;
        let everyone = guild
            .roles
            .get(&RoleId::new(guild_id.get()))
            .map_or(Permissions::empty(), |role| role.permissions);
        let (permissions, top_role_position) = member
            .roles
            .iter()
            .filter_map(|id| guild.roles.get(id))
            .fold((everyone, 0), |(permissions, top), role| {
                (permissions | role.permissions, top.max(role.position))
            });

        let permissions = if permissions.contains(Permissions::ADMINISTRATOR) {
            Permissions::all()
        } else {
            permissions
        };
        Some(Standing {
            permissions,
            top_role_position,
        })
    }

    fn role_position(&self, guild_id: GuildId, role: RoleId) -> Option<u16> {
        let guild = self.ctx.cache.guild(guild_id)?;
        let position = guild.roles.get(&role).map(|role| role.position);
        position
    }
}
