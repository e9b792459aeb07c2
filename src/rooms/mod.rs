use serenity::model::id::{ChannelId, GuildId, RoleId};

pub mod lifecycle;
pub mod platform;
pub mod presence;
pub mod privacy;
pub mod reconcile;
pub mod registry;
pub mod slots;

#[cfg(test)]
pub(crate) mod testing;

/// Identifiers and naming the core works against. Fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSettings {
    pub guild: GuildId,
    pub trigger: ChannelId,
    pub excluded_role: RoleId,
    pub privileged_role: RoleId,
    /// Rooms are named `<prefix> <slot>`.
    pub prefix: String,
}
