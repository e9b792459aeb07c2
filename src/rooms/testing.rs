use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use serenity::async_trait;
use serenity::model::channel::{PermissionOverwrite, PermissionOverwriteType};
use serenity::model::id::{ChannelId, GuildId, RoleId, UserId};
use serenity::model::permissions::Permissions;

use super::platform::{NewChannel, Standing, VoiceChannel, VoicePlatform};
use super::RoomSettings;
use crate::error::PlatformError;

pub const CATEGORY: ChannelId = ChannelId::new(500);

#[derive(Debug)]
struct MockChannel {
    name: String,
    parent: Option<ChannelId>,
    overwrites: Vec<PermissionOverwrite>,
}

#[derive(Debug)]
struct State {
    next_id: u64,
    channels: BTreeMap<ChannelId, MockChannel>,
    locations: HashMap<UserId, ChannelId>,
    created: Vec<NewChannel>,
    deleted: Vec<ChannelId>,
    moves: Vec<(UserId, ChannelId)>,
    writes: Vec<(ChannelId, PermissionOverwrite)>,
    permissions: Permissions,
    reject_category: bool,
    reject_create: bool,
    reject_overwrites: bool,
    reject_moves: bool,
    hang_create: bool,
    create_as: Option<ChannelId>,
    fill_on_fetch: Option<(ChannelId, UserId)>,
    strip: Option<(RoleId, usize)>,
}

pub struct MockPlatform {
    settings: RoomSettings,
    state: Mutex<State>,
}

impl MockPlatform {
    /// A guild holding only the trigger channel, inside [`CATEGORY`].
    pub fn new(settings: RoomSettings) -> Self {
        let mut channels = BTreeMap::new();
        channels.insert(
            settings.trigger,
            MockChannel {
                name: "Create a room".into(),
                parent: Some(CATEGORY),
                overwrites: Vec::new(),
            },
        );
        Self {
            settings,
            state: Mutex::new(State {
                next_id: 100,
                channels,
                locations: HashMap::new(),
                created: Vec::new(),
                deleted: Vec::new(),
                moves: Vec::new(),
                writes: Vec::new(),
                permissions: Permissions::all(),
                reject_category: false,
                reject_create: false,
                reject_overwrites: false,
                reject_moves: false,
                hang_create: false,
                create_as: None,
                fill_on_fetch: None,
                strip: None,
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn add_channel(&self, name: &str, parent: Option<ChannelId>) -> ChannelId {
        self.with(|s| {
            let id = ChannelId::new(s.next_id);
            s.next_id += 1;
            s.channels.insert(
                id,
                MockChannel {
                    name: name.into(),
                    parent,
                    overwrites: Vec::new(),
                },
            );
            id
        })
    }

    /// Deletes a channel behind the bot's back.
    pub fn remove_channel(&self, id: ChannelId) {
        self.with(|s| {
            s.channels.remove(&id);
            s.locations.retain(|_, at| *at != id);
        });
    }

    pub fn rename(&self, id: ChannelId, name: &str) {
        self.with(|s| {
            if let Some(channel) = s.channels.get_mut(&id) {
                channel.name = name.into();
            }
        });
    }

    /// Puts a member somewhere (or nowhere) without going through the bot.
    pub fn place(&self, user: UserId, channel: Option<ChannelId>) {
        self.with(|s| match channel {
            Some(channel) => {
                s.locations.insert(user, channel);
            }
            None => {
                s.locations.remove(&user);
            }
        });
    }

    pub fn location(&self, user: UserId) -> Option<ChannelId> {
        self.with(|s| s.locations.get(&user).copied())
    }

    pub fn exists(&self, id: ChannelId) -> bool {
        self.with(|s| s.channels.contains_key(&id))
    }

    pub fn name(&self, id: ChannelId) -> Option<String> {
        self.with(|s| s.channels.get(&id).map(|c| c.name.clone()))
    }

    pub fn parent(&self, id: ChannelId) -> Option<ChannelId> {
        self.with(|s| s.channels.get(&id).and_then(|c| c.parent))
    }

    pub fn created(&self) -> Vec<NewChannel> {
        self.with(|s| s.created.clone())
    }

    pub fn deleted(&self) -> Vec<ChannelId> {
        self.with(|s| s.deleted.clone())
    }

    pub fn moves(&self) -> Vec<(UserId, ChannelId)> {
        self.with(|s| s.moves.clone())
    }

    /// Every overwrite write against `channel`, in order.
    pub fn overwrite_writes(&self, channel: ChannelId) -> Vec<PermissionOverwrite> {
        self.with(|s| {
            s.writes
                .iter()
                .filter(|(id, _)| *id == channel)
                .map(|(_, o)| o.clone())
                .collect()
        })
    }

    pub fn set_permissions(&self, permissions: Permissions) {
        self.with(|s| s.permissions = permissions);
    }

    pub fn reject_category_creation(&self) {
        self.with(|s| s.reject_category = true);
    }

    pub fn reject_creation(&self) {
        self.with(|s| s.reject_create = true);
    }

    pub fn reject_overwrites(&self) {
        self.with(|s| s.reject_overwrites = true);
    }

    pub fn reject_moves(&self) {
        self.with(|s| s.reject_moves = true);
    }

    /// Channel creation never completes.
    pub fn hang_creation(&self) {
        self.with(|s| s.hang_create = true);
    }

    /// Channel creation answers with `id` instead of a new channel.
    pub fn create_as(&self, id: ChannelId) {
        self.with(|s| s.create_as = Some(id));
    }

    /// `user` walks into `channel` right as the next fetch of it happens.
    pub fn fill_on_fetch(&self, channel: ChannelId, user: UserId) {
        self.with(|s| s.fill_on_fetch = Some((channel, user)));
    }

    /// The next `writes` overwrites for `role` land without View Channel denied.
    pub fn strip_deny_on_write(&self, role: RoleId, writes: usize) {
        self.with(|s| s.strip = Some((role, writes)));
    }

    fn snapshot(s: &State, id: ChannelId) -> Option<VoiceChannel> {
        let channel = s.channels.get(&id)?;
        Some(VoiceChannel {
            id,
            name: channel.name.clone(),
            parent: channel.parent,
            occupants: s.locations.values().filter(|at| **at == id).count(),
        })
    }
}

#[async_trait]
impl VoicePlatform for MockPlatform {
    async fn channel(&self, id: ChannelId) -> Result<Option<VoiceChannel>, PlatformError> {
        tokio::task::yield_now().await;
        Ok(self.with(|s| {
            if let Some((channel, user)) = s.fill_on_fetch {
                if channel == id {
                    s.locations.insert(user, channel);
                    s.fill_on_fetch = None;
                }
            }
            Self::snapshot(s, id)
        }))
    }

    async fn voice_channels(&self, guild: GuildId) -> Result<Vec<VoiceChannel>, PlatformError> {
        assert_eq!(guild, self.settings.guild);
        tokio::task::yield_now().await;
        Ok(self.with(|s| {
            s.channels
                .keys()
                .filter_map(|id| Self::snapshot(s, *id))
                .collect()
        }))
    }

    async fn create_voice_channel(
        &self,
        guild: GuildId,
        request: &NewChannel,
    ) -> Result<VoiceChannel, PlatformError> {
        assert_eq!(guild, self.settings.guild);
        tokio::task::yield_now().await;
        if self.with(|s| s.hang_create) {
            std::future::pending::<()>().await;
        }
        self.with(|s| {
            if let Some(id) = s.create_as {
                return Ok(VoiceChannel {
                    id,
                    name: request.name.clone(),
                    parent: request.parent,
                    occupants: 0,
                });
            }
            if s.reject_create || (s.reject_category && request.parent.is_some()) {
                return Err(PlatformError::PermissionDenied("Missing Permissions".into()));
            }
            let id = ChannelId::new(s.next_id);
            s.next_id += 1;
            s.channels.insert(
                id,
                MockChannel {
                    name: request.name.clone(),
                    parent: request.parent,
                    overwrites: Vec::new(),
                },
            );
            s.created.push(request.clone());
            Ok(VoiceChannel {
                id,
                name: request.name.clone(),
                parent: request.parent,
                occupants: 0,
            })
        })
    }

    async fn set_overwrite(
        &self,
        channel: ChannelId,
        overwrite: PermissionOverwrite,
    ) -> Result<(), PlatformError> {
        tokio::task::yield_now().await;
        self.with(|s| {
            if s.reject_overwrites {
                return Err(PlatformError::PermissionDenied("Missing Permissions".into()));
            }
            let mut stored = overwrite.clone();
            if let Some((role, remaining)) = s.strip.as_mut() {
                if *remaining > 0 && overwrite.kind == PermissionOverwriteType::Role(*role) {
                    *remaining -= 1;
                    stored.deny.remove(Permissions::VIEW_CHANNEL);
                }
            }
            s.writes.push((channel, overwrite));
            let target = s.channels.get_mut(&channel).ok_or(PlatformError::NotFound)?;
            target.overwrites.retain(|o| o.kind != stored.kind);
            target.overwrites.push(stored);
            Ok(())
        })
    }

    async fn delete_overwrite(
        &self,
        channel: ChannelId,
        subject: PermissionOverwriteType,
    ) -> Result<(), PlatformError> {
        tokio::task::yield_now().await;
        self.with(|s| {
            let target = s.channels.get_mut(&channel).ok_or(PlatformError::NotFound)?;
            let before = target.overwrites.len();
            target.overwrites.retain(|o| o.kind != subject);
            if target.overwrites.len() == before {
                return Err(PlatformError::NotFound);
            }
            Ok(())
        })
    }

    async fn overwrites(&self, channel: ChannelId) -> Result<Vec<PermissionOverwrite>, PlatformError> {
        tokio::task::yield_now().await;
        self.with(|s| {
            s.channels
                .get(&channel)
                .map(|c| c.overwrites.clone())
                .ok_or(PlatformError::NotFound)
        })
    }

    async fn move_member(
        &self,
        guild: GuildId,
        user: UserId,
        channel: ChannelId,
    ) -> Result<(), PlatformError> {
        assert_eq!(guild, self.settings.guild);
        tokio::task::yield_now().await;
        self.with(|s| {
            if s.reject_moves {
                return Err(PlatformError::PermissionDenied("Missing Permissions".into()));
            }
            if !s.channels.contains_key(&channel) {
                return Err(PlatformError::NotFound);
            }
            s.locations.insert(user, channel);
            s.moves.push((user, channel));
            Ok(())
        })
    }

    async fn delete_channel(&self, channel: ChannelId) -> Result<(), PlatformError> {
        tokio::task::yield_now().await;
        self.with(|s| {
            s.channels.remove(&channel).ok_or(PlatformError::NotFound)?;
            s.locations.retain(|_, at| *at != channel);
            s.deleted.push(channel);
            Ok(())
        })
    }

    fn standing(&self, _guild: GuildId) -> Option<Standing> {
        Some(Standing {
            permissions: self.with(|s| s.permissions),
            top_role_position: 10,
        })
    }

    fn role_position(&self, _guild: GuildId, role: RoleId) -> Option<u16> {
        (role == self.settings.excluded_role).then_some(1)
    }
}
