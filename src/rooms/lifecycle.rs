use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, UserId};
use serenity::model::permissions::Permissions;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::platform::{NewChannel, VoiceChannel, VoicePlatform};
use super::privacy::{privatize, PrivacyPolicy, PrivacyReport};
use super::registry::OwnershipRegistry;
use super::slots::{choose_slot, slot_name, SlotChoice};
use super::RoomSettings;
use crate::error::{Error, PlatformError};

/// Rooms hold their owner plus nobody else.
pub const ROOM_USER_LIMIT: u32 = 1;

/// Upper bound for a remote call made while the allocation lock is held.
pub const LOCKED_CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// How long a handed-out room waits for its owner's voice state before it may be reused.
pub const SETTLE_WINDOW: Duration = Duration::from_secs(30);

/// How a member came by their room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// They already owned it.
    Owned,
    /// An empty room was handed over; `former_owners` were purged from the registry.
    Reused { slot: u32, former_owners: Vec<UserId> },
    Created { slot: u32 },
}

#[derive(Debug)]
pub struct Provisioned {
    pub channel: VoiceChannel,
    pub origin: Origin,
    /// `None` when the room was already owned and left as it was.
    pub privacy: Option<PrivacyReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Deleted,
    /// The channel was already gone; only the registry entry was dropped.
    AlreadyGone,
    /// Humans are still inside, so the room and its owner entry stay.
    Occupied(usize),
    /// Another member is being moved in, or a release is already running.
    Claimed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    /// Handed to `owner`; the cached occupancy may still show it empty.
    Provisioning { owner: UserId, since: Instant },
    Releasing(UserId),
}

impl Claim {
    fn provisioning(owner: UserId) -> Self {
        Claim::Provisioning {
            owner,
            since: Instant::now(),
        }
    }

    fn holds(&self) -> bool {
        match self {
            Claim::Provisioning { since, .. } => since.elapsed() < SETTLE_WINDOW,
            Claim::Releasing(_) => true,
        }
    }

    /// Whether this claim keeps `other` from being taken. An owner leaving
    /// their own room supersedes the hold placed when they were moved in.
    fn blocks(&self, other: &Claim) -> bool {
        match (self, other) {
            (Claim::Provisioning { owner, .. }, Claim::Releasing(user)) if owner == user => false,
            _ => self.holds(),
        }
    }
}

/// Drops its claim unless [`ClaimGuard::keep`] is called.
struct ClaimGuard<'a> {
    claims: &'a DashMap<ChannelId, Claim>,
    channel: ChannelId,
    claim: Claim,
    armed: bool,
}

impl ClaimGuard<'_> {
    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.claims
                .remove_if(&self.channel, |_, claim| *claim == self.claim);
        }
    }
}

pub struct ChannelLifecycle {
    settings: RoomSettings,
    policy: PrivacyPolicy,
    registry: Arc<OwnershipRegistry>,
    /// Serializes slot choice and registry writes for the guild.
    allocation: Mutex<()>,
    /// Rooms being moved into or deleted. Counted as occupied by the slot scan.
    claims: DashMap<ChannelId, Claim>,
    call_timeout: Duration,
}

impl ChannelLifecycle {
    pub fn new(settings: RoomSettings, registry: Arc<OwnershipRegistry>) -> Self {
        Self {
            policy: PrivacyPolicy::new(&settings),
            settings,
            registry,
            allocation: Mutex::new(()),
            claims: DashMap::new(),
            call_timeout: LOCKED_CALL_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<OwnershipRegistry> {
        &self.registry
    }

    /// Gets `user` into a private room of their own, creating one if needed.
    ///
    /// The member is moved while the room's overwrites are still being
    /// written; a failed overwrite is reported, never rolled back.
    pub async fn provision<P: VoicePlatform>(
        &self,
        platform: &P,
        user: UserId,
    ) -> Result<Provisioned, Error> {
        let allocation = self.allocation.lock().await;

        if let Some(owned) = self.registry.get(user) {
            match self.bounded(platform.channel(owned)).await? {
                Some(channel) if channel.id != self.settings.trigger => {
                    drop(allocation);
                    debug!(%user, channel = %channel.id, "member already owns a room");
                    self.move_into(platform, user, channel.id).await?;
                    return Ok(Provisioned {
                        channel,
                        origin: Origin::Owned,
                        privacy: None,
                    });
                }
                _ => {
                    info!(%user, channel = %owned, "owned room is gone; provisioning a new one");
                    self.registry.delete_if(user, owned);
                }
            }
        }

        let trigger = self
            .bounded(platform.channel(self.settings.trigger))
            .await?
            .ok_or(Error::TriggerMissing(self.settings.trigger))?;

        let snapshot: Vec<VoiceChannel> = self
            .bounded(platform.voice_channels(self.settings.guild))
            .await?
            .into_iter()
            .filter(|channel| channel.id != self.settings.trigger)
            .map(|mut channel| {
                if self.claims.get(&channel.id).is_some_and(|claim| claim.holds()) {
                    channel.occupants += 1;
                }
                channel
            })
            .collect();

        let choice = choose_slot(&self.settings.prefix, &snapshot);
        let slot = choice.slot();
        debug!(%user, slot, candidates = snapshot.len(), "slot chosen");
        let (channel, origin, claim) = match choice {
            SlotChoice::Reuse { slot, channel } => {
                let Some(claim) = self.claim(channel, Claim::provisioning(user)) else {
                    return Err(Error::SlotContended { slot, channel });
                };
                let fresh = self.bounded(platform.channel(channel)).await?;
                let Some(fresh) = fresh.filter(VoiceChannel::is_empty) else {
                    return Err(Error::SlotContended { slot, channel });
                };
                let former_owners = self.registry.release_channel(channel);
                if !former_owners.is_empty() {
                    debug!(%channel, ?former_owners, "purged stale owners of reused room");
                }
                info!(%user, %channel, slot, "reusing empty room");
                (fresh, Origin::Reused { slot, former_owners }, Some(claim))
            }
            SlotChoice::Create { slot } => {
                let channel = self.create(platform, slot, trigger.parent).await?;
                info!(%user, channel = %channel.id, name = %channel.name, slot, "room created");
                (channel, Origin::Created { slot }, None)
            }
        };

        if channel.id == self.settings.trigger {
            error!(%user, channel = %channel.id, "critical: trigger channel came back as a private room");
            return Err(Error::TriggerChannel(channel.id));
        }

        let claim = match claim {
            Some(claim) => claim,
            None => self
                .claim(channel.id, Claim::provisioning(user))
                .ok_or(Error::SlotContended {
                    slot,
                    channel: channel.id,
                })?,
        };

        // Claim the room before anything slow so a repeated join finds it.
        self.registry.set(user, channel.id)?;
        drop(allocation);

        let former_owners: &[UserId] = match &origin {
            Origin::Reused { former_owners, .. } => former_owners,
            _ => &[],
        };
        let (moved, privacy) = tokio::join!(
            self.move_into(platform, user, channel.id),
            privatize(
                platform,
                self.settings.guild,
                &self.policy,
                channel.id,
                user,
                former_owners,
            ),
        );
        moved?;
        // The gateway reports the owner inside later; until then the hold stays.
        claim.keep();

        Ok(Provisioned {
            channel,
            origin,
            privacy: Some(privacy),
        })
    }

    /// Lifts the hold on `channel` once `user`'s own voice state shows them inside it.
    pub fn settle(&self, user: UserId, channel: ChannelId) {
        let settled = self.claims.remove_if(&channel, |_, claim| {
            matches!(claim, Claim::Provisioning { owner, .. } if *owner == user)
        });
        if settled.is_some() {
            debug!(%user, %channel, "owner arrived in their room");
        }
    }

    fn claim(&self, channel: ChannelId, claim: Claim) -> Option<ClaimGuard<'_>> {
        match self.claims.entry(channel) {
            Entry::Occupied(held) if held.get().blocks(&claim) => return None,
            Entry::Occupied(mut held) => {
                held.insert(claim);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(claim);
            }
        }
        Some(ClaimGuard {
            claims: &self.claims,
            channel,
            claim,
            armed: true,
        })
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, PlatformError>>,
    ) -> Result<T, Error> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(Error::TimedOut(self.call_timeout)),
        }
    }

    async fn move_into<P: VoicePlatform>(
        &self,
        platform: &P,
        user: UserId,
        channel: ChannelId,
    ) -> Result<(), Error> {
        if channel == self.settings.trigger {
            return Err(Error::TriggerChannel(channel));
        }
        platform
            .move_member(self.settings.guild, user, channel)
            .await
            .map_err(|e| {
                warn!(%user, %channel, error = %e, "could not move member into room");
                Error::from(e)
            })
    }

    /// Creates the room for `slot`, inside `parent` when possible.
    ///
    /// If the category refuses us the room is created at the guild root instead.
    async fn create<P: VoicePlatform>(
        &self,
        platform: &P,
        slot: u32,
        parent: Option<ChannelId>,
    ) -> Result<VoiceChannel, Error> {
        if let Some(standing) = platform.standing(self.settings.guild) {
            if !standing.permissions.contains(Permissions::MANAGE_CHANNELS) {
                return Err(Error::MissingPermission(Permissions::MANAGE_CHANNELS));
            }
        }

        let request = NewChannel {
            name: slot_name(&self.settings.prefix, slot),
            parent,
            user_limit: ROOM_USER_LIMIT,
        };

        match self
            .bounded(platform.create_voice_channel(self.settings.guild, &request))
            .await
        {
            Err(Error::Platform(PlatformError::PermissionDenied(reason))) if parent.is_some() => {
                warn!(
                    %reason,
                    "cannot create rooms in the trigger's category; creating at the guild root"
                );
                let request = NewChannel {
                    parent: None,
                    ..request
                };
                self.bounded(platform.create_voice_channel(self.settings.guild, &request))
                    .await
            }
            result => result,
        }
    }

    /// Deletes `user`'s room if no human is left inside it.
    pub async fn release_if_empty<P: VoicePlatform>(
        &self,
        platform: &P,
        user: UserId,
        owned: ChannelId,
    ) -> Result<Release, Error> {
        if owned == self.settings.trigger {
            self.registry.delete_if(user, owned);
            error!(%user, channel = %owned, "critical: refused to delete the trigger channel");
            return Err(Error::TriggerChannel(owned));
        }

        let Some(_claim) = self.claim(owned, Claim::Releasing(user)) else {
            debug!(%user, channel = %owned, "room is claimed; leaving it alone");
            return Ok(Release::Claimed);
        };

        let channel = match platform.channel(owned).await {
            Ok(Some(channel)) => channel,
            Ok(None) => {
                self.registry.delete_if(user, owned);
                debug!(%user, channel = %owned, "room already deleted");
                return Ok(Release::AlreadyGone);
            }
            Err(e) => {
                self.registry.delete_if(user, owned);
                return Err(e.into());
            }
        };

        if !channel.is_empty() {
            debug!(%user, channel = %owned, occupants = channel.occupants, "room still occupied");
            return Ok(Release::Occupied(channel.occupants));
        }

        let released = match platform.delete_channel(owned).await {
            Ok(()) => {
                info!(%user, channel = %owned, name = %channel.name, "empty room deleted");
                Ok(Release::Deleted)
            }
            Err(PlatformError::NotFound) => Ok(Release::AlreadyGone),
            Err(e) => Err(Error::from(e)),
        };
        self.registry.delete_if(user, owned);
        released
    }
}
