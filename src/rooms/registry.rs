use dashmap::DashMap;
use serenity::model::id::{ChannelId, UserId};
use tracing::{debug, error};

use crate::error::Error;

#[derive(Debug)]
pub struct OwnershipRegistry {
    trigger: ChannelId,
    owners: DashMap<UserId, ChannelId>,
}

impl OwnershipRegistry {
    pub fn new(trigger: ChannelId) -> Self {
        Self {
            trigger,
            owners: DashMap::new(),
        }
    }

    pub fn get(&self, user: UserId) -> Option<ChannelId> {
        self.owners.get(&user).map(|entry| *entry)
    }

    /// Records `user` as the owner of `channel`, replacing any previous room.
    ///
    /// Rejects the trigger channel and leaves the registry untouched.
    pub fn set(&self, user: UserId, channel: ChannelId) -> Result<Option<ChannelId>, Error> {
        if channel == self.trigger {
            error!(%user, %channel, "critical: refused to register the trigger channel as a private room");
            return Err(Error::TriggerChannel(channel));
        }
        let previous = self.owners.insert(user, channel);
        debug!(%user, %channel, ?previous, "room owner recorded");
        Ok(previous)
    }

    pub fn delete(&self, user: UserId) -> Option<ChannelId> {
        self.owners.remove(&user).map(|(_, channel)| channel)
    }

    /// Removes the entry only if it still points at `channel`.
    pub fn delete_if(&self, user: UserId, channel: ChannelId) -> bool {
        self.owners
            .remove_if(&user, |_, owned| *owned == channel)
            .is_some()
    }

    /// Drops every entry pointing at `channel`, returning the former owners.
    pub fn release_channel(&self, channel: ChannelId) -> Vec<UserId> {
        let owners: Vec<UserId> = self
            .owners
            .iter()
            .filter(|entry| *entry.value() == channel)
            .map(|entry| *entry.key())
            .collect();
        owners
            .into_iter()
            .filter(|user| self.delete_if(*user, channel))
            .collect()
    }

    pub fn entries(&self) -> Vec<(UserId, ChannelId)> {
        self.owners
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
