use std::sync::Arc;

use serenity::model::id::{ChannelId, UserId};
use tracing::{debug, error, info, warn};

use super::lifecycle::{ChannelLifecycle, Origin, Release};
use super::platform::VoicePlatform;
use super::privacy::PrivacyReport;
use super::registry::OwnershipRegistry;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    JoinedTrigger,
    /// Moved from their own room to some other channel.
    LeftOwned(ChannelId),
    /// Left voice entirely while owning a room.
    Disconnected(ChannelId),
    Other,
}

/// Classifies one voice state change of a member.
///
/// `owned` is the member's room according to the registry.
pub fn classify(
    trigger: ChannelId,
    owned: Option<ChannelId>,
    previous: Option<ChannelId>,
    current: Option<ChannelId>,
) -> Transition {
    if current == Some(trigger) {
        return if previous == Some(trigger) {
            Transition::Other
        } else {
            Transition::JoinedTrigger
        };
    }

    let Some(owned) = owned else {
        return Transition::Other;
    };
    match current {
        Some(current) if current == owned => Transition::Other,
        None => Transition::Disconnected(owned),
        Some(_) if previous == Some(owned) => Transition::LeftOwned(owned),
        Some(_) => Transition::Other,
    }
}

pub struct PresenceHandler {
    lifecycle: ChannelLifecycle,
}

impl PresenceHandler {
    pub fn new(lifecycle: ChannelLifecycle) -> Self {
        Self { lifecycle }
    }

    pub fn registry(&self) -> &Arc<OwnershipRegistry> {
        self.lifecycle.registry()
    }

    /// Reacts to `user` moving from `previous` to `current`. Errors are logged, not returned.
    pub async fn handle<P: VoicePlatform>(
        &self,
        platform: &P,
        user: UserId,
        previous: Option<ChannelId>,
        current: Option<ChannelId>,
    ) -> Transition {
        let trigger = self.lifecycle.settings().trigger;
        let owned = self.registry().get(user);
        let transition = classify(trigger, owned, previous, current);
        debug!(%user, ?previous, ?current, ?transition, "voice state changed");

        if let Some(room) = owned.filter(|room| current == Some(*room)) {
            self.lifecycle.settle(user, room);
        }

        match transition {
            Transition::JoinedTrigger => match self.lifecycle.provision(platform, user).await {
                Ok(provisioned) => {
                    let room = &provisioned.channel.name;
                    let private = provisioned
                        .privacy
                        .as_ref()
                        .map_or(true, PrivacyReport::is_private);
                    match provisioned.origin {
                        Origin::Owned => info!(%user, %room, "member moved back into their room"),
                        Origin::Reused { slot, .. } | Origin::Created { slot } => {
                            info!(%user, %room, slot, private, "member moved into their room")
                        }
                    }
                }
                Err(e) => report(user, "provision", &e),
            },
            Transition::LeftOwned(room) | Transition::Disconnected(room) => {
                match self.lifecycle.release_if_empty(platform, user, room).await {
                    Ok(Release::Occupied(occupants)) => {
                        info!(%user, %room, occupants, "room kept; members still inside")
                    }
                    Ok(_) => {}
                    Err(e) => report(user, "release", &e),
                }
            }
            Transition::Other => {}
        }
        transition
    }
}

fn report(user: UserId, operation: &'static str, error: &Error) {
    let code = error.code();
    match error {
        Error::TriggerChannel(_) => {
            error!(%user, operation, code, %error, "critical: trigger channel protection tripped")
        }
        _ if error.is_not_found() => debug!(%user, operation, code, "target vanished"),
        _ if error.is_retryable() => {
            warn!(%user, operation, code, %error, "rejoin the trigger channel to retry")
        }
        _ if error.is_permission_denied() => error!(
            %user,
            operation,
            code,
            %error,
            "permission denied: give the bot role Manage Channels, Manage Roles and Move Members \
             on the trigger's category, or move the bot role above the roles it manages"
        ),
        _ => error!(%user, operation, code, %error, "room operation failed"),
    }
}
