//! Permission overwrites that make a room private, and the order they are written in.
//!
//! The platform can widen a role's access through category or role
//! inheritance after a deny was written, so the excluded role's deny is
//! written, then the allows, then the deny again, then read back:
//!
//! 1. denies: `@everyone` and the excluded role
//! 2. allows: the owner and the privileged role
//! 3. denies again
//! 4. audit: if the excluded role's overwrite lost View Channel, write it once more
//!
//! Failures never undo anything; they only make the room "not fully private".

use serenity::model::channel::{PermissionOverwrite, PermissionOverwriteType};
use serenity::model::id::{ChannelId, GuildId, RoleId, UserId};
use serenity::model::permissions::Permissions;
use tracing::{debug, error, warn};

use super::platform::VoicePlatform;
use super::RoomSettings;
use crate::error::PlatformError;

pub const EVERYONE_DENY: Permissions = Permissions::VIEW_CHANNEL.union(Permissions::CONNECT);

pub const EXCLUDED_DENY: Permissions = Permissions::VIEW_CHANNEL
    .union(Permissions::CONNECT)
    .union(Permissions::SPEAK)
    .union(Permissions::SEND_MESSAGES)
    .union(Permissions::READ_MESSAGE_HISTORY);

pub const OWNER_ALLOW: Permissions = Permissions::VIEW_CHANNEL
    .union(Permissions::CONNECT)
    .union(Permissions::SPEAK);

pub const PRIVILEGED_ALLOW: Permissions = Permissions::VIEW_CHANNEL.union(Permissions::CONNECT);

/// The overwrite set for one guild.
#[derive(Debug, Clone, Copy)]
pub struct PrivacyPolicy {
    everyone: RoleId,
    excluded: RoleId,
    privileged: RoleId,
}

impl PrivacyPolicy {
    pub fn new(settings: &RoomSettings) -> Self {
        Self {
            // The @everyone role shares the guild's id.
            everyone: RoleId::new(settings.guild.get()),
            excluded: settings.excluded_role,
            privileged: settings.privileged_role,
        }
    }

    pub fn excluded_role(&self) -> RoleId {
        self.excluded
    }

    pub fn denies(&self) -> [PermissionOverwrite; 2] {
        [
            PermissionOverwrite {
                allow: Permissions::empty(),
                deny: EVERYONE_DENY,
                kind: PermissionOverwriteType::Role(self.everyone),
            },
            PermissionOverwrite {
                allow: Permissions::empty(),
                deny: EXCLUDED_DENY,
                kind: PermissionOverwriteType::Role(self.excluded),
            },
        ]
    }

    pub fn allows(&self, owner: UserId) -> [PermissionOverwrite; 2] {
        [
            PermissionOverwrite {
                allow: OWNER_ALLOW,
                deny: Permissions::empty(),
                kind: PermissionOverwriteType::Member(owner),
            },
            PermissionOverwrite {
                allow: PRIVILEGED_ALLOW,
                deny: Permissions::empty(),
                kind: PermissionOverwriteType::Role(self.privileged),
            },
        ]
    }
}

/// Outcome of [`privatize`].
#[derive(Debug, Default)]
pub struct PrivacyReport {
    /// Overwrite protocol was not attempted (bot lacks Manage Roles).
    pub skipped: bool,
    pub failures: Vec<(PermissionOverwriteType, PlatformError)>,
    /// The excluded role's deny had to be written a fourth time.
    pub repaired: bool,
}

impl PrivacyReport {
    pub fn is_private(&self) -> bool {
        !self.skipped && self.failures.is_empty()
    }
}

/// Runs the overwrite protocol on `channel` for `owner`.
///
/// `former_owners` lose their member overwrite (a reused room keeps the
/// previous owner's otherwise).
pub async fn privatize<P: VoicePlatform>(
    platform: &P,
    guild: GuildId,
    policy: &PrivacyPolicy,
    channel: ChannelId,
    owner: UserId,
    former_owners: &[UserId],
) -> PrivacyReport {
    let mut report = PrivacyReport::default();

    if let Some(standing) = platform.standing(guild) {
        if !standing.permissions.contains(Permissions::MANAGE_ROLES) {
            error!(
                %channel,
                "bot lacks Manage Roles; grant it in Server Settings > Roles so rooms can be made private"
            );
            report.skipped = true;
            return report;
        }
    }

    for &former in former_owners.iter().filter(|former| **former != owner) {
        let subject = PermissionOverwriteType::Member(former);
        match platform.delete_overwrite(channel, subject).await {
            Ok(()) | Err(PlatformError::NotFound) => {}
            Err(e) => report.failures.push((subject, e)),
        }
    }

    let denies = policy.denies();
    write_pair(platform, channel, &denies, &mut report).await;
    write_pair(platform, channel, &policy.allows(owner), &mut report).await;

    // Re-assert after the allows so the excluded role cannot inherit its way back in.
    write_pair(platform, channel, &denies, &mut report).await;

    audit(platform, channel, policy, &mut report).await;
    check_hierarchy(platform, guild, policy);

    if report.is_private() {
        debug!(%channel, %owner, repaired = report.repaired, "room is private");
    } else {
        warn!(%channel, %owner, failures = report.failures.len(), "room is not fully private");
    }
    report
}

async fn write_pair<P: VoicePlatform>(
    platform: &P,
    channel: ChannelId,
    pair: &[PermissionOverwrite; 2],
    report: &mut PrivacyReport,
) {
    let [first, second] = pair;
    let (a, b) = tokio::join!(
        platform.set_overwrite(channel, first.clone()),
        platform.set_overwrite(channel, second.clone()),
    );
    for (overwrite, result) in [(first, a), (second, b)] {
        if let Err(e) = result {
            debug!(%channel, subject = ?overwrite.kind, error = %e, "overwrite write failed");
            report.failures.push((overwrite.kind, e));
        }
    }
}

async fn audit<P: VoicePlatform>(
    platform: &P,
    channel: ChannelId,
    policy: &PrivacyPolicy,
    report: &mut PrivacyReport,
) {
    let excluded = PermissionOverwriteType::Role(policy.excluded_role());
    let current = match platform.overwrites(channel).await {
        Ok(current) => current,
        Err(e) => {
            debug!(%channel, error = %e, "could not read back overwrites");
            return;
        }
    };

    let holds = current
        .iter()
        .any(|o| o.kind == excluded && o.deny.contains(Permissions::VIEW_CHANNEL));
    if holds {
        return;
    }

    warn!(%channel, "excluded role can still see the room; writing its deny again");
    let deny = PermissionOverwrite {
        allow: Permissions::empty(),
        deny: EXCLUDED_DENY,
        kind: excluded,
    };
    match platform.set_overwrite(channel, deny).await {
        Ok(()) => report.repaired = true,
        Err(e) => report.failures.push((excluded, e)),
    }
}

fn check_hierarchy<P: VoicePlatform>(platform: &P, guild: GuildId, policy: &PrivacyPolicy) {
    let Some(standing) = platform.standing(guild) else {
        return;
    };
    let Some(excluded) = platform.role_position(guild, policy.excluded_role()) else {
        return;
    };
    if standing.top_role_position <= excluded {
        error!(
            bot_position = standing.top_role_position,
            excluded_position = excluded,
            "critical: bot role is not above the excluded role; move it higher in Server Settings > Roles"
        );
    }
}
