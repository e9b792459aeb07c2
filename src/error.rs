use std::time::Duration;

use serenity::http::HttpError;
use serenity::model::id::ChannelId;
use serenity::model::permissions::Permissions;
use thiserror::Error;

//==================================================================================================
//      Platform Errors
//--------------------------------------------------------------------------------------------------

/// A failed call against the chat platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The bot lacks the rights for the call (platform codes 50001, 50013).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The channel, member or overwrite vanished before we got to it.
    #[error("not found")]
    NotFound,

    /// The gateway cache has not been populated for the guild yet.
    #[error("guild {0} is not cached yet")]
    CacheMiss(u64),

    #[error("transport error: {0}")]
    Transport(#[source] Box<serenity::Error>),
}

impl PlatformError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

impl From<serenity::Error> for PlatformError {
    fn from(error: serenity::Error) -> Self {
        if let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = &error {
            match response.error.code {
                50001 | 50013 => return Self::PermissionDenied(response.error.message.clone()),
                10003 | 10004 | 10007 | 10013 => return Self::NotFound,
                _ if response.status_code.as_u16() == 404 => return Self::NotFound,
                _ => {}
            }
        }
        Self::Transport(Box::new(error))
    }
}

//==================================================================================================
//      Core Errors
//--------------------------------------------------------------------------------------------------

/// Errors surfaced by provisioning, release and reconciliation.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Something tried to register, move into or delete the trigger channel.
    #[error("refusing to treat trigger channel {0} as a private room")]
    TriggerChannel(ChannelId),

    #[error("trigger channel {0} could not be fetched")]
    TriggerMissing(ChannelId),

    #[error("bot is missing guild permissions: {0:?}")]
    MissingPermission(Permissions),

    /// The empty channel picked for reuse was occupied by the time it was claimed.
    #[error("slot {slot} ({channel}) filled up before it could be claimed")]
    SlotContended { slot: u32, channel: ChannelId },

    #[error("remote call did not finish within {0:?}")]
    TimedOut(Duration),
}

impl Error {
    /// Static label used as a structured log field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Platform(PlatformError::PermissionDenied(_)) => "permission_denied",
            Self::Platform(PlatformError::NotFound) => "not_found",
            Self::Platform(PlatformError::CacheMiss(_)) => "cache_miss",
            Self::Platform(PlatformError::Transport(_)) => "transport",
            Self::TriggerChannel(_) => "trigger_channel",
            Self::TriggerMissing(_) => "trigger_missing",
            Self::MissingPermission(_) => "missing_permission",
            Self::SlotContended { .. } => "slot_contended",
            Self::TimedOut(_) => "timed_out",
        }
    }

    /// Whether joining the trigger channel again is likely to succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SlotContended { .. }
                | Self::TimedOut(_)
                | Self::Platform(PlatformError::CacheMiss(_))
        )
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            Self::MissingPermission(_) | Self::Platform(PlatformError::PermissionDenied(_))
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Platform(PlatformError::NotFound))
    }
}
