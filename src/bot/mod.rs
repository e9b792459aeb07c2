use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serenity::client::{ClientBuilder, Context, EventHandler};
use serenity::model::gateway::Ready;
use serenity::model::id::GuildId;
use serenity::model::permissions::Permissions;
use serenity::model::prelude::VoiceState;
use serenity::prelude::GatewayIntents;
use serenity::{async_trait, Client, Error};
use tracing::{info, warn};

use crate::config::Config;
use crate::rooms::lifecycle::ChannelLifecycle;
use crate::rooms::platform::VoicePlatform;
use crate::rooms::presence::PresenceHandler;
use crate::rooms::reconcile::reconcile;
use crate::rooms::registry::OwnershipRegistry;
use crate::rooms::RoomSettings;

mod platform;

use platform::SerenityPlatform;

/// Guild permissions the bot cannot do its job without, with their display names.
const REQUIRED_PERMISSIONS: [(Permissions, &str); 5] = [
    (Permissions::MANAGE_CHANNELS, "Manage Channels"),
    (Permissions::MANAGE_ROLES, "Manage Roles"),
    (Permissions::MOVE_MEMBERS, "Move Members"),
    (Permissions::CONNECT, "Connect"),
    (Permissions::SPEAK, "Speak"),
];

fn missing_permissions(granted: Permissions) -> Vec<&'static str> {
    REQUIRED_PERMISSIONS
        .iter()
        .filter(|(permission, _)| !granted.contains(*permission))
        .map(|(_, name)| *name)
        .collect()
}

//==================================================================================================
//      Handler
//--------------------------------------------------------------------------------------------------
struct Handler {
    settings: RoomSettings,
    presence: PresenceHandler,
    started: AtomicBool,
}

impl Handler {
    fn audit_permissions<P: VoicePlatform>(&self, platform: &P) {
        let Some(standing) = platform.standing(self.settings.guild) else {
            warn!(guild = %self.settings.guild, "bot is not in the configured guild or it is not cached");
            return;
        };

        let missing = missing_permissions(standing.permissions);
        if missing.is_empty() {
            info!("bot has every permission it needs");
        } else {
            warn!(
                ?missing,
                "bot is missing permissions; enable them for its role in Server Settings > Roles"
            );
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _: Context, ready: Ready) {
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "connected");
    }

    async fn cache_ready(&self, ctx: Context, _: Vec<GuildId>) {
        // Fires again after reconnects; the sweep only belongs to the first one.
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let platform = SerenityPlatform::new(ctx);
        self.audit_permissions(&platform);
        reconcile(&platform, self.presence.registry()).await;
        info!(trigger = %self.settings.trigger, "ready to hand out private rooms");
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        if new.guild_id != Some(self.settings.guild) {
            return;
        }
        if new.member.as_ref().is_some_and(|member| member.user.bot) {
            return;
        }

        let previous = old.and_then(|state| state.channel_id);
        let platform = SerenityPlatform::new(ctx);
        self.presence
            .handle(&platform, new.user_id, previous, new.channel_id)
            .await;
    }
}

//==================================================================================================
//      Bot
//--------------------------------------------------------------------------------------------------
pub struct Bot {
    client: Client,
}

impl Bot {
    pub async fn new(config: Config, intents: GatewayIntents) -> Result<Self, Error> {
        let registry = Arc::new(OwnershipRegistry::new(config.rooms.trigger));
        let lifecycle = ChannelLifecycle::new(config.rooms.clone(), registry);

        let handler = Handler {
            settings: config.rooms,
            presence: PresenceHandler::new(lifecycle),
            started: AtomicBool::new(false),
        };

        let client = ClientBuilder::new(&config.token, intents)
            .event_handler(handler)
            .await?;

        Ok(Bot { client })
    }

    pub async fn start(&mut self) -> Result<(), Error> {
        self.client.start().await
    }
}
