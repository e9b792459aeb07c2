use crate::bot::Bot;
use crate::config::Config;
use anyhow::Context as _;
use serenity::prelude::GatewayIntents;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub mod bot;
pub mod config;
pub mod error;
pub mod rooms;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        guild = %config.rooms.guild,
        trigger = %config.rooms.trigger,
        prefix = %config.rooms.prefix,
        "starting"
    );

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_VOICE_STATES;

    let mut bot = Bot::new(config, intents)
        .await
        .context("failed to build the discord client")?;
    if let Err(why) = bot.start().await {
        error!(error = %why, "client stopped; check that DISCORD_TOKEN is valid");
        return Err(why).context("discord client failed");
    }
    Ok(())
}
