//! # Bot Module
//!
//! Discord event handling for the soundboard.
//!
//! ## Architecture
//!
//! [`AkuBot`] implements Serenity's [`EventHandler`] and owns the shared state
//! every event reads or updates:
//!
//! - Sound and sticker catalogs ([`AssetCatalog`])
//! - The single-flight [`PlaybackSequencer`]
//! - Last-known voice channel per user ([`PresenceTracker`])
//! - Paginated help messages ([`HelpSessions`])
//!
//! Serenity dispatches every event on its own task, so all of the above are
//! safe for concurrent use. A failing event is logged and never affects
//! another one.

use serenity::{
    all::{Context, EventHandler, GuildId, Message, Reaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info};

pub mod commands;
pub mod handlers;

use crate::{
    audio::PlaybackSequencer, catalog::AssetCatalog, config::Config, help::HelpSessions,
    presence::PresenceTracker, stickers::StickerPages,
};

/// Sticker catalog together with its rendered help pages.
pub struct StickerSupport {
    pub catalog: Arc<AssetCatalog>,
    pub pages: Arc<StickerPages>,
}

/// Main Discord event handler.
pub struct AkuBot {
    pub config: Arc<Config>,
    pub audio: Arc<AssetCatalog>,
    /// `None` when stickers are disabled
    pub stickers: Option<StickerSupport>,
    pub sequencer: Arc<PlaybackSequencer>,
    pub presence: Arc<PresenceTracker>,
    pub help: Arc<HelpSessions>,
}

impl AkuBot {
    pub fn new(
        config: Arc<Config>,
        audio: Arc<AssetCatalog>,
        stickers: Option<StickerSupport>,
        sequencer: Arc<PlaybackSequencer>,
    ) -> Self {
        Self {
            config,
            audio,
            stickers,
            sequencer,
            presence: Arc::new(PresenceTracker::new()),
            help: Arc::new(HelpSessions::new()),
        }
    }
}

#[async_trait]
impl EventHandler for AkuBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 Long ago in a distant land... {} is online", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());
    }

    /// Every guild from the ready payload is cached: rebuild voice presence.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        handlers::populate_voice_state(&ctx, guilds, self).await;
    }

    async fn message(&self, ctx: Context, message: Message) {
        // Ignore ourselves
        if message.author.id == ctx.cache.current_user().id {
            return;
        }
        let Some(command) = commands::parse_command(&message.content) else {
            return;
        };

        info!(
            command = ?command,
            author = %handlers::unique_username(&message.author),
            "Processing command"
        );
        if let Err(e) = handlers::handle_command(&ctx, &message, command, self).await {
            error!("Error handling command: {:?}", e);
        }
    }

    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        if let Err(e) = handlers::handle_voice_state(&ctx, new, self).await {
            error!("Error handling voice state update: {:?}", e);
        }
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        if let Err(e) = handlers::handle_reaction(&ctx, reaction, self).await {
            error!("Error handling reaction: {:?}", e);
        }
    }
}
