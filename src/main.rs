use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::{fs::OpenOptions, path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod audio;
mod bot;
mod cache;
mod catalog;
mod config;
mod help;
mod presence;
mod stickers;
mod ui;

use crate::audio::{PlaybackSequencer, SongbirdTransport};
use crate::bot::{AkuBot, StickerSupport};
use crate::cache::{FfmpegTranscoder, SoundCache};
use crate::catalog::{AssetCatalog, CatalogListener, CatalogWatcher};
use crate::config::Config;
use crate::stickers::StickerPages;

#[tokio::main]
async fn main() -> Result<()> {
    // A bad configuration is still reported through the log
    let config = Config::load();
    init_logging(config.as_ref().ok().and_then(|c| c.log_file.as_deref()))?;

    info!("🔔 Starting aku v{}", env!("CARGO_PKG_VERSION"));

    let config = match config {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("❌ Invalid configuration: {:?}", e);
            return Err(e);
        }
    };
    info!("⚙️ {}", config.summary());

    let shutdown = CancellationToken::new();
    let mut watchers = Vec::new();

    let transcoder = FfmpegTranscoder::new(config.opus_bitrate);
    if let Err(e) = transcoder.verify().await {
        warn!("⚠️ ffmpeg unavailable, sounds will fail to convert: {}", e);
    }
    let cache = Arc::new(SoundCache::new(&config.cache_dir, Arc::new(transcoder)));

    // Asset catalogs
    let audio = Arc::new(AssetCatalog::load(&config.audio_dir));
    let (categories, sounds) = audio.counts();
    info!("🔊 Loaded {} sounds in {} categories", sounds, categories);
    if config.watch_assets {
        let listener: Arc<dyn CatalogListener> = cache.clone();
        watch(&audio, Some(listener), &shutdown, &mut watchers);
    }

    // Converted-audio cache
    cache.reset().await?;

    let entries = audio.category_entries(&config.entry_category);
    let total = entries.len();
    let cached = cache.precache(entries, config.precache_concurrency).await;
    info!(
        "💾 Pre-cached {}/{} entry sounds into {}",
        cached,
        total,
        cache.dir().display()
    );

    // Sticker pages
    let stickers = if config.enable_stickers {
        let catalog = Arc::new(AssetCatalog::load(&config.sticker_dir));
        if config.watch_assets {
            watch(&catalog, None, &shutdown, &mut watchers);
        }

        let pages = Arc::new(StickerPages::new(
            &config.sticker_page_dir,
            &config.page_base_url,
            config.sticker_font.as_deref(),
        )?);
        let written = pages.generate(&catalog).await?;
        info!("🖼️ Rendered {} sticker pages", written);

        let dir = pages.dir().to_path_buf();
        let port = config.page_server_port;
        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = stickers::server::serve(dir, port, server_shutdown).await {
                error!("❌ Sticker page server failed: {:?}", e);
            }
        });

        Some(StickerSupport { catalog, pages })
    } else {
        info!("Stickers disabled");
        None
    };
    let sticker_pages = stickers.as_ref().map(|s| s.pages.clone());

    // Voice
    let manager = Songbird::serenity();
    let transport = Arc::new(SongbirdTransport::new(manager.clone()));
    let sequencer = Arc::new(PlaybackSequencer::new(cache.clone(), transport));

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::MESSAGE_CONTENT;

    let handler = AkuBot::new(config.clone(), audio, stickers, sequencer);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await?;

    // Graceful shutdown
    let shard_manager = client.shard_manager.clone();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("⚠️ Shutdown signal received, closing...");
        signal_shutdown.cancel();
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    shutdown.cancel();
    drop(watchers);
    cache.clear().await;
    if let Some(pages) = sticker_pages {
        pages.clear().await;
    }

    info!("👋 Bye");
    Ok(())
}

/// Console logging, plus an uncoloured copy in `log_file` when set.
fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new("aku=info,serenity=warn,songbird=warn")
    })?;

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}

fn watch(
    catalog: &Arc<AssetCatalog>,
    listener: Option<Arc<dyn CatalogListener>>,
    shutdown: &CancellationToken,
    watchers: &mut Vec<CatalogWatcher>,
) {
    match CatalogWatcher::spawn(catalog.clone(), listener, shutdown.clone()) {
        Ok(watcher) => watchers.push(watcher),
        Err(e) => warn!(
            root = %catalog.root().display(),
            error = %e,
            "Not watching asset directory"
        ),
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
