use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,

    // Assets
    pub audio_dir: PathBuf,
    pub sticker_dir: PathBuf,
    pub entry_category: String,

    // Caches
    pub cache_dir: PathBuf,
    pub sticker_page_dir: PathBuf,
    pub opus_bitrate: u32,
    pub precache_concurrency: usize,

    // Sticker page server
    pub page_server_port: u16,
    pub page_base_url: String,
    pub sticker_font: Option<PathBuf>,

    // Logging
    pub log_file: Option<PathBuf>,

    // Features
    pub enable_stickers: bool,
    pub watch_assets: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")
                .context("DISCORD_TOKEN is not set")?,

            // Assets
            audio_dir: std::env::var("AUDIO_DIR")
                .unwrap_or_else(|_| "/var/go-aku/audio".to_string())
                .into(),
            sticker_dir: std::env::var("STICKER_DIR")
                .unwrap_or_else(|_| "/var/go-aku/stickers".to_string())
                .into(),
            entry_category: std::env::var("ENTRY_CATEGORY")
                .unwrap_or_else(|_| "entries".to_string()),

            // Caches
            cache_dir: std::env::var("CACHE_DIR")
                .unwrap_or_else(|_| "/tmp/aku".to_string())
                .into(),
            sticker_page_dir: std::env::var("STICKER_PAGE_DIR")
                .unwrap_or_else(|_| "/tmp/akus".to_string())
                .into(),
            opus_bitrate: std::env::var("OPUS_BITRATE")
                .unwrap_or_else(|_| "96000".to_string()) // 96kbps (Discord default)
                .parse()?,
            precache_concurrency: match std::env::var("PRECACHE_CONCURRENCY") {
                Ok(val) if !val.trim().is_empty() => val.parse()?,
                _ => num_cpus::get(),
            },

            // Sticker page server
            page_server_port: std::env::var("PAGE_SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            page_base_url: std::env::var("PAGE_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080/".to_string()),
            sticker_font: std::env::var("STICKER_FONT")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),

            // Logging
            log_file: std::env::var("LOG_FILE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),

            // Features
            enable_stickers: std::env::var("ENABLE_STICKERS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
            watch_assets: std::env::var("WATCH_ASSETS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The bot token must not be empty
    /// - Opus bitrate must be between 8kbps and 510kbps
    /// - Pre-cache concurrency must be greater than 0
    /// - The page base URL must be an absolute URL
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if self.opus_bitrate > 510_000 {
            anyhow::bail!("Opus bitrate cannot exceed 510kbps, got: {}", self.opus_bitrate);
        }

        if self.opus_bitrate < 8_000 {
            anyhow::bail!("Opus bitrate too low, minimum 8kbps, got: {}", self.opus_bitrate);
        }

        if self.precache_concurrency == 0 {
            anyhow::bail!("Pre-cache concurrency must be greater than 0");
        }

        url::Url::parse(&self.page_base_url)
            .with_context(|| format!("PAGE_BASE_URL is not a valid URL: {}", self.page_base_url))?;

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Assets: audio {} / stickers {} (entries: {})\n  \
            Cache: {} ({}kbps Opus, {} pre-cache workers)\n  \
            Stickers: {} pages at {} on port {}\n  \
            Log file: {}\n  \
            Features: stickers={}, watch={}",
            self.audio_dir.display(),
            self.sticker_dir.display(),
            self.entry_category,
            self.cache_dir.display(),
            self.opus_bitrate / 1000,
            self.precache_concurrency,
            self.sticker_page_dir.display(),
            self.page_base_url,
            self.page_server_port,
            self.log_file
                .as_ref()
                .map_or_else(|| "none".to_string(), |p| p.display().to_string()),
            self.enable_stickers,
            self.watch_assets,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no default - must be provided)
            discord_token: String::new(),

            audio_dir: "/var/go-aku/audio".into(),
            sticker_dir: "/var/go-aku/stickers".into(),
            entry_category: "entries".to_string(),

            cache_dir: "/tmp/aku".into(),
            sticker_page_dir: "/tmp/akus".into(),
            opus_bitrate: 96_000,
            precache_concurrency: num_cpus::get(),

            page_server_port: 8080,
            page_base_url: "http://localhost:8080/".to_string(),
            sticker_font: None,

            log_file: None,

            enable_stickers: true,
            watch_assets: true,
        }
    }
}
