//! # Cache Module
//!
//! On-disk cache of encoded sounds, ready to stream into a voice channel.
//!
//! ## Layout
//!
//! One file per sound at `<cache_dir>/<sound_name>.<ext>`. Existence of that
//! file is the only record of a sound being cached; there is no index.
//!
//! Artifacts are encoded into a temporary file in the same directory and
//! renamed into place once the [`Transcoder`] succeeded, so an existing
//! artifact is always complete. A failed or interrupted encode leaves no
//! artifact behind.
//!
//! ## Lifecycle
//!
//! - [`SoundCache::reset`] at startup wipes whatever an unclean shutdown left
//! - [`SoundCache::precache`] encodes entry sounds eagerly
//! - [`SoundCache::evict`] drops artifacts whose source file changed on disk
//! - [`SoundCache::clear`] at shutdown removes the directory
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let cache = SoundCache::new("/tmp/aku", Arc::new(FfmpegTranscoder::new(96_000)));
//! cache.reset().await?;
//! let artifact = cache.ensure_cached("bell", "/var/go-aku/audio/greetings/bell.mp3".as_ref()).await?;
//! ```

pub mod transcoder;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{stream, StreamExt};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use thiserror::Error;
use tokio::{io::AsyncWriteExt, sync::Mutex};
use tracing::{debug, error, info};

pub use transcoder::{FfmpegTranscoder, Transcoder};

use crate::catalog::CatalogListener;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to start transcoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("transcoder exited with {status}: {stderr}")]
    Transcoder { status: String, stderr: String },

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct SoundCache {
    dir: PathBuf,
    transcoder: Arc<dyn Transcoder>,
    /// One lock per sound name; holders are the only encoders of that name.
    encoding: DashMap<String, Arc<Mutex<()>>>,
}

impl SoundCache {
    pub fn new(dir: impl Into<PathBuf>, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            dir: dir.into(),
            transcoder,
            encoding: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic artifact location for a sound.
    pub fn artifact_path(&self, sound_name: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", sound_name, self.transcoder.extension()))
    }

    pub async fn is_cached(&self, sound_name: &str) -> bool {
        match tokio::fs::try_exists(self.artifact_path(sound_name)).await {
            Ok(exists) => exists,
            Err(e) => {
                error!(sound = %sound_name, error = %e, "Error looking up converted sound");
                false
            }
        }
    }

    /// Returns the artifact for `sound_name`, encoding `source` first if needed.
    pub async fn ensure_cached(&self, sound_name: &str, source: &Path) -> Result<PathBuf, CacheError> {
        let path = self.artifact_path(sound_name);
        if self.is_cached(sound_name).await {
            return Ok(path);
        }

        let lock = self
            .encoding
            .entry(sound_name.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        // Someone else may have finished the encode while we waited
        if self.is_cached(sound_name).await {
            return Ok(path);
        }

        self.encode(sound_name, source, &path).await?;
        Ok(path)
    }

    async fn encode(&self, sound_name: &str, source: &Path, path: &Path) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let started = Instant::now();
        let temp = tempfile::Builder::new()
            .prefix(".encoding-")
            .suffix(".part")
            .tempfile_in(&self.dir)?;
        let (file, temp_path) = temp.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        // On any early return `temp_path` is dropped and the partial file deleted
        let bytes = self.transcoder.transcode(source, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        temp_path.persist(path).map_err(|e| CacheError::Io(e.error))?;

        debug!(
            sound = %sound_name,
            source = %source.display(),
            bytes,
            took = %humantime::format_duration(started.elapsed()),
            "Cached converted sound"
        );
        Ok(())
    }

    /// Drops the artifact of `sound_name` so the next request encodes it again.
    ///
    /// Waits for an in-flight encode of that name to finish first.
    pub async fn evict(&self, sound_name: &str) -> Result<bool, CacheError> {
        let lock = self
            .encoding
            .entry(sound_name.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        match tokio::fs::remove_file(self.artifact_path(sound_name)).await {
            Ok(()) => {
                debug!(sound = %sound_name, "Evicted converted sound");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Recreates the cache directory empty.
    pub async fn reset(&self) -> Result<(), CacheError> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => info!("🧹 Discarded leftover cache at {}", self.dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Removes the cache directory. Failures are logged.
    pub async fn clear(&self) {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => info!("🧹 Removed sound cache at {}", self.dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => error!(path = %self.dir.display(), error = %e, "Failed to remove cache directory"),
        }
    }

    /// Eagerly encodes `sounds`, at most `concurrency` at a time.
    ///
    /// Returns how many are cached afterwards. Failures are per sound.
    pub async fn precache(&self, sounds: Vec<(String, PathBuf)>, concurrency: usize) -> usize {
        let total = sounds.len();
        let results: Vec<(String, Result<PathBuf, CacheError>)> = stream::iter(sounds)
            .map(|(name, source)| async move {
                let result = self.ensure_cached(&name, &source).await;
                (name, result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut cached = 0;
        for (name, result) in results {
            match result {
                Ok(_) => cached += 1,
                Err(e) => error!(sound = %name, error = %e, "Failed to pre-cache sound"),
            }
        }
        info!(cached, total, "🎶 Pre-cached entry sounds");
        cached
    }
}

#[async_trait]
impl CatalogListener for SoundCache {
    async fn assets_changed(&self, stale: &[String]) {
        for name in stale {
            if let Err(e) = self.evict(name).await {
                error!(sound = %name, error = %e, "Failed to evict converted sound");
            }
        }
    }
}
